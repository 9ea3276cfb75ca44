//! Identifiers that are either a platform UUID or a human-readable name.

use std::fmt;
use std::future::Future;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CocalcError, EntityKind, Result};

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}(-[0-9a-f]{4}){3}-[0-9a-f]{12}$").expect("valid UUID regex")
    })
}

/// True if `s` has the canonical 8-4-4-4-12 hex layout.
pub fn looks_like_uuid(s: &str) -> bool {
    uuid_pattern().is_match(s)
}

/// Remove the dashes from a UUID, as used for project SSH user names.
pub fn strip_uuid(id: &str) -> String {
    id.replace('-', "")
}

/// A value naming an account or project.
///
/// UUIDs are taken as authoritative and never checked against the server;
/// free text must be resolved by a search that yields exactly one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ident {
    Uuid(String),
    Text(String),
}

impl Ident {
    pub fn parse(s: &str) -> Self {
        if looks_like_uuid(s) {
            Ident::Uuid(s.to_string())
        } else {
            Ident::Text(s.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Ident::Uuid(s) | Ident::Text(s) => s,
        }
    }

    /// Resolve to a UUID, calling `search` only for free text.
    pub async fn resolve<F, Fut>(&self, kind: EntityKind, search: F) -> Result<String>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        match self {
            Ident::Uuid(id) => Ok(id.clone()),
            Ident::Text(query) => {
                let found = search(query.clone()).await?;
                pick_one(kind, query, found)
            }
        }
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Ident::parse(s)
    }
}

impl From<String> for Ident {
    fn from(s: String) -> Self {
        Ident::parse(&s)
    }
}

impl From<&String> for Ident {
    fn from(s: &String) -> Self {
        Ident::parse(s)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one search hit resolves; none or several is an error.
pub fn pick_one(kind: EntityKind, query: &str, mut found: Vec<String>) -> Result<String> {
    match found.len() {
        0 => Err(CocalcError::NotFound {
            kind,
            query: query.to_string(),
        }),
        1 => Ok(found.remove(0)),
        count => Err(CocalcError::Ambiguous {
            kind,
            query: query.to_string(),
            count,
        }),
    }
}
