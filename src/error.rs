use std::fmt;
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

/// What kind of remote entity an identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Account,
    Project,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Account => f.write_str("user"),
            EntityKind::Project => f.write_str("project"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CocalcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Bad status code {status} with call:\n{payload}\ngiving result:\n{body}")]
    BadResponse {
        status: u16,
        payload: Value,
        body: Value,
    },

    #[error("No matching {kind} for {query}")]
    NotFound { kind: EntityKind, query: String },

    #[error("More than one matching {kind} for {query} ({count} found)")]
    Ambiguous {
        kind: EntityKind,
        query: String,
        count: usize,
    },

    #[error("{action} failed with response\n{response}")]
    Remote { action: String, response: Value },

    #[error("Could not wake {0}")]
    Timeout(String),

    #[error("Inconsistent data from server: {0}")]
    Integrity(String),

    #[error("Unexpected response from server: {0}")]
    UnexpectedResponse(String),

    #[error("Failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("No API key found. Set COCALC_API_KEY env var or add api_key to the user config file")]
    MissingApiKey,

    #[error("Failed to read class list {path}: {source}")]
    ClassList {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Students in {0} overlap with others")]
    Overlap(String),

    #[error("Can only echo data for one project, config has {0}")]
    SingleProject(usize),

    #[error("Team not found in course config: {0}")]
    UnknownTeam(String),

    #[error("Failed to read template directory {path}: {source}")]
    TemplateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template directory has no files to copy: {0}")]
    EmptyTemplateDir(PathBuf),

    #[error("Command `{command}` failed ({status})")]
    CommandFailed { command: String, status: String },
}

impl CocalcError {
    /// Errors the server reported about the request itself, as opposed to
    /// transport or local failures.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            CocalcError::Remote { .. } | CocalcError::BadResponse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CocalcError>;
