//! Course configuration: which teams exist and who is in them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::read_yaml;
use crate::error::{CocalcError, Result};
use crate::projects::Upgrades;

pub const DEFAULT_EMAIL_DOMAIN: &str = "student.bham.ac.uk";

/// Settings for one team's project.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct TeamConfig {
    #[serde(default)]
    pub members: Vec<String>,
    pub ta: Option<String>,
    /// Set once the project has been created and filled by hand.
    #[serde(default)]
    pub inited: bool,
    #[serde(default)]
    pub upgrade: Upgrades,
}

impl TeamConfig {
    /// Members plus the TA, each as a full email address.
    pub fn invitees(&self) -> Vec<String> {
        self.members
            .iter()
            .chain(self.ta.iter())
            .map(|m| qualify_email(m))
            .collect()
    }
}

/// Team nickname to team settings.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct CourseConfig {
    pub teams: BTreeMap<String, TeamConfig>,
}

impl CourseConfig {
    pub fn load(path: &Path) -> Result<Self> {
        read_yaml(path)
    }

    /// Keep only the team named `nick`.
    pub fn restrict_to(self, nick: &str) -> Result<Self> {
        let mut teams = self.teams;
        let team = teams
            .remove(nick)
            .ok_or_else(|| CocalcError::UnknownTeam(nick.to_string()))?;
        Ok(Self {
            teams: BTreeMap::from([(nick.to_string(), team)]),
        })
    }

    /// The single team of a restricted config.
    pub fn single(&self) -> Result<(&str, &TeamConfig)> {
        let mut teams = self.teams.iter();
        match (teams.next(), teams.next()) {
            (Some((nick, team)), None) => Ok((nick.as_str(), team)),
            _ => Err(CocalcError::SingleProject(self.teams.len())),
        }
    }
}

pub fn nick_to_title(nick: &str) -> String {
    format!("team-{nick}")
}

/// Bare user names get the default student email domain.
pub fn qualify_email(member: &str) -> String {
    if member.contains('@') {
        member.to_string()
    } else {
        format!("{member}@{DEFAULT_EMAIL_DOMAIN}")
    }
}

fn login_of(member: &str) -> String {
    member
        .split('@')
        .next()
        .unwrap_or(member)
        .to_lowercase()
}

#[derive(Deserialize)]
struct ClassListRow {
    #[serde(rename = "Student")]
    student: String,
    #[serde(rename = "SIS Login ID")]
    login: String,
}

/// Outcome of checking a course config.
#[derive(Debug, Default, PartialEq)]
pub struct CheckReport {
    pub class_list_checked: bool,
    /// `Name <login@domain>` for students on the class list in no team.
    pub missing: Vec<String>,
}

/// Check no student is in two teams, and, given a class list CSV, find
/// students who are in no team.
pub fn check_config(course: &CourseConfig, class_list: Option<&Path>) -> Result<CheckReport> {
    let mut all_members = BTreeSet::new();
    for (nick, team) in &course.teams {
        if team.members.iter().any(|m| all_members.contains(m)) {
            return Err(CocalcError::Overlap(nick.clone()));
        }
        all_members.extend(team.members.iter().cloned());
    }
    let logins: BTreeSet<String> = all_members.iter().map(|m| login_of(m)).collect();

    let Some(path) = class_list else {
        return Ok(CheckReport::default());
    };
    let csv_error = |source| CocalcError::ClassList {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let mut missing = Vec::new();
    for row in reader.deserialize() {
        let row: ClassListRow = row.map_err(csv_error)?;
        if !logins.contains(&row.login) {
            missing.push(format!(
                "{} <{}@{DEFAULT_EMAIL_DOMAIN}>",
                row.student, row.login
            ));
        }
    }
    Ok(CheckReport {
        class_list_checked: true,
        missing,
    })
}
