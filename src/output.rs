use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use cocalc_course::course::CheckReport;
use cocalc_course::projects::ProjectUsers;

/// Global output format setting
static OUTPUT_JSON: AtomicBool = AtomicBool::new(false);

pub fn set_json_output(json: bool) {
    OUTPUT_JSON.store(json, Ordering::Relaxed);
}

pub fn is_json_output() -> bool {
    OUTPUT_JSON.load(Ordering::Relaxed)
}

/// Print a table or JSON depending on output mode
pub fn print_table<T, R, F>(items: &[T], to_row: F)
where
    T: Serialize,
    R: Tabled,
    F: Fn(&T) -> R,
{
    if is_json_output() {
        println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
    } else {
        let rows: Vec<R> = items.iter().map(to_row).collect();
        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{table}");
    }
}

/// Print a message (or a simple JSON object in JSON mode)
pub fn print_message(message: &str) {
    if is_json_output() {
        println!("{}", serde_json::json!({ "message": message }));
    } else {
        println!("{message}");
    }
}

#[derive(Serialize)]
pub struct TeamUsers {
    pub team: String,
    #[serde(flatten)]
    pub users: ProjectUsers,
}

#[derive(Tabled)]
struct TeamUsersRow {
    #[tabled(rename = "Team")]
    team: String,
    #[tabled(rename = "Owner")]
    owner: String,
    #[tabled(rename = "Collaborators")]
    collaborators: String,
}

impl From<&TeamUsers> for TeamUsersRow {
    fn from(t: &TeamUsers) -> Self {
        Self {
            team: t.team.clone(),
            owner: t.users.owner.clone(),
            collaborators: t
                .users
                .collaborators
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

pub fn print_users(users: Vec<(String, ProjectUsers)>) {
    let items: Vec<TeamUsers> = users
        .into_iter()
        .map(|(team, users)| TeamUsers { team, users })
        .collect();
    print_table(&items, |t| TeamUsersRow::from(t));
}

pub fn print_check(report: &CheckReport) {
    if is_json_output() {
        println!(
            "{}",
            serde_json::json!({
                "class_list_checked": report.class_list_checked,
                "missing": report.missing,
            })
        );
        return;
    }
    println!("{}", "No overlapping teams".green());
    if !report.class_list_checked {
        println!("{}", "No class list; cannot check for missing students".yellow());
        return;
    }
    println!("Missing students check");
    if report.missing.is_empty() {
        println!("{}", "None missing".green());
    } else {
        println!("{}", report.missing.join(",\n").red());
    }
}
