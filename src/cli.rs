use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use cocalc_course::batch::TeamAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Create a project per team
    Create,
    /// Copy the project template into each team project
    Fill,
    /// Invite team members and TA to their project
    Subscribe,
    /// Apply quota upgrades to each team project
    Upgrade,
    /// Remove quota upgrades from each team project
    Downgrade,
    /// List owner and collaborators of each team project
    Users,
    /// Check for overlapping teams and students missing from the class list
    Check,
    /// Print the ssh command for one team project
    Ssh,
    /// Print member emails for one team
    Emails,
}

impl Action {
    /// The per-team action, if this is one.
    pub fn team_action(self) -> Option<TeamAction> {
        match self {
            Action::Create => Some(TeamAction::Create),
            Action::Fill => Some(TeamAction::Fill),
            Action::Subscribe => Some(TeamAction::Subscribe),
            Action::Upgrade => Some(TeamAction::Upgrade),
            Action::Downgrade => Some(TeamAction::Downgrade),
            Action::Users | Action::Check | Action::Ssh | Action::Emails => None,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "cocalc-course")]
#[command(about = "Create / fill / subscribe course projects given a YAML file", version)]
#[command(after_help = "EXAMPLES:
    cocalc-course course.yml create                Create a project per team
    cocalc-course course.yml subscribe -p wildcard Invite members of team-wildcard
    cocalc-course course.yml check --class-list class.csv
    cocalc-course course.yml ssh -p wildcard       Print ssh command for team-wildcard")]
pub struct Cli {
    /// YAML configuration for course
    pub yaml_config: PathBuf,

    /// Action to run
    #[arg(value_enum)]
    pub action: Action,

    /// Restrict to given team
    #[arg(long, short)]
    pub project: Option<String>,

    /// Class list CSV file for "check"
    #[arg(long)]
    pub class_list: Option<PathBuf>,

    /// User config YAML (api_key, email, first_name, last_name)
    #[arg(long)]
    pub user_config: Option<PathBuf>,

    /// Directory of files copied into each project by "fill"
    #[arg(long, default_value = "ptemplate")]
    pub template_dir: PathBuf,

    /// Output as JSON for scripting
    #[arg(long)]
    pub json: bool,

    /// Only log warnings and errors
    #[arg(long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show debug logging and detailed error information
    #[arg(long, short)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positional_and_flags() {
        let cli = Cli::try_parse_from([
            "cocalc-course",
            "course.yml",
            "check",
            "--class-list",
            "class.csv",
            "-p",
            "wildcard",
        ])
        .unwrap();
        assert_eq!(cli.yaml_config, PathBuf::from("course.yml"));
        assert_eq!(cli.action, Action::Check);
        assert_eq!(cli.project.as_deref(), Some("wildcard"));
        assert_eq!(cli.class_list, Some(PathBuf::from("class.csv")));
        assert_eq!(cli.template_dir, PathBuf::from("ptemplate"));
    }

    #[test]
    fn test_rejects_unknown_action() {
        assert!(Cli::try_parse_from(["cocalc-course", "course.yml", "destroy"]).is_err());
    }

    #[test]
    fn test_team_actions() {
        assert_eq!(Action::Fill.team_action(), Some(TeamAction::Fill));
        assert_eq!(Action::Ssh.team_action(), None);
    }
}
