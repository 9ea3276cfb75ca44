mod cli;
mod output;

use std::error::Error;

use clap::Parser;
use tracing::Level;

use cocalc_course::batch::{self, CourseRunner};
use cocalc_course::course::{check_config, CourseConfig};
use cocalc_course::{CocalcClient, Result, UserConfig};

use cli::{Action, Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let verbose = cli.verbose;
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");

        if verbose {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("Caused by: {cause}");
                source = cause.source();
            }
        }

        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    output::set_json_output(cli.json);

    let mut course = CourseConfig::load(&cli.yaml_config)?;
    if let Some(nick) = &cli.project {
        course = course.restrict_to(nick)?;
    }

    match cli.action {
        // Actions that don't need an API client
        Action::Check => {
            let report = check_config(&course, cli.class_list.as_deref())?;
            output::print_check(&report);
        }
        Action::Emails => {
            output::print_message(&batch::emails(&course)?);
        }
        // Actions that talk to the API
        action => {
            let user = UserConfig::load(cli.user_config.as_deref())?;
            let client = CocalcClient::from_config(user)?;
            let mut runner = CourseRunner::new(client, cli.template_dir);

            match action {
                Action::Ssh => {
                    output::print_message(&runner.ssh_command(&course).await?);
                }
                Action::Users => {
                    output::print_users(runner.users(&course).await?);
                }
                action => {
                    if let Some(team_action) = action.team_action() {
                        runner.process(team_action, &course).await?;
                    }
                }
            }
        }
    }

    Ok(())
}
