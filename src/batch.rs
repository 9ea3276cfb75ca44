//! Per-team course administration driven by a [`CourseConfig`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{info, warn};

use crate::accounts::Invitation;
use crate::client::{CocalcClient, Transport};
use crate::course::{nick_to_title, CourseConfig, TeamConfig};
use crate::error::{CocalcError, Result};
use crate::exec::ExecOptions;
use crate::ident::strip_uuid;
use crate::projects::{ProjectUsers, Upgrades, WakePolicy};

pub const MARKER_FNAME: &str = ".initial_copy_done";
pub const SSH_HOST: &str = "ssh.cocalc.com";

/// Pause after waking a project before listing its files.
const SETTLE: Duration = Duration::from_secs(5);

pub fn default_upgrade() -> Upgrades {
    Upgrades::from([
        ("cores".to_string(), 2),
        ("memory".to_string(), 1000),
        ("mintime".to_string(), 10800),
        ("network".to_string(), 1),
        ("member_host".to_string(), 1),
    ])
}

pub fn default_downgrade() -> Upgrades {
    default_upgrade().into_keys().map(|k| (k, 0)).collect()
}

/// Actions applied to every team in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamAction {
    Create,
    Fill,
    Subscribe,
    Upgrade,
    Downgrade,
}

impl fmt::Display for TeamAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeamAction::Create => "create",
            TeamAction::Fill => "fill",
            TeamAction::Subscribe => "subscribe",
            TeamAction::Upgrade => "upgrade",
            TeamAction::Downgrade => "downgrade",
        };
        f.write_str(name)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Member emails of the single team in `course`, comma separated.
pub fn emails(course: &CourseConfig) -> Result<String> {
    let (_, team) = course.single()?;
    Ok(team.members.join(", "))
}

/// Top-level, non-hidden entries of the project template directory.
fn template_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let template_error = |source| CocalcError::TemplateDir {
        path: dir.to_path_buf(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(template_error)? {
        let entry = entry.map_err(template_error)?;
        if !entry.file_name().to_string_lossy().starts_with('.') {
            files.push(entry.path());
        }
    }
    if files.is_empty() {
        return Err(CocalcError::EmptyTemplateDir(dir.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// Copy `files` recursively into the home directory of a project over SSH.
fn scp_to_project(files: &[PathBuf], project_id: &str) -> Result<()> {
    let target = format!("{}@{SSH_HOST}:.", strip_uuid(project_id));
    let status = Command::new("scp").arg("-r").args(files).arg(&target).status()?;
    if !status.success() {
        return Err(CocalcError::CommandFailed {
            command: format!("scp -r ... {target}"),
            status: status.to_string(),
        });
    }
    Ok(())
}

pub struct CourseRunner<T: Transport> {
    client: CocalcClient<T>,
    template_dir: PathBuf,
    wake: WakePolicy,
}

impl<T: Transport> CourseRunner<T> {
    pub fn new(client: CocalcClient<T>, template_dir: PathBuf) -> Self {
        Self {
            client,
            template_dir,
            wake: WakePolicy::default(),
        }
    }

    pub fn client(&self) -> &CocalcClient<T> {
        &self.client
    }

    /// Run `action` on each team in turn, stopping at the first failure.
    pub async fn process(&mut self, action: TeamAction, course: &CourseConfig) -> Result<()> {
        for (nick, team) in &course.teams {
            info!("Running {action} on {nick}");
            let title = nick_to_title(nick);
            match action {
                TeamAction::Create => {
                    self.create(&title, team).await?;
                }
                TeamAction::Fill => self.fill(&title, team).await?,
                TeamAction::Subscribe => {
                    self.subscribe(&title, team).await?;
                }
                TeamAction::Upgrade => self.upgrade(&title, team).await?,
                TeamAction::Downgrade => self.downgrade(&title).await?,
            }
        }
        Ok(())
    }

    /// Create the team project unless it is marked inited or already exists.
    pub async fn create(&self, title: &str, team: &TeamConfig) -> Result<Option<String>> {
        if team.inited {
            info!(title, "config has \"inited\" set, skipping");
            return Ok(None);
        }
        if !self.client.projects_by_title(title, false).await?.is_empty() {
            info!(title, "project already exists");
            return Ok(None);
        }
        let description = format!("Project for {}", capitalize(title));
        self.client
            .create_project(title, &description, true)
            .await
            .map(Some)
    }

    /// Copy the template files into the project, once.
    pub async fn fill(&self, title: &str, team: &TeamConfig) -> Result<()> {
        if team.inited {
            info!(title, "config has \"inited\" set, skipping");
            return Ok(());
        }
        let project_id = self.client.as_project_id(title).await?;
        self.client
            .start_project(project_id.as_str(), self.wake)
            .await?;
        tokio::time::sleep(SETTLE).await;

        // A first listing can time out while the file system comes up.
        if let Err(e) = self
            .client
            .project_exec(project_id.as_str(), "ls", &ExecOptions::default().timeout(25))
            .await
        {
            if !e.is_remote() {
                return Err(e);
            }
            warn!(title, "first listing failed: {e}");
        }

        let listing = self
            .client
            .project_exec(project_id.as_str(), "ls", &ExecOptions::with_args(["-a", "-1"]))
            .await?;
        if !listing.stderr.is_empty() || listing.exit_code != 0 {
            return Err(CocalcError::Integrity(format!(
                "listing {title} exited {} with stderr {:?}",
                listing.exit_code, listing.stderr
            )));
        }
        if listing.stdout.lines().any(|name| name == MARKER_FNAME) {
            info!(title, "copy flagged as done, skipping");
            return Ok(());
        }

        let files = template_files(&self.template_dir)?;
        info!(title, count = files.len(), "copying template files");
        scp_to_project(&files, &project_id)?;
        self.client
            .write_text_file_to_project(project_id.as_str(), MARKER_FNAME, "")
            .await?;
        Ok(())
    }

    /// Invite members and TA that have accounts; skip those without.
    pub async fn subscribe(&self, title: &str, team: &TeamConfig) -> Result<Vec<String>> {
        let mut accounted = Vec::new();
        for email in team.invitees() {
            match self.client.as_account_id(email.as_str()).await {
                Ok(account_id) => accounted.push(account_id),
                Err(CocalcError::NotFound { .. }) => {
                    warn!(title, %email, "no account, not inviting");
                }
                Err(e) => return Err(e),
            }
        }
        let invitation = Invitation::new(
            format!("Invitation to collaborate on {title}"),
            format!("You are cordially invited to collaborate on the project {title}\nover on CoCalc.com.\n"),
        );
        self.client
            .invite_collaborators(accounted, title, &invitation)
            .await
    }

    /// Apply the default upgrade, overridden by the team's own settings.
    pub async fn upgrade(&mut self, title: &str, team: &TeamConfig) -> Result<()> {
        let mut upgrades = default_upgrade();
        upgrades.extend(team.upgrade.iter().map(|(k, v)| (k.clone(), *v)));
        self.client.upgrade_project(title, None, &upgrades).await?;
        Ok(())
    }

    pub async fn downgrade(&mut self, title: &str) -> Result<()> {
        self.client
            .upgrade_project(title, None, &default_downgrade())
            .await?;
        Ok(())
    }

    /// Owner and collaborators of every team project.
    pub async fn users(&self, course: &CourseConfig) -> Result<Vec<(String, ProjectUsers)>> {
        let mut all = Vec::new();
        for nick in course.teams.keys() {
            let users = self.client.get_project_users(nick_to_title(nick)).await?;
            all.push((nick.clone(), users));
        }
        Ok(all)
    }

    /// Wake the single team's project and give the command to log in to it.
    pub async fn ssh_command(&self, course: &CourseConfig) -> Result<String> {
        let (nick, _) = course.single()?;
        let project_id = self.client.as_project_id(nick_to_title(nick)).await?;
        self.client
            .start_project(project_id.as_str(), self.wake)
            .await?;
        Ok(format!("ssh {}@{SSH_HOST}", strip_uuid(&project_id)))
    }
}
