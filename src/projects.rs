use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::{make_request_id, CocalcClient, Transport};
use crate::error::{CocalcError, EntityKind, Result};
use crate::exec::ExecOptions;
use crate::ident::Ident;
use crate::responses::{decode, ensure_not_error, CreatedProject, ProjectHit, ProjectUsersMap};

/// Named quota fields applied to a project, e.g. `cores`, `memory`,
/// `mintime`, `network`, `member_host`, `disk_quota`.
pub type Upgrades = BTreeMap<String, i64>;

/// How hard to try waking a sleeping project.
#[derive(Debug, Clone, Copy)]
pub struct WakePolicy {
    pub wait: Duration,
    pub retries: u32,
}

impl Default for WakePolicy {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(5),
            retries: 10,
        }
    }
}

/// Owner and collaborators of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectUsers {
    pub owner: String,
    pub collaborators: BTreeSet<String>,
}

impl ProjectUsers {
    fn from_map(users: ProjectUsersMap) -> Result<Self> {
        let mut owner = None;
        let mut collaborators = BTreeSet::new();
        for (account_id, info) in users {
            match info.group.as_str() {
                "collaborator" => {
                    collaborators.insert(account_id);
                }
                "owner" => {
                    if let Some(first) = &owner {
                        return Err(CocalcError::Integrity(format!(
                            "project has two owners, {first} and {account_id}"
                        )));
                    }
                    owner = Some(account_id);
                }
                other => {
                    return Err(CocalcError::Integrity(format!(
                        "unknown user group {other:?} for {account_id}"
                    )))
                }
            }
        }
        let owner =
            owner.ok_or_else(|| CocalcError::Integrity("project has no owner".to_string()))?;
        Ok(Self {
            owner,
            collaborators,
        })
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.owner == account_id || self.collaborators.contains(account_id)
    }
}

/// A wake attempt fails this way while the project is still starting.
fn project_not_ready(e: &CocalcError) -> bool {
    match e {
        CocalcError::Http(e) => e.is_timeout(),
        e => e.is_remote(),
    }
}

impl<T: Transport> CocalcClient<T> {
    /// Ids of projects whose title matches `title`.
    ///
    /// With `only_recent`, search just the 20 most recently used projects,
    /// which is much faster.
    pub async fn projects_by_title(&self, title: &str, only_recent: bool) -> Result<Vec<String>> {
        let table = if only_recent { "projects" } else { "projects_all" };
        let payload = json!({ "query": { table: [
            { "project_id": null, "title": title, "description": null }
        ] } });
        let response = self.call_api("query", payload).await?;
        let rows = response
            .pointer(&format!("/query/{table}"))
            .cloned()
            .unwrap_or(Value::Null);
        let hits: Vec<ProjectHit> = decode(&rows)?;
        Ok(hits.into_iter().map(|h| h.project_id).collect())
    }

    pub async fn as_project_id(&self, project: impl Into<Ident>) -> Result<String> {
        project
            .into()
            .resolve(EntityKind::Project, |title| async move {
                self.projects_by_title(&title, false).await
            })
            .await
    }

    /// Create a project, or return the id of the one already titled `title`.
    pub async fn create_project(&self, title: &str, description: &str, start: bool) -> Result<String> {
        match self.as_project_id(title).await {
            Ok(project_id) => {
                info!(%project_id, title, "found existing project, skipping creation");
                return Ok(project_id);
            }
            Err(CocalcError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        info!(title, "creating project");
        let payload = json!({ "title": title, "description": description, "start": start });
        let response = self.call_api("create_project", payload).await?;
        debug!(%response, "create_project response");
        let response = ensure_not_error(format!("Creating project {title}"), response)?;
        let created: CreatedProject = decode(&response)?;
        Ok(created.project_id)
    }

    /// Mark the project as actively used so it does not idle out.
    pub async fn touch_project(&self, project: impl Into<Ident>) -> Result<String> {
        let project_id = self.as_project_id(project).await?;
        let payload = json!({ "id": make_request_id(), "project_id": project_id });
        let response = self.call_api("touch_project", payload).await?;
        response
            .get("event")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| CocalcError::UnexpectedResponse(format!("no event in {response}")))
    }

    /// Wake a project by running `date` in it until it answers.
    ///
    /// Every failed attempt is followed by a `policy.wait` sleep. Once an
    /// attempt succeeds, `date` runs once more and must exit with status 0.
    pub async fn start_project(&self, project: impl Into<Ident>, policy: WakePolicy) -> Result<()> {
        let project = project.into();
        let project_id = self.as_project_id(project.clone()).await?;
        let probe = ExecOptions::default();

        let mut awake = false;
        for attempt in 1..=policy.retries {
            match self.project_exec(project_id.as_str(), "date", &probe).await {
                Ok(_) => {
                    awake = true;
                    break;
                }
                Err(e) if project_not_ready(&e) => {
                    debug!(%project, attempt, "project not answering yet: {e}");
                    tokio::time::sleep(policy.wait).await;
                }
                Err(e) => return Err(e),
            }
        }
        if !awake {
            warn!(%project, retries = policy.retries, "project did not wake");
            return Err(CocalcError::Timeout(project.to_string()));
        }

        let output = self.project_exec(project_id.as_str(), "date", &probe).await?;
        if output.exit_code != 0 {
            return Err(CocalcError::Integrity(format!(
                "`date` exited with {} on awake project {project}",
                output.exit_code
            )));
        }
        Ok(())
    }

    pub async fn get_project_users(&self, project: impl Into<Ident>) -> Result<ProjectUsers> {
        let project_id = self.as_project_id(project).await?;
        let payload = json!({ "query": { "projects": { "project_id": project_id, "users": null } } });
        let response = self.call_api("query", payload).await?;
        let users = response
            .pointer("/query/projects/users")
            .cloned()
            .unwrap_or(Value::Null);
        ProjectUsers::from_map(decode(&users)?)
    }

    /// Apply `upgrades` to a project on behalf of `account`, or of the
    /// configured account when `None`.
    pub async fn upgrade_project(
        &mut self,
        project: impl Into<Ident>,
        account: Option<Ident>,
        upgrades: &Upgrades,
    ) -> Result<Value> {
        let project = project.into();
        let project_id = self.as_project_id(project.clone()).await?;
        let account_id = match account {
            Some(account) => self.as_account_id(account).await?,
            None => self.account_id().await?,
        };
        let payload = json!({ "query": { "projects": {
            "project_id": project_id,
            "users": { account_id: { "upgrades": upgrades } },
        } } });
        info!(%project, ?upgrades, "upgrading project");
        let response = self.call_api("query", payload).await?;
        ensure_not_error(format!("Upgrade to {project}"), response)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::client::testing::*;

    const P: &str = "11111111-2222-3333-4444-555555555555";
    const A: &str = "aaaaaaaa-0000-0000-0000-000000000001";
    const B: &str = "bbbbbbbb-0000-0000-0000-000000000002";
    const C: &str = "cccccccc-0000-0000-0000-000000000003";

    fn exec_ok() -> Value {
        json!({ "event": "project_exec_output", "stdout": "Mon Oct 19\n", "stderr": "", "exit_code": 0 })
    }

    fn exec_err() -> Value {
        json!({ "event": "error", "error": "project not running" })
    }

    #[tokio::test]
    async fn test_projects_by_title_query_shape() {
        let fake = FakeTransport::new()
            .reply("query", json!({ "query": { "projects_all": [{ "project_id": P, "title": "team-a" }] } }))
            .reply("query", json!({ "query": { "projects": [] } }));
        let client = client(fake);
        assert_eq!(client.projects_by_title("team-a", false).await.unwrap(), vec![P]);
        assert!(client.projects_by_title("team-a", true).await.unwrap().is_empty());

        let calls = client.transport().calls_to("query");
        assert_eq!(calls[0]["query"]["projects_all"][0]["title"], "team-a");
        assert!(calls[1]["query"]["projects"].is_array());
    }

    #[tokio::test]
    async fn test_create_project_is_idempotent() {
        let fake = FakeTransport::new()
            .reply("query", json!({ "query": { "projects_all": [] } }))
            .reply("create_project", json!({ "event": "project_created", "project_id": P }))
            .reply("query", json!({ "query": { "projects_all": [{ "project_id": P }] } }));
        let client = client(fake);

        let first = client.create_project("team-a", "Project for Team-a", true).await.unwrap();
        let second = client.create_project("team-a", "Project for Team-a", true).await.unwrap();

        assert_eq!(first, P);
        assert_eq!(second, P);
        let creates = client.transport().calls_to("create_project");
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0], json!({ "title": "team-a", "description": "Project for Team-a", "start": true }));
    }

    #[tokio::test]
    async fn test_create_project_refuses_ambiguous_title() {
        let fake = FakeTransport::new().reply(
            "query",
            json!({ "query": { "projects_all": [{ "project_id": P }, { "project_id": A }] } }),
        );
        let err = client(fake).create_project("team-a", "d", false).await.unwrap_err();
        assert!(matches!(err, CocalcError::Ambiguous { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_touch_project_returns_event() {
        let fake = FakeTransport::new().reply("touch_project", json!({ "event": "success" }));
        let client = client(fake);
        assert_eq!(client.touch_project(P).await.unwrap(), "success");
        let payload = &client.transport().calls_to("touch_project")[0];
        assert_eq!(payload["project_id"], P);
        assert!(crate::ident::looks_like_uuid(payload["id"].as_str().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_project_retries_then_confirms() {
        let k = 3;
        let mut fake = FakeTransport::new();
        for _ in 0..k {
            fake = fake.reply("project_exec", exec_err());
        }
        let fake = fake
            .reply("project_exec", exec_ok())
            .reply("project_exec", exec_ok());
        let client = client(fake);
        let policy = WakePolicy { wait: Duration::from_secs(5), retries: 10 };

        let started = tokio::time::Instant::now();
        client.start_project(P, policy).await.unwrap();

        assert_eq!(started.elapsed(), policy.wait * k);
        // k failures, one success, one confirming run
        assert_eq!(client.transport().calls_to("project_exec").len(), k as usize + 2);
        assert_eq!(client.transport().remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_project_retries_bad_gateway() {
        let fake = FakeTransport::new()
            .fail("project_exec", 502)
            .reply("project_exec", exec_ok())
            .reply("project_exec", exec_ok());
        let client = client(fake);
        let policy = WakePolicy { wait: Duration::from_secs(5), retries: 3 };

        let started = tokio::time::Instant::now();
        client.start_project(P, policy).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(client.transport().remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_project_times_out() {
        let mut fake = FakeTransport::new();
        for _ in 0..4 {
            fake = fake.reply("project_exec", exec_err());
        }
        let client = client(fake);
        let policy = WakePolicy { wait: Duration::from_secs(2), retries: 4 };

        let started = tokio::time::Instant::now();
        let err = client.start_project(P, policy).await.unwrap_err();

        assert!(matches!(err, CocalcError::Timeout(_)));
        assert_eq!(started.elapsed(), Duration::from_secs(8));
        assert_eq!(client.transport().calls_to("project_exec").len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_project_nonzero_confirm_is_integrity_fault() {
        let fake = FakeTransport::new()
            .reply("project_exec", exec_ok())
            .reply("project_exec", json!({ "event": "project_exec_output", "exit_code": 1 }));
        let err = client(fake)
            .start_project(P, WakePolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CocalcError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_get_project_users() {
        let fake = FakeTransport::new().reply(
            "query",
            json!({ "query": { "projects": { "project_id": P, "users": {
                A: { "group": "owner", "hide": false },
                B: { "group": "collaborator" },
                C: { "group": "collaborator" },
            } } } }),
        );
        let users = client(fake).get_project_users(P).await.unwrap();
        assert_eq!(users.owner, A);
        assert_eq!(users.collaborators, BTreeSet::from([B.to_string(), C.to_string()]));
        assert!(users.contains(A) && users.contains(C));
    }

    #[tokio::test]
    async fn test_get_project_users_two_owners() {
        let fake = FakeTransport::new().reply(
            "query",
            json!({ "query": { "projects": { "users": {
                A: { "group": "owner" },
                B: { "group": "owner" },
            } } } }),
        );
        let err = client(fake).get_project_users(P).await.unwrap_err();
        assert!(matches!(err, CocalcError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_get_project_users_unknown_group() {
        let fake = FakeTransport::new().reply(
            "query",
            json!({ "query": { "projects": { "users": {
                A: { "group": "owner" },
                B: { "group": "invited" },
            } } } }),
        );
        let err = client(fake).get_project_users(P).await.unwrap_err();
        assert!(matches!(err, CocalcError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_upgrade_project_uses_own_account() {
        let fake = FakeTransport::new()
            .reply("query", json!({ "query": { "accounts": { "account_id": A } } }))
            .reply("query", json!({ "event": "query", "query": {} }));
        let mut client = client(fake);
        let upgrades = Upgrades::from([("cores".to_string(), 2), ("memory".to_string(), 1000)]);
        client.upgrade_project(P, None, &upgrades).await.unwrap();

        let calls = client.transport().calls_to("query");
        assert_eq!(
            calls[1],
            json!({ "query": { "projects": {
                "project_id": P,
                "users": { A: { "upgrades": { "cores": 2, "memory": 1000 } } },
            } } })
        );
    }

    #[tokio::test]
    async fn test_upgrade_project_error_event() {
        let body = json!({ "event": "error", "error": "insufficient upgrades" });
        let fake = FakeTransport::new().reply("query", body.clone());
        let mut client = client(fake);
        let err = client
            .upgrade_project(P, Some(Ident::parse(B)), &Upgrades::new())
            .await
            .unwrap_err();
        match err {
            CocalcError::Remote { response, .. } => assert_eq!(response, body),
            other => panic!("expected remote error, got {other:?}"),
        }
    }
}
