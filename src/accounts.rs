use serde_json::json;
use tracing::{debug, info};

use crate::client::{CocalcClient, Transport};
use crate::error::{EntityKind, Result};
use crate::ident::Ident;
use crate::responses::{decode, ensure_not_error, UserSearchResponse};

/// Email sent with a collaboration invite.
#[derive(Debug, Clone, Default)]
pub struct Invitation {
    pub subject: String,
    pub body: String,
    /// Defaults to the configured account email.
    pub replyto: Option<String>,
    /// Defaults to the configured first and last name.
    pub replyto_name: Option<String>,
}

impl Invitation {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }
}

impl<T: Transport> CocalcClient<T> {
    /// Account UUIDs matching a user name or email address.
    pub async fn search_users(&self, query: &str) -> Result<Vec<String>> {
        let response = self
            .call_api("user_search", json!({ "query": query }))
            .await?;
        let found: UserSearchResponse = decode(&response)?;
        Ok(found.results.into_iter().map(|r| r.account_id).collect())
    }

    pub async fn as_account_id(&self, account: impl Into<Ident>) -> Result<String> {
        account
            .into()
            .resolve(EntityKind::Account, |query| async move {
                self.search_users(&query).await
            })
            .await
    }

    /// Invite one account to a project.
    pub async fn invite_collaborator(
        &self,
        collaborator: impl Into<Ident>,
        project: impl Into<Ident>,
        invitation: &Invitation,
    ) -> Result<serde_json::Value> {
        let collaborator = collaborator.into();
        let project = project.into();
        let account_id = self.as_account_id(collaborator.clone()).await?;
        let project_id = self.as_project_id(project.clone()).await?;

        let user = self.user();
        let replyto = invitation
            .replyto
            .clone()
            .unwrap_or_else(|| user.email.clone());
        let replyto_name = invitation
            .replyto_name
            .clone()
            .unwrap_or_else(|| user.full_name());

        let payload = json!({
            "account_id": account_id,
            "project_id": project_id,
            "subject": invitation.subject,
            "email": invitation.body,
            "replyto": replyto,
            "replyto_name": replyto_name,
        });
        info!(%collaborator, %project, "inviting collaborator");
        let response = self.call_api("invite_collaborator", payload).await?;
        ensure_not_error(format!("Inviting {collaborator} to {project}"), response)
    }

    /// Invite each of `collaborators` not already owner or collaborator.
    ///
    /// Returns the account ids that were invited.
    pub async fn invite_collaborators<I>(
        &self,
        collaborators: I,
        project: impl Into<Ident>,
        invitation: &Invitation,
    ) -> Result<Vec<String>>
    where
        I: IntoIterator,
        I::Item: Into<Ident>,
    {
        let project_id = self.as_project_id(project).await?;
        let mut account_ids = Vec::new();
        for collaborator in collaborators {
            account_ids.push(self.as_account_id(collaborator).await?);
        }

        let members = self.get_project_users(project_id.as_str()).await?;
        let mut invited = Vec::new();
        for account_id in account_ids {
            if members.contains(&account_id) || invited.contains(&account_id) {
                debug!(%account_id, "already on project, skipping invite");
                continue;
            }
            self.invite_collaborator(account_id.as_str(), project_id.as_str(), invitation)
                .await?;
            invited.push(account_id);
        }
        Ok(invited)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::client::testing::*;
    use crate::error::CocalcError;

    const PROJECT: &str = "11111111-2222-3333-4444-555555555555";
    const A: &str = "aaaaaaaa-0000-0000-0000-000000000001";
    const B: &str = "bbbbbbbb-0000-0000-0000-000000000002";
    const C: &str = "cccccccc-0000-0000-0000-000000000003";

    fn users_reply() -> serde_json::Value {
        json!({ "query": { "projects": { "users": {
            A: { "group": "owner" },
            B: { "group": "collaborator" },
        } } } })
    }

    #[tokio::test]
    async fn test_search_users() {
        let fake = FakeTransport::new().reply(
            "user_search",
            json!({ "results": [{ "account_id": A, "first_name": "Ann" }] }),
        );
        let client = client(fake);
        assert_eq!(client.search_users("ann@uni.ac.uk").await.unwrap(), vec![A]);
        assert_eq!(
            client.transport().calls_to("user_search")[0],
            json!({ "query": "ann@uni.ac.uk" })
        );
    }

    #[tokio::test]
    async fn test_as_account_id_ambiguous() {
        let fake = FakeTransport::new().reply(
            "user_search",
            json!({ "results": [{ "account_id": A }, { "account_id": B }] }),
        );
        let err = client(fake).as_account_id("Smith").await.unwrap_err();
        assert!(matches!(err, CocalcError::Ambiguous { kind: EntityKind::Account, .. }));
    }

    #[tokio::test]
    async fn test_invite_defaults_reply_to_own_identity() {
        let fake = FakeTransport::new().reply("invite_collaborator", json!({ "event": "success" }));
        let client = client(fake);
        client
            .invite_collaborator(C, PROJECT, &Invitation::new("Hi", "Join us"))
            .await
            .unwrap();

        let payload = &client.transport().calls_to("invite_collaborator")[0];
        assert_eq!(payload["account_id"], C);
        assert_eq!(payload["project_id"], PROJECT);
        assert_eq!(payload["email"], "Join us");
        assert_eq!(payload["replyto"], "jane.dunne@yourmail.com");
        assert_eq!(payload["replyto_name"], "Jane Dunne");
    }

    #[tokio::test]
    async fn test_invite_error_event_raises() {
        let body = json!({ "event": "error", "error": "not allowed" });
        let fake = FakeTransport::new().reply("invite_collaborator", body.clone());
        let err = client(fake)
            .invite_collaborator(C, PROJECT, &Invitation::new("Hi", "Join us"))
            .await
            .unwrap_err();
        match err {
            CocalcError::Remote { response, .. } => assert_eq!(response, body),
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invite_collaborators_skips_members() {
        let fake = FakeTransport::new()
            .reply("query", users_reply())
            .reply("invite_collaborator", json!({ "event": "success" }));
        let client = client(fake);
        let invited = client
            .invite_collaborators([A, B, C], PROJECT, &Invitation::new("Hi", "Join us"))
            .await
            .unwrap();

        assert_eq!(invited, vec![C]);
        let invites = client.transport().calls_to("invite_collaborator");
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0]["account_id"], C);
        assert_eq!(client.transport().remaining(), 0);
    }

    #[tokio::test]
    async fn test_invite_collaborators_resolves_names() {
        let fake = FakeTransport::new()
            .reply("user_search", json!({ "results": [{ "account_id": C }] }))
            .reply("query", users_reply())
            .reply("invite_collaborator", json!({ "event": "success" }));
        let client = client(fake);
        let invited = client
            .invite_collaborators(["carol@uni.ac.uk"], PROJECT, &Invitation::new("Hi", "Join"))
            .await
            .unwrap();
        assert_eq!(invited, vec![C]);
    }
}
