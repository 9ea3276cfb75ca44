//! Shared API response types used across operations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CocalcError, Result};

/// Raise [`CocalcError::Remote`] when a 2xx body reports `"event": "error"`.
pub fn ensure_not_error(action: impl Into<String>, response: Value) -> Result<Value> {
    if response.get("event").and_then(Value::as_str) == Some("error") {
        return Err(CocalcError::Remote {
            action: action.into(),
            response,
        });
    }
    Ok(response)
}

/// Deserialize a typed view out of a response body.
pub fn decode<T: serde::de::DeserializeOwned>(response: &Value) -> Result<T> {
    T::deserialize(response)
        .map_err(|e| CocalcError::UnexpectedResponse(format!("{e} in {response}")))
}

/// Result of running a command inside a project.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ExecOutput {
    pub event: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i64,
}

#[derive(Deserialize)]
pub struct UserSearchResponse {
    pub results: Vec<AccountHit>,
}

#[derive(Deserialize)]
pub struct AccountHit {
    pub account_id: String,
}

#[derive(Deserialize)]
pub struct ProjectHit {
    pub project_id: String,
}

#[derive(Deserialize)]
pub struct CreatedProject {
    pub project_id: String,
}

/// Entry of a project's `users` map.
#[derive(Deserialize)]
pub struct ProjectUserInfo {
    pub group: String,
}

pub type ProjectUsersMap = HashMap<String, ProjectUserInfo>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_not_error_passes_success() {
        let body = json!({ "event": "project_exec_output", "exit_code": 0 });
        assert_eq!(ensure_not_error("ls", body.clone()).unwrap(), body);
        assert!(ensure_not_error("ls", json!({ "status": "ok" })).is_ok());
    }

    #[test]
    fn test_ensure_not_error_keeps_response() {
        let body = json!({ "event": "error", "error": "project not running" });
        match ensure_not_error("ls failed on team-a", body.clone()) {
            Err(CocalcError::Remote { action, response }) => {
                assert_eq!(action, "ls failed on team-a");
                assert_eq!(response, body);
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_exec_output_defaults() {
        let out: ExecOutput = decode(&json!({ "event": "project_exec_output" })).unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.is_empty());
        assert!(decode::<CreatedProject>(&json!({})).is_err());
    }
}
