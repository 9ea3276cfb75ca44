use serde_json::json;

use crate::client::{make_request_id, CallOverrides, CocalcClient, Transport, DEFAULT_TIMEOUT};
use crate::error::Result;
use crate::ident::Ident;
use crate::responses::{decode, ensure_not_error, ExecOutput};

/// How to run a command inside a project.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub args: Vec<String>,
    /// Working directory; empty means the project home.
    pub cwd: String,
    /// Seconds the project may spend on the command.
    pub timeout: u64,
    pub bash: bool,
    pub err_on_exit: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            cwd: String::new(),
            timeout: 10,
            bash: false,
            err_on_exit: false,
        }
    }
}

impl ExecOptions {
    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }
}

impl<T: Transport> CocalcClient<T> {
    pub async fn project_exec(
        &self,
        project: impl Into<Ident>,
        command: &str,
        options: &ExecOptions,
    ) -> Result<ExecOutput> {
        let project = project.into();
        let payload = json!({
            "id": make_request_id(),
            "project_id": self.as_project_id(project.clone()).await?,
            "path": options.cwd,
            "command": command,
            "timeout": options.timeout,
            "args": options.args,
            "bash": options.bash,
            "err_on_exit": options.err_on_exit,
        });
        // The HTTP call must outlive the remote command.
        let overrides = CallOverrides {
            timeout: Some(DEFAULT_TIMEOUT + std::time::Duration::from_secs(options.timeout)),
            ..Default::default()
        };
        let response = self
            .call_api_with("project_exec", payload, &overrides)
            .await?;
        let response = ensure_not_error(format!("{command} failed on {project}"), response)?;
        decode(&response)
    }

    pub async fn write_text_file_to_project(
        &self,
        project: impl Into<Ident>,
        path: &str,
        content: &str,
    ) -> Result<serde_json::Value> {
        let project = project.into();
        let payload = json!({
            "id": make_request_id(),
            "project_id": self.as_project_id(project.clone()).await?,
            "path": path,
            "content": content,
        });
        let response = self.call_api("write_text_file_to_project", payload).await?;
        ensure_not_error(format!("Write to {path} failed on {project}"), response)
    }
}
