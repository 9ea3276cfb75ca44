use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::UserConfig;
use crate::error::{CocalcError, Result};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

/// Per-call replacements for the client defaults.
#[derive(Debug, Clone, Default)]
pub struct CallOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

/// One authenticated request/response cycle against the API.
///
/// Implementations return the parsed body of a successful call. A non-success
/// status must become [`CocalcError::BadResponse`]; an `"event": "error"` body
/// under a success status is returned as-is for the caller to inspect.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn post(&self, operation: &str, payload: &Value, overrides: &CallOverrides)
        -> Result<Value>;
}

pub struct HttpTransport {
    http: Client,
    api_key: String,
    base_url: String,
}

impl HttpTransport {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self::with_client(Client::new(), api_key, base_url)
    }

    pub fn with_client(http: Client, api_key: String, base_url: String) -> Self {
        Self {
            http,
            api_key,
            base_url,
        }
    }

    fn endpoint(base_url: &str, operation: &str) -> Result<Url> {
        let base = Url::parse(base_url).map_err(|e| CocalcError::InvalidUrl(format!("{base_url}: {e}")))?;
        base.join(&format!("api/v1/{operation}"))
            .map_err(|e| CocalcError::InvalidUrl(format!("{base_url}: {e}")))
    }
}

/// Run `send` until it gets past connecting, at most `max_retries` extra times.
///
/// Only failures to connect are repeated, since a POST that reached the
/// server may have taken effect.
async fn send_with_retries<T, F, Fut>(max_retries: u32, mut send: F) -> reqwest::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = reqwest::Result<T>>,
{
    let mut attempt = 0;
    loop {
        match send().await {
            Err(e) if e.is_connect() && attempt < max_retries => {
                attempt += 1;
                warn!(attempt, "connection failed, retrying: {e}");
            }
            result => return result,
        }
    }
}

impl Transport for HttpTransport {
    async fn post(
        &self,
        operation: &str,
        payload: &Value,
        overrides: &CallOverrides,
    ) -> Result<Value> {
        let api_key = overrides.api_key.as_deref().unwrap_or(&self.api_key);
        let base_url = overrides.base_url.as_deref().unwrap_or(&self.base_url);
        let timeout = overrides.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let max_retries = overrides.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        let url = Self::endpoint(base_url, operation)?;

        let response = send_with_retries(max_retries, || {
            self.http
                .post(url.clone())
                .basic_auth(api_key, Some(""))
                .header("Content-Type", "application/json")
                .timeout(timeout)
                .json(payload)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(operation, %status, "API call complete");

        if status != StatusCode::OK {
            // Gateways answer errors with HTML; keep the raw text then.
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Err(CocalcError::BadResponse {
                status: status.as_u16(),
                payload: payload.clone(),
                body,
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| CocalcError::UnexpectedResponse(format!("{e} in body {text:?}")))
    }
}

/// Client for the platform API, parameterised over how requests travel.
pub struct CocalcClient<T = HttpTransport> {
    transport: T,
    user: UserConfig,
    account_id: Option<String>,
}

impl CocalcClient<HttpTransport> {
    pub fn from_config(user: UserConfig) -> Result<Self> {
        let transport = HttpTransport::new(user.api_key()?, user.base_url());
        Ok(Self::new(transport, user))
    }
}

impl<T: Transport> CocalcClient<T> {
    pub fn new(transport: T, user: UserConfig) -> Self {
        Self {
            transport,
            user,
            account_id: None,
        }
    }

    pub fn user(&self) -> &UserConfig {
        &self.user
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Generic API call: POST `payload` to `api/v1/{operation}`.
    pub async fn call_api(&self, operation: &str, payload: Value) -> Result<Value> {
        self.call_api_with(operation, payload, &CallOverrides::default())
            .await
    }

    pub async fn call_api_with(
        &self,
        operation: &str,
        payload: Value,
        overrides: &CallOverrides,
    ) -> Result<Value> {
        self.transport.post(operation, &payload, overrides).await
    }

    /// UUID of the account owning the API key, fetched on first use.
    pub async fn account_id(&mut self) -> Result<String> {
        if let Some(id) = &self.account_id {
            return Ok(id.clone());
        }
        let payload = json!({ "query": { "accounts": { "account_id": null } } });
        let response = self.call_api("query", payload).await?;
        let id = response
            .pointer("/query/accounts/account_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CocalcError::UnexpectedResponse(format!("no account_id in {response}"))
            })?
            .to_string();
        self.account_id = Some(id.clone());
        Ok(id)
    }
}

/// Fresh id for requests that the server tracks by message id.
pub fn make_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory transport for exercising client operations.

    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    pub type Reply = std::result::Result<Value, u16>;

    #[derive(Default)]
    pub struct FakeTransport {
        replies: RefCell<VecDeque<(String, Reply)>>,
        pub calls: RefCell<Vec<(String, Value, CallOverrides)>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a reply for the next call, which must be to `operation`.
        pub fn reply(self, operation: &str, body: Value) -> Self {
            self.replies
                .borrow_mut()
                .push_back((operation.to_string(), Ok(body)));
            self
        }

        /// Queue a non-success status for the next call.
        pub fn fail(self, operation: &str, status: u16) -> Self {
            self.replies
                .borrow_mut()
                .push_back((operation.to_string(), Err(status)));
            self
        }

        pub fn calls_to(&self, operation: &str) -> Vec<Value> {
            self.calls
                .borrow()
                .iter()
                .filter(|(op, _, _)| op == operation)
                .map(|(_, payload, _)| payload.clone())
                .collect()
        }

        pub fn overrides_to(&self, operation: &str) -> Vec<CallOverrides> {
            self.calls
                .borrow()
                .iter()
                .filter(|(op, _, _)| op == operation)
                .map(|(_, _, overrides)| overrides.clone())
                .collect()
        }

        pub fn remaining(&self) -> usize {
            self.replies.borrow().len()
        }
    }

    impl Transport for FakeTransport {
        async fn post(
            &self,
            operation: &str,
            payload: &Value,
            overrides: &CallOverrides,
        ) -> Result<Value> {
            self.calls
                .borrow_mut()
                .push((operation.to_string(), payload.clone(), overrides.clone()));
            let (expected, reply) = self
                .replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected call to {operation}: {payload}"));
            assert_eq!(expected, operation, "payload: {payload}");
            reply.map_err(|status| CocalcError::BadResponse {
                status,
                payload: payload.clone(),
                body: json!({ "event": "error", "error": "fake" }),
            })
        }
    }

    pub fn user() -> UserConfig {
        UserConfig {
            first_name: "Jane".to_string(),
            last_name: "Dunne".to_string(),
            api_key: Some("sk_test".to_string()),
            email: "jane.dunne@yourmail.com".to_string(),
            base_url: None,
        }
    }

    pub fn client(transport: FakeTransport) -> CocalcClient<FakeTransport> {
        CocalcClient::new(transport, user())
    }
}
