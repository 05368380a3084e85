//! Request/response collaborator for pulled state.
//!
//! The core only needs `fetch(path, params) -> data`; pagination, retries
//! and payload shapes beyond the `{data}` envelope belong to the backend.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PullMethod {
    Get,
    Patch,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    pub method: PullMethod,
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl PullRequest {
    fn new(method: PullMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(PullMethod::Get, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(PullMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(PullMethod::Delete, path)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// The pull collaborator. Implementations return the unwrapped `data`
/// member of the response envelope.
pub trait PullClient: Send + Sync {
    fn send(&self, request: PullRequest) -> BoxFuture<'_, SyncResult<Value>>;
}

pub type SharedPullClient = Arc<dyn PullClient>;

/// Send `request` and decode the envelope's `data` into `T`.
pub async fn pull_data<T: DeserializeOwned>(
    client: &dyn PullClient,
    request: PullRequest,
) -> SyncResult<T> {
    let path = request.path.clone();
    let data = client.send(request).await?;
    serde_json::from_value(data).map_err(|e| SyncError::Decode {
        message: format!("{}: {}", path, e),
    })
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Value,
}

/// Unwrap `{data: T}`. Empty bodies (204) and bodies without an envelope
/// yield `Value::Null`.
fn unwrap_envelope(body: &str) -> SyncResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(body)?;
    if value.is_object() {
        let envelope: Envelope = serde_json::from_value(value)?;
        Ok(envelope.data)
    } else {
        Ok(Value::Null)
    }
}

/// reqwest-backed pull collaborator against one base URL.
#[derive(Clone)]
pub struct HttpPullClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPullClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(
            config.api_base_url.clone(),
            config.auth_token.clone(),
            config.request_timeout(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute(&self, request: PullRequest) -> SyncResult<Value> {
        let url = self.url(&request.path);
        let builder = match request.method {
            PullMethod::Get => self.http.get(&url).query(&request.params),
            PullMethod::Patch => self.http.patch(&url).json(&params_object(&request.params)),
            PullMethod::Delete => self.http.delete(&url).query(&request.params),
        };
        let builder = match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };

        debug!(method = ?request.method, path = %request.path, "pull");
        let response = builder.send().await.map_err(|e| SyncError::Pull {
            path: request.path.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http {
                path: request.path,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| SyncError::Pull {
            path: request.path.clone(),
            message: e.to_string(),
        })?;
        unwrap_envelope(&body)
    }
}

fn params_object(params: &[(String, String)]) -> Value {
    Value::Object(
        params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

impl PullClient for HttpPullClient {
    fn send(&self, request: PullRequest) -> BoxFuture<'_, SyncResult<Value>> {
        Box::pin(self.execute(request))
    }
}
