use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::REQUEST_TIMEOUT_SECS;
use crate::connection::{ConnectionResolver, Credentials};
use crate::error::ExtractError;

/// Single authenticated read against the remote service.
///
/// Implemented by [`HttpTransport`] and by in-memory fakes in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ExtractError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ExtractError> {
        (**self).get(path, query).await
    }
}

/// `reqwest` transport. Adds `api-version`, applies the per-request timeout
/// and authenticates with whatever the resolver hands back.
pub struct HttpTransport {
    resolver: Arc<dyn ConnectionResolver>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(resolver: Arc<dyn ConnectionResolver>) -> Result<Self, ExtractError> {
        let connection = resolver.resolve()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(connection.on_premises)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| ExtractError::Transport {
                status: None,
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { resolver, client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ExtractError> {
        let connection = self.resolver.resolve()?;
        let mut url = connection
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ExtractError::Validation(format!("invalid path {:?}: {}", path, e)))?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                if key != "api-version" {
                    pairs.append_pair(key, value);
                }
            }
            pairs.append_pair("api-version", &connection.api_version);
        }

        debug!("GET {}", url);

        let request = self.client.get(url);
        let request = match &connection.credentials {
            Credentials::PersonalAccessToken(token) => request.basic_auth("", Some(token)),
            Credentials::Bearer(token) => request.bearer_auth(token),
        };

        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            let message = if body.is_empty() {
                format!("GET {} returned {}", path, status)
            } else {
                format!("GET {} returned {}: {}", path, status, body)
            };
            return Err(ExtractError::from_status(status, message));
        }

        let body: Value = resp.json().await?;
        Ok(body)
    }
}

/// Unwrap the `{"count": n, "value": [...]}` envelope list endpoints return.
/// A bare array is accepted as well.
pub fn list_items(body: Value) -> Result<Vec<Value>, ExtractError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("value") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(ExtractError::Decode(format!(
                "expected a list under \"value\", got {}",
                type_name(&other)
            ))),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(ExtractError::Decode(format!(
            "expected a list response, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
