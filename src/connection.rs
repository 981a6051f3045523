use url::Url;

use crate::config::{ExtractorConfig, TOKEN_ENV_VAR};
use crate::error::ExtractError;

/// How requests authenticate against the remote service.
#[derive(Clone)]
pub enum Credentials {
    /// Personal access token, sent as HTTP basic auth with an empty user.
    PersonalAccessToken(String),
    Bearer(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::PersonalAccessToken(_) => f.write_str("PersonalAccessToken(***)"),
            Credentials::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub base_url: Url,
    pub credentials: Credentials,
    pub api_version: String,
    /// On-premises servers commonly run with self-signed certificates.
    pub on_premises: bool,
}

/// Supplies the base URL and credentials for every request.
///
/// Credential storage lives outside this crate; implementations only hand
/// over what has already been configured.
pub trait ConnectionResolver: Send + Sync {
    fn resolve(&self) -> Result<Connection, ExtractError>;
}

/// Resolver holding a fixed connection.
pub struct StaticResolver {
    connection: Connection,
}

impl StaticResolver {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Build a connection from the configured URL and the token in
    /// `PLAN_SNAPSHOT_TOKEN`.
    pub fn from_env(config: &ExtractorConfig) -> Result<Self, ExtractError> {
        let token = std::env::var(TOKEN_ENV_VAR).map_err(|_| {
            ExtractError::Validation(format!("{} is not set", TOKEN_ENV_VAR))
        })?;
        Self::from_parts(config, token)
    }

    pub fn from_parts(config: &ExtractorConfig, token: String) -> Result<Self, ExtractError> {
        if token.trim().is_empty() {
            return Err(ExtractError::Validation("access token is empty".to_string()));
        }
        let base_url = parse_base_url(&config.org_url)?;

        Ok(Self::new(Connection {
            base_url,
            credentials: Credentials::PersonalAccessToken(token),
            api_version: config.api_version.clone(),
            on_premises: config.on_premises,
        }))
    }
}

impl ConnectionResolver for StaticResolver {
    fn resolve(&self) -> Result<Connection, ExtractError> {
        Ok(self.connection.clone())
    }
}

/// Parse an organization URL, forcing a trailing slash so relative paths
/// join beneath it instead of replacing its last segment.
pub fn parse_base_url(raw: &str) -> Result<Url, ExtractError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };

    let url = Url::parse(&with_slash)
        .map_err(|e| ExtractError::Validation(format!("invalid org url {:?}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ExtractError::Validation(format!(
            "unsupported url scheme {:?}",
            other
        ))),
    }
}
