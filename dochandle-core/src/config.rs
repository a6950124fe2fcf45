//! Connection parameters.
//!
//! A [`ConnectionConfig`] is built once, usually at process start, and never mutated.
//! It can be assembled with [`ConnectionConfig::builder`], derived from a connection
//! string with [`ConnectionConfig::from_uri`], read from the environment with
//! [`ConnectionConfig::from_env`], or deserialized from JSON.

use std::{env, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

pub const ENV_URI: &str = "DOCHANDLE_URI";
pub const ENV_RETRY_WRITES: &str = "DOCHANDLE_RETRY_WRITES";
pub const ENV_WRITE_CONCERN: &str = "DOCHANDLE_WRITE_CONCERN";
pub const ENV_APP_NAME: &str = "DOCHANDLE_APP_NAME";
pub const ENV_SHUTDOWN_POLICY: &str = "DOCHANDLE_SHUTDOWN_POLICY";

/// Stable server API version requested during the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerApiVersion {
    #[default]
    V1,
}

/// Acknowledgment level required before a write is considered successful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteConcern {
    #[default]
    Majority,
    /// Acknowledged by the primary only (`w=1`).
    Acknowledged,
    /// Fire-and-forget (`w=0`).
    Unacknowledged,
    /// Acknowledged by the given number of nodes.
    Nodes(u32),
}

impl FromStr for WriteConcern {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "majority" => Ok(WriteConcern::Majority),
            "acknowledged" | "1" => Ok(WriteConcern::Acknowledged),
            "unacknowledged" | "0" => Ok(WriteConcern::Unacknowledged),
            other => other
                .parse::<u32>()
                .map(WriteConcern::Nodes)
                .map_err(|_| DocumentStoreError::InvalidConfig(format!("unknown write concern `{s}`"))),
        }
    }
}

/// What the registry does when a client is requested after [`shutdown`](crate::registry::ClientRegistry::shutdown).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Fail with [`DocumentStoreError::RegistryClosed`].
    #[default]
    Reject,
    /// Connect again on the next request.
    Reinitialize,
}

impl FromStr for ShutdownPolicy {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(ShutdownPolicy::Reject),
            "reinitialize" => Ok(ShutdownPolicy::Reinitialize),
            _ => Err(DocumentStoreError::InvalidConfig(format!("unknown shutdown policy `{s}`"))),
        }
    }
}

fn default_retry_writes() -> bool {
    true
}

/// Immutable connection parameters.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    endpoint_uri: String,
    #[serde(default)]
    api_version: ServerApiVersion,
    #[serde(default = "default_retry_writes")]
    retry_writes: bool,
    #[serde(default)]
    write_concern: WriteConcern,
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    shutdown_policy: ShutdownPolicy,
}

impl ConnectionConfig {
    pub fn builder(endpoint_uri: impl Into<String>) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(endpoint_uri)
    }

    /// Builds a config from a connection string, honoring the `retryWrites`, `w` and
    /// `appName` query options it carries.
    pub fn from_uri(uri: &str) -> DocumentStoreResult<Self> {
        let mut builder = Self::builder(uri);

        if let Some((_, query)) = uri.split_once('?') {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));

                builder = match key {
                    "retryWrites" => builder.retry_writes(parse_bool(key, value)?),
                    "w" => builder.write_concern(value.parse()?),
                    "appName" => builder.app_name(value),
                    _ => builder,
                };
            }
        }

        builder.build()
    }

    /// Reads the config from `DOCHANDLE_*` environment variables. Only `DOCHANDLE_URI` is required;
    /// the others override what the URI specifies.
    pub fn from_env() -> DocumentStoreResult<Self> {
        let uri = env::var(ENV_URI)
            .map_err(|_| DocumentStoreError::InvalidConfig(format!("{ENV_URI} is not set")))?;
        let base = Self::from_uri(&uri)?;
        let mut builder = ConnectionConfigBuilder { config: base };

        if let Ok(value) = env::var(ENV_RETRY_WRITES) {
            builder = builder.retry_writes(parse_bool(ENV_RETRY_WRITES, &value)?);
        }
        if let Ok(value) = env::var(ENV_WRITE_CONCERN) {
            builder = builder.write_concern(value.parse()?);
        }
        if let Ok(value) = env::var(ENV_APP_NAME) {
            builder = builder.app_name(value);
        }
        if let Ok(value) = env::var(ENV_SHUTDOWN_POLICY) {
            builder = builder.shutdown_policy(value.parse()?);
        }

        builder.build()
    }

    pub fn from_json(json: &str) -> DocumentStoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> DocumentStoreResult<()> {
        if self.endpoint_uri.trim().is_empty() {
            return Err(DocumentStoreError::InvalidConfig("endpoint URI is empty".into()));
        }
        if !self.endpoint_uri.contains("://") {
            return Err(DocumentStoreError::InvalidConfig(format!(
                "endpoint URI `{}` has no scheme",
                self.redacted_uri()
            )));
        }

        Ok(())
    }

    pub fn endpoint_uri(&self) -> &str {
        &self.endpoint_uri
    }

    pub fn api_version(&self) -> ServerApiVersion {
        self.api_version
    }

    pub fn retry_writes(&self) -> bool {
        self.retry_writes
    }

    pub fn write_concern(&self) -> WriteConcern {
        self.write_concern
    }

    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.shutdown_policy
    }

    /// The endpoint URI with any `user:password@` credentials masked, safe for logs.
    pub fn redacted_uri(&self) -> String {
        let Some(scheme_end) = self.endpoint_uri.find("://") else {
            return self.endpoint_uri.clone();
        };
        let rest = &self.endpoint_uri[scheme_end + 3..];
        // Credentials can only appear in the authority, before the path or options.
        let authority = rest.find(['/', '?']).map_or(rest, |end| &rest[..end]);

        match authority.rfind('@') {
            Some(at) => format!("{}://***@{}", &self.endpoint_uri[..scheme_end], &rest[at + 1..]),
            None => self.endpoint_uri.clone(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint_uri", &self.redacted_uri())
            .field("api_version", &self.api_version)
            .field("retry_writes", &self.retry_writes)
            .field("write_concern", &self.write_concern)
            .field("app_name", &self.app_name)
            .field("shutdown_policy", &self.shutdown_policy)
            .finish()
    }
}

fn parse_bool(key: &str, value: &str) -> DocumentStoreResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(DocumentStoreError::InvalidConfig(format!("`{key}` expects a boolean, got `{value}`"))),
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    pub fn new(endpoint_uri: impl Into<String>) -> Self {
        Self {
            config: ConnectionConfig {
                endpoint_uri: endpoint_uri.into(),
                api_version: ServerApiVersion::V1,
                retry_writes: true,
                write_concern: WriteConcern::Majority,
                app_name: None,
                shutdown_policy: ShutdownPolicy::Reject,
            },
        }
    }

    pub fn api_version(mut self, version: ServerApiVersion) -> Self {
        self.config.api_version = version;
        self
    }

    pub fn retry_writes(mut self, retry_writes: bool) -> Self {
        self.config.retry_writes = retry_writes;
        self
    }

    pub fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.config.write_concern = write_concern;
        self
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.config.app_name = Some(app_name.into());
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.config.shutdown_policy = policy;
        self
    }

    pub fn build(self) -> DocumentStoreResult<ConnectionConfig> {
        self.config.validate()?;

        Ok(self.config)
    }
}
