//! Client configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default master patch server host
pub const DEFAULT_MASTER_HOST: &str = "pathofexile.com";

/// Default master patch server port
pub const DEFAULT_MASTER_PORT: u16 = 12995;

/// Default HTTP user agent
pub const DEFAULT_USER_AGENT: &str = concat!("poe-patch/", env!("CARGO_PKG_VERSION"));

/// Configuration shared by the handshake session and the downloader.
///
/// Timeouts are unset by default, so every operation waits as long as the
/// network does. Set them here or wrap calls in `tokio::time::timeout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchConfig {
    /// Master patch server host name or IP address
    pub master_host: String,

    /// Master patch server port
    pub master_port: u16,

    /// Timeout for opening connections and, for the handshake, reading the reply
    pub connect_timeout: Option<Duration>,

    /// Timeout for a whole HTTP request including the body
    pub request_timeout: Option<Duration>,

    /// User agent sent with HTTP requests
    pub user_agent: String,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            master_host: DEFAULT_MASTER_HOST.to_string(),
            master_port: DEFAULT_MASTER_PORT,
            connect_timeout: None,
            request_timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl PatchConfig {
    /// Configuration pointing at a different master server
    pub fn with_master(host: impl Into<String>, port: u16) -> Self {
        Self {
            master_host: host.into(),
            master_port: port,
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `POE_PATCH_MASTER_HOST`, `POE_PATCH_MASTER_PORT`,
    /// `POE_PATCH_CONNECT_TIMEOUT` and `POE_PATCH_REQUEST_TIMEOUT` (seconds).
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = lookup("POE_PATCH_MASTER_HOST") {
            config.master_host = host;
        }
        if let Some(port) = lookup("POE_PATCH_MASTER_PORT") {
            config.master_port = parse_var("POE_PATCH_MASTER_PORT", port)?;
        }
        if let Some(secs) = lookup("POE_PATCH_CONNECT_TIMEOUT") {
            config.connect_timeout = Some(Duration::from_secs(parse_var(
                "POE_PATCH_CONNECT_TIMEOUT",
                secs,
            )?));
        }
        if let Some(secs) = lookup("POE_PATCH_REQUEST_TIMEOUT") {
            config.request_timeout = Some(Duration::from_secs(parse_var(
                "POE_PATCH_REQUEST_TIMEOUT",
                secs,
            )?));
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the connect timeout
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// `host:port` of the master server
    pub fn master_address(&self) -> String {
        format!("{}:{}", self.master_host, self.master_port)
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` for an empty host or a zero port.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.master_host.trim().is_empty() {
            return Err(ConfigError::MissingRequired("master host"));
        }
        if self.master_port == 0 {
            return Err(ConfigError::MissingRequired("master port"));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}
