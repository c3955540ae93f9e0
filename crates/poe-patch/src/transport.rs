//! HTTP transport for content downloads

use crate::config::PatchConfig;
use crate::error::Error;
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;

/// Shared HTTP client used by [`PatchDownloader`](crate::PatchDownloader).
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a client from configuration
    pub fn new(config: &PatchConfig) -> Result<Self, Error> {
        let mut builder = ClientBuilder::new()
            .use_rustls_tls()
            .https_only(false)
            .gzip(true)
            .deflate(true)
            .user_agent(config.user_agent.clone());

        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(Error::HttpClient)?;
        Ok(Self::with_client(client))
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
