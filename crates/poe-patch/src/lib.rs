//! Path of Exile patch server client.
//!
//! Discovers the current download base URLs through the master patch
//! server's binary handshake, then downloads individual content files over
//! HTTP.
//!
//! # Architecture
//!
//! - `protocol`: handshake wire format and the discovered [`PatchUrls`]
//! - `session`: [`PatchSession`], which owns the master connection
//! - `download`: [`PatchDownloader`], CDN-first downloads with a single
//!   fallback to the master URL when the CDN refuses the connection
//! - `transport`: shared HTTP client
//! - `config`: [`PatchConfig`], master address and optional timeouts
//! - `error`: error types per operation
//!
//! # Example
//!
//! ```no_run
//! use poe_patch::{PatchConfig, PatchDownloader, PatchSession};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PatchConfig::default();
//!     let mut session = PatchSession::connect(&config).await?;
//!     println!("Patch version {}", session.version());
//!
//!     let downloader = PatchDownloader::from_session(&session, &config)?;
//!     downloader
//!         .fetch_to_file("Data/Mods.dat64", Some(Path::new("content")), None)
//!         .await?;
//!
//!     // The master connection stays open until released
//!     session.release()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod download;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::PatchConfig;
pub use download::{Destination, PatchDownloader};
pub use error::{
    ConfigError, DownloadError, Error, HandshakeError, ReleaseError, Result, UsageError,
};
pub use protocol::{HandshakeResponse, PatchUrls};
pub use session::PatchSession;
pub use transport::HttpClient;
