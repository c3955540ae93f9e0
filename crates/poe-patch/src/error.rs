//! Error types for the patch client.
//!
//! Each operation has its own error type so callers can tell a failed
//! handshake from a failed download or a bad argument. [`Error`] wraps all
//! of them for callers that only want a single type.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while connecting to the master server and running the
/// discovery handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The TCP connection to the master server could not be opened
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        /// Master server host
        host: String,
        /// Master server port
        port: u16,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Connecting or reading the response exceeded the configured timeout
    #[error("Handshake with {host}:{port} timed out after {timeout_ms}ms")]
    Timeout {
        /// Master server host
        host: String,
        /// Master server port
        port: u16,
        /// The timeout in milliseconds
        timeout_ms: u64,
    },

    /// Sending the protocol identifier failed
    #[error("Failed to send handshake request: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving the handshake response failed
    #[error("Failed to receive handshake response: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The response ended before a declared field was complete
    #[error("Truncated handshake response: {field} needs {needed} bytes, {available} available")]
    Truncated {
        /// Name of the field being read
        field: &'static str,
        /// Bytes the field requires
        needed: usize,
        /// Bytes left in the response
        available: usize,
    },

    /// A URL payload was not valid UTF-16
    #[error("Invalid UTF-16 text in {field}")]
    InvalidText {
        /// Name of the field being decoded
        field: &'static str,
    },

    /// A URL is too long to be encoded with a one-byte length prefix
    #[error("{field} is {units} UTF-16 code units, maximum is 255")]
    FieldTooLong {
        /// Name of the field being encoded
        field: &'static str,
        /// Length in UTF-16 code units
        units: usize,
    },
}

/// Errors raised while downloading a content file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The server answered with a status other than 200
    #[error("HTTP response code {status} for {url}")]
    Status {
        /// Requested URL
        url: String,
        /// Status returned by the server
        status: StatusCode,
    },

    /// The connection was refused and no fallback candidate remained
    #[error("Connection refused for {url}: {source}")]
    ConnectionRefused {
        /// Requested URL
        url: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Any other transport failure (DNS, TLS, timeout, broken body)
    #[error("Request failed for {url}: {source}")]
    Transport {
        /// Requested URL
        url: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// The downloader was built without any base URL
    #[error("No download base URL configured")]
    NoCandidates,
}

impl DownloadError {
    /// HTTP status carried by this error, if the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status(),
            Self::ConnectionRefused { .. } | Self::NoCandidates => None,
        }
    }

    /// URL of the request that failed
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Status { url, .. }
            | Self::ConnectionRefused { url, .. }
            | Self::Transport { url, .. } => Some(url),
            Self::NoCandidates => None,
        }
    }
}

/// Invalid arguments, detected before any I/O happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    /// Neither a destination directory nor a destination file was given
    #[error("Either a destination directory or a destination file must be set")]
    MissingDestination,

    /// Both a destination directory and a destination file were given
    #[error("Destination directory and destination file are mutually exclusive")]
    ConflictingDestination,

    /// The content path cannot be placed under a destination directory
    #[error("Invalid content path '{path}': {reason}")]
    InvalidContentPath {
        /// The rejected content path
        path: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// The destination file path does not name a file
    #[error("Destination file '{}' does not name a file", .0.display())]
    InvalidDestinationFile(PathBuf),
}

/// Errors raised while tearing down the handshake connection.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Orderly shutdown failed for a reason other than the peer having
    /// already closed the connection
    #[error("Failed to shut down master connection: {0}")]
    Shutdown(#[source] std::io::Error),

    /// The socket could not be detached from the runtime for closing
    #[error("Failed to close master connection: {0}")]
    Close(#[source] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held an unparsable value
    #[error("Invalid value '{value}' for {name}")]
    InvalidValue {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },

    /// A required value is empty or zero
    #[error("Missing required configuration: {0}")]
    MissingRequired(&'static str),
}

/// Umbrella error for callers that do not need the per-operation types.
#[derive(Debug, Error)]
pub enum Error {
    /// Handshake failure
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Download failure
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Invalid arguments
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Connection teardown failure
    #[error(transparent)]
    Release(#[from] ReleaseError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// HTTP client construction failure
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// Filesystem failure while writing a downloaded file
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being created or written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using the umbrella [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
