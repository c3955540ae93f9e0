//! Handshake session with the master patch server

use crate::config::PatchConfig;
use crate::error::{Error, HandshakeError, ReleaseError};
use crate::protocol::{CLIENT_PROTOCOL, HandshakeResponse, MAX_RESPONSE_LEN, PatchUrls};
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument, trace};

/// A completed handshake with the master patch server.
///
/// The session holds the TCP connection the handshake ran on for as long as
/// it lives. Nothing is sent or received on it after the handshake. Call
/// [`release`](Self::release) when done to shut it down in an orderly way;
/// dropping an unreleased session only closes the socket.
///
/// # Example
///
/// ```no_run
/// use poe_patch::{PatchConfig, PatchSession};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = PatchSession::connect(&PatchConfig::default()).await?;
/// println!("Game version {}", session.version());
/// session.release()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PatchSession {
    master_host: String,
    master_port: u16,
    connect_timeout: Option<Duration>,
    urls: PatchUrls,
    connection: Option<TcpStream>,
}

impl PatchSession {
    /// Connect to the configured master server and run the handshake.
    ///
    /// No session exists unless the handshake fully succeeds. On failure the
    /// connection, if it was opened, is closed before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The connection to the master server fails or times out
    /// - Sending the request or receiving the response fails
    /// - The response is truncated or carries invalid UTF-16 text
    #[instrument(skip(config), fields(master = %config.master_address()))]
    pub async fn connect(config: &PatchConfig) -> Result<Self, HandshakeError> {
        let (connection, response) =
            handshake(&config.master_host, config.master_port, config.connect_timeout).await?;

        debug!(
            patch_url = %response.urls.patch_url,
            patch_cdn_url = %response.urls.patch_cdn_url,
            "Handshake complete"
        );

        Ok(Self {
            master_host: config.master_host.clone(),
            master_port: config.master_port,
            connect_timeout: config.connect_timeout,
            urls: response.urls,
            connection: Some(connection),
        })
    }

    /// Repeat the handshake against the same master server.
    ///
    /// On success the new URLs and connection replace the current ones and
    /// the superseded connection is released. On handshake failure the
    /// session is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `Error::Handshake` if the new handshake fails, or
    /// `Error::Release` if the superseded connection could not be released.
    /// In the latter case the new URLs are already in place.
    #[instrument(skip(self), fields(master = %self.master_address()))]
    pub async fn rediscover(&mut self) -> Result<(), Error> {
        let (connection, response) =
            handshake(&self.master_host, self.master_port, self.connect_timeout).await?;

        if response.urls != self.urls {
            debug!(
                old = %self.urls.patch_url,
                new = %response.urls.patch_url,
                "Patch URLs changed"
            );
        }

        self.urls = response.urls;
        if let Some(previous) = self.connection.replace(connection) {
            shutdown_and_close(previous)?;
        }
        Ok(())
    }

    /// Shut down both directions of the master connection and close it.
    ///
    /// Calling this on an already released session does nothing. A shutdown
    /// failure caused by the server having already closed the connection is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns `ReleaseError::Shutdown` for any other shutdown failure and
    /// `ReleaseError::Close` if the socket cannot be detached for closing.
    pub fn release(&mut self) -> Result<(), ReleaseError> {
        match self.connection.take() {
            Some(connection) => {
                debug!(master = %self.master_address(), "Releasing master connection");
                shutdown_and_close(connection)
            }
            None => Ok(()),
        }
    }

    /// Whether [`release`](Self::release) has already run
    pub fn is_released(&self) -> bool {
        self.connection.is_none()
    }

    /// Both discovered base URLs
    pub fn urls(&self) -> &PatchUrls {
        &self.urls
    }

    /// Master download base URL
    pub fn patch_url(&self) -> &str {
        &self.urls.patch_url
    }

    /// Load-balanced CDN download base URL
    pub fn patch_cdn_url(&self) -> &str {
        &self.urls.patch_cdn_url
    }

    /// Game version, e.g. `3.23.0.1`.
    ///
    /// The first three components match the public version; the last one
    /// numbers the patches and hotfixes within it.
    pub fn version(&self) -> &str {
        self.urls.version()
    }

    /// Master server host
    pub fn master_host(&self) -> &str {
        &self.master_host
    }

    /// Master server port
    pub fn master_port(&self) -> u16 {
        self.master_port
    }

    /// `host:port` of the master server
    pub fn master_address(&self) -> String {
        format!("{}:{}", self.master_host, self.master_port)
    }

    /// Local endpoint of the held connection, `None` once released
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().and_then(|c| c.local_addr().ok())
    }

    /// Remote endpoint of the held connection, `None` once released
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().and_then(|c| c.peer_addr().ok())
    }
}

impl Drop for PatchSession {
    fn drop(&mut self) {
        if self.connection.is_some() {
            debug!(
                master = %self.master_address(),
                "Patch session dropped without release, closing connection"
            );
        }
    }
}

async fn handshake(
    host: &str,
    port: u16,
    limit: Option<Duration>,
) -> Result<(TcpStream, HandshakeResponse), HandshakeError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, exchange(host, port))
            .await
            .map_err(|_| HandshakeError::Timeout {
                host: host.to_string(),
                port,
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })?,
        None => exchange(host, port).await,
    }
}

/// Send the protocol identifier and parse the single reply read.
async fn exchange(host: &str, port: u16) -> Result<(TcpStream, HandshakeResponse), HandshakeError> {
    trace!("Connecting to master server at {host}:{port}");

    let mut stream =
        TcpStream::connect((host, port))
            .await
            .map_err(|source| HandshakeError::ConnectionFailed {
                host: host.to_string(),
                port,
                source,
            })?;

    stream
        .write_all(&CLIENT_PROTOCOL)
        .await
        .map_err(HandshakeError::SendFailed)?;

    let mut buffer = [0u8; MAX_RESPONSE_LEN];
    let len = stream
        .read(&mut buffer)
        .await
        .map_err(HandshakeError::ReceiveFailed)?;
    trace!("Received {len} byte handshake response");

    let response = HandshakeResponse::parse(&buffer[..len])?;
    Ok((stream, response))
}

fn shutdown_and_close(connection: TcpStream) -> Result<(), ReleaseError> {
    let connection = connection.into_std().map_err(ReleaseError::Close)?;

    match connection.shutdown(Shutdown::Both) {
        Ok(()) => {}
        Err(e) if is_peer_closed(&e) => {
            trace!("Master already closed the connection: {e}");
        }
        Err(e) => return Err(ReleaseError::Shutdown(e)),
    }

    drop(connection);
    Ok(())
}

/// Shutdown errors meaning the other side is already gone
fn is_peer_closed(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotConnected | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
    )
}
