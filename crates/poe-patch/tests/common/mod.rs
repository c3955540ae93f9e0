//! Shared helpers for integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use poe_patch::{HandshakeResponse, HttpClient, PatchConfig, PatchUrls};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// How the mock master treats a connection after answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterReply {
    /// Keep reading until the client closes, then report it
    HoldOpen,
    /// Close the connection right after replying
    Close,
    /// Never reply; keep the connection open for a while
    Silent,
    /// Reply, then abort the connection with a reset
    Reset,
}

/// Mock master patch server on a random local port.
pub struct MockMaster {
    pub addr: SocketAddr,
    /// Raw request bytes received per connection
    pub requests: mpsc::UnboundedReceiver<Vec<u8>>,
    /// One message per connection the client closed
    pub closed: mpsc::UnboundedReceiver<()>,
}

impl MockMaster {
    /// Serve one connection per reply, in order
    pub async fn start(replies: Vec<Vec<u8>>, after: AfterReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock master");
        let addr = listener.local_addr().expect("Failed to get mock address");
        let (request_tx, requests) = mpsc::unbounded_channel();
        let (closed_tx, closed) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for reply in replies {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };

                let mut request = [0u8; 2];
                if stream.read_exact(&mut request).await.is_err() {
                    continue;
                }
                let _ = request_tx.send(request.to_vec());

                match after {
                    AfterReply::Silent => {
                        tokio::spawn(async move {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            drop(stream);
                        });
                    }
                    AfterReply::Close => {
                        let _ = stream.write_all(&reply).await;
                        let _ = stream.shutdown().await;
                    }
                    AfterReply::Reset => {
                        let _ = stream.write_all(&reply).await;
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        // Zero linger turns the close into an RST
                        #[allow(deprecated)]
                        let _ = stream.set_linger(Some(Duration::ZERO));
                        drop(stream);
                        let _ = closed_tx.send(());
                    }
                    AfterReply::HoldOpen => {
                        let _ = stream.write_all(&reply).await;
                        let closed_tx = closed_tx.clone();
                        tokio::spawn(async move {
                            let mut buf = [0u8; 64];
                            loop {
                                match stream.read(&mut buf).await {
                                    Ok(0) | Err(_) => break,
                                    Ok(_) => {}
                                }
                            }
                            let _ = closed_tx.send(());
                        });
                    }
                }
            }
        });

        Self {
            addr,
            requests,
            closed,
        }
    }

    /// Configuration pointing at this mock
    pub fn config(&self) -> PatchConfig {
        PatchConfig::with_master("127.0.0.1", self.addr.port())
    }
}

/// Encoded handshake reply padded to a full 1024-byte receive
pub fn padded_reply(patch_url: &str, patch_cdn_url: &str) -> Vec<u8> {
    let mut reply = HandshakeResponse::new(PatchUrls::new(patch_url, patch_cdn_url))
        .encode()
        .expect("Failed to encode handshake reply")
        .to_vec();
    reply.resize(1024, 0);
    reply
}

/// Port nothing listens on, so connecting is refused
pub fn refused_port() -> u16 {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind probe listener");
    listener
        .local_addr()
        .expect("Failed to get probe address")
        .port()
}

/// Base URL whose connections are refused
pub fn refused_base_url() -> String {
    format!("http://127.0.0.1:{}/3.23.0.1/", refused_port())
}

/// HTTP client that never goes through a proxy
pub fn direct_client() -> HttpClient {
    HttpClient::with_client(
        reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("Failed to build HTTP client"),
    )
}
