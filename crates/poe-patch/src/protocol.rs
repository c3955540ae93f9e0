//! Master server handshake wire format.
//!
//! The client sends two bytes, `0x01 0x04` (patch protocol 4). The server
//! answers with a flat record:
//!
//! ```text
//! +--------+----------+------+-----------------+--------+------+-----------------+
//! | status | reserved | len1 | patch_url       | blank  | len2 | patch_cdn_url   |
//! | 1 byte | 33 bytes | 1 B  | len1 * 2 bytes  | 1 byte | 1 B  | len2 * 2 bytes  |
//! +--------+----------+------+-----------------+--------+------+-----------------+
//! ```
//!
//! Lengths count UTF-16 code units and the text is UTF-16LE. The status and
//! reserved bytes are carried but never validated.

use crate::error::HandshakeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Request sent to the master server: patch protocol version 4
pub const CLIENT_PROTOCOL: [u8; 2] = [0x01, 0x04];

/// Maximum number of bytes read from the master server in one receive
pub const MAX_RESPONSE_LEN: usize = 1024;

/// Length of the reserved block following the status byte
pub const RESERVED_LEN: usize = 33;

/// Smallest possible response: both URLs empty
pub const MIN_RESPONSE_LEN: usize = 1 + RESERVED_LEN + 1 + 1 + 1;

/// Download base URLs discovered through the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchUrls {
    /// The master's own download base, e.g. `http://patch.example:8080/3.23.0.1/`
    pub patch_url: String,
    /// Load-balanced CDN download base
    pub patch_cdn_url: String,
}

impl PatchUrls {
    /// Create from the two base URLs
    pub fn new(patch_url: impl Into<String>, patch_cdn_url: impl Into<String>) -> Self {
        Self {
            patch_url: patch_url.into(),
            patch_cdn_url: patch_cdn_url.into(),
        }
    }

    /// Game version encoded in the master URL.
    ///
    /// This is the last path segment after stripping one trailing `/`:
    /// `http://host:port/3.23.0.1/` yields `3.23.0.1`.
    pub fn version(&self) -> &str {
        version_from_url(&self.patch_url)
    }

    /// Base URLs in download priority order: CDN first, then master
    pub fn candidates(&self) -> [&str; 2] {
        [&self.patch_cdn_url, &self.patch_url]
    }
}

/// Last path segment of `url` after stripping a single trailing `/`
pub fn version_from_url(url: &str) -> &str {
    let trimmed = url.strip_suffix('/').unwrap_or(url);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Decoded handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Leading status byte, opaque
    pub status: u8,
    /// Reserved block following the status byte, opaque
    pub reserved: [u8; RESERVED_LEN],
    /// Blank byte between the two URLs, opaque
    pub separator: u8,
    /// Discovered base URLs
    pub urls: PatchUrls,
}

impl HandshakeResponse {
    /// Response with zeroed reserved fields
    pub fn new(urls: PatchUrls) -> Self {
        Self {
            status: 0,
            reserved: [0; RESERVED_LEN],
            separator: 0,
            urls,
        }
    }

    /// Parse a response as received from the master server.
    ///
    /// Bytes following the CDN URL are ignored. Any field that would read
    /// past the end of `data` is an error.
    pub fn parse(data: &[u8]) -> Result<Self, HandshakeError> {
        let mut buf = data;

        ensure(&buf, 1, "status")?;
        let status = buf.get_u8();

        ensure(&buf, RESERVED_LEN, "reserved")?;
        let mut reserved = [0u8; RESERVED_LEN];
        buf.copy_to_slice(&mut reserved);

        let patch_url = read_utf16(&mut buf, "patch_url")?;

        ensure(&buf, 1, "separator")?;
        let separator = buf.get_u8();

        let patch_cdn_url = read_utf16(&mut buf, "patch_cdn_url")?;

        Ok(Self {
            status,
            reserved,
            separator,
            urls: PatchUrls {
                patch_url,
                patch_cdn_url,
            },
        })
    }

    /// Encode in the wire layout, as a master server would send it
    pub fn encode(&self) -> Result<Bytes, HandshakeError> {
        let mut out = BytesMut::with_capacity(MIN_RESPONSE_LEN + 128);
        out.put_u8(self.status);
        out.put_slice(&self.reserved);
        write_utf16(&mut out, &self.urls.patch_url, "patch_url")?;
        out.put_u8(self.separator);
        write_utf16(&mut out, &self.urls.patch_cdn_url, "patch_cdn_url")?;
        Ok(out.freeze())
    }
}

fn ensure(buf: &&[u8], needed: usize, field: &'static str) -> Result<(), HandshakeError> {
    if buf.remaining() < needed {
        return Err(HandshakeError::Truncated {
            field,
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

/// Read a one-byte unit count followed by that many UTF-16LE code units
fn read_utf16(buf: &mut &[u8], field: &'static str) -> Result<String, HandshakeError> {
    ensure(buf, 1, field)?;
    let units = usize::from(buf.get_u8());

    ensure(buf, units * 2, field)?;
    let code_units: Vec<u16> = (0..units).map(|_| buf.get_u16_le()).collect();

    String::from_utf16(&code_units).map_err(|_| HandshakeError::InvalidText { field })
}

fn write_utf16(out: &mut BytesMut, text: &str, field: &'static str) -> Result<(), HandshakeError> {
    let code_units: Vec<u16> = text.encode_utf16().collect();
    let len = u8::try_from(code_units.len()).map_err(|_| HandshakeError::FieldTooLong {
        field,
        units: code_units.len(),
    })?;

    out.put_u8(len);
    for unit in code_units {
        out.put_u16_le(unit);
    }
    Ok(())
}
