//! Content downloads with CDN-first, master-fallback policy

use crate::config::PatchConfig;
use crate::error::{DownloadError, Error, UsageError};
use crate::protocol::PatchUrls;
use crate::session::PatchSession;
use crate::transport::HttpClient;
use bytes::Bytes;
use reqwest::StatusCode;
use std::error::Error as _;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, warn};

/// Where [`PatchDownloader::fetch_into`] writes a downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Root directory; the content path is recreated beneath it
    Directory(PathBuf),
    /// Exact output file; the content path's layout is ignored
    File(PathBuf),
}

impl Destination {
    /// Build from the two optional arguments, exactly one of which must be set.
    ///
    /// Empty paths count as unset.
    ///
    /// # Errors
    ///
    /// `UsageError::MissingDestination` if neither is set,
    /// `UsageError::ConflictingDestination` if both are.
    pub fn from_options(
        directory: Option<&Path>,
        file: Option<&Path>,
    ) -> Result<Self, UsageError> {
        let directory = directory.filter(|p| !p.as_os_str().is_empty());
        let file = file.filter(|p| !p.as_os_str().is_empty());

        match (directory, file) {
            (Some(directory), None) => Ok(Self::Directory(directory.to_path_buf())),
            (None, Some(file)) => Ok(Self::File(file.to_path_buf())),
            (Some(_), Some(_)) => Err(UsageError::ConflictingDestination),
            (None, None) => Err(UsageError::MissingDestination),
        }
    }

    /// Final write path for `file_path`.
    ///
    /// For a directory the forward-slash separated segments of `file_path`
    /// become subdirectories. Absolute paths and `..` segments are rejected
    /// so nothing is written outside the directory.
    pub fn resolve(&self, file_path: &str) -> Result<PathBuf, UsageError> {
        match self {
            Self::File(file) => {
                if file.file_name().is_none() {
                    return Err(UsageError::InvalidDestinationFile(file.clone()));
                }
                Ok(file.clone())
            }
            Self::Directory(directory) => {
                let invalid = |reason| UsageError::InvalidContentPath {
                    path: file_path.to_string(),
                    reason,
                };

                if file_path.starts_with('/') || file_path.starts_with('\\') {
                    return Err(invalid("absolute path"));
                }

                let mut target = directory.clone();
                let mut segments = 0usize;
                for segment in file_path.split('/') {
                    match segment {
                        "" | "." => {}
                        ".." => return Err(invalid("parent directory segment")),
                        _ if is_plain_name(segment) => {
                            target.push(segment);
                            segments += 1;
                        }
                        _ => return Err(invalid("unsupported path segment")),
                    }
                }

                if segments == 0 {
                    return Err(invalid("no file name"));
                }
                Ok(target)
            }
        }
    }
}

/// A single normal path component with no platform separators or prefixes
fn is_plain_name(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !segment.contains('\\')
}

/// Downloads content files from the discovered base URLs.
///
/// Base URLs are tried in order. Only a refused connection moves on to the
/// next one; any other failure ends the download.
///
/// # Example
///
/// ```no_run
/// use poe_patch::{PatchConfig, PatchDownloader, PatchSession};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PatchConfig::default();
/// let mut session = PatchSession::connect(&config).await?;
/// let downloader = PatchDownloader::from_session(&session, &config)?;
///
/// let mods = downloader.fetch("Data/Mods.dat64").await?;
/// println!("Downloaded {} bytes", mods.len());
///
/// downloader
///     .fetch_to_file("Data/Stats.dat64", Some(Path::new("out")), None)
///     .await?;
///
/// session.release()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PatchDownloader {
    base_urls: Vec<String>,
    client: HttpClient,
}

impl PatchDownloader {
    /// Downloader for the URLs of an established session
    pub fn from_session(session: &PatchSession, config: &PatchConfig) -> Result<Self, Error> {
        Ok(Self::new(session.urls(), HttpClient::new(config)?))
    }

    /// Downloader trying the CDN URL first and the master URL second
    pub fn new(urls: &PatchUrls, client: HttpClient) -> Self {
        Self::with_base_urls(urls.candidates(), client)
    }

    /// Downloader over an arbitrary ordered list of base URLs
    pub fn with_base_urls(
        base_urls: impl IntoIterator<Item = impl Into<String>>,
        client: HttpClient,
    ) -> Self {
        Self {
            base_urls: base_urls.into_iter().map(Into::into).collect(),
            client,
        }
    }

    /// Base URLs in the order they are tried
    pub fn base_urls(&self) -> &[String] {
        &self.base_urls
    }

    /// Full URLs for `file_path`, in the order they are tried
    pub fn candidate_urls(&self, file_path: &str) -> Vec<String> {
        self.base_urls
            .iter()
            .map(|base| format!("{base}{file_path}"))
            .collect()
    }

    /// Download `file_path` and return its bytes.
    ///
    /// `file_path` is relative to the content root, e.g. `Data/Mods.dat64`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Status` for any status other than 200,
    /// `DownloadError::ConnectionRefused` if the last base URL refuses the
    /// connection, and `DownloadError::Transport` for other transport
    /// failures.
    #[instrument(skip(self))]
    pub async fn fetch(&self, file_path: &str) -> Result<Bytes, DownloadError> {
        let candidates = self.candidate_urls(file_path);
        let count = candidates.len();
        let mut last_error = None;

        for (index, url) in candidates.into_iter().enumerate() {
            debug!("Attempting download {} of {}: {url}", index + 1, count);

            match self.get(&url).await {
                Ok(body) => {
                    if index > 0 {
                        info!("Downloaded from fallback URL {url}");
                    }
                    return Ok(body);
                }
                Err(e @ DownloadError::ConnectionRefused { .. }) if index + 1 < count => {
                    warn!("Connection refused for {url}, trying next base URL");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(DownloadError::NoCandidates))
    }

    /// Download `file_path` and write it to disk.
    ///
    /// Exactly one of `destination_directory` and `destination_file` must be
    /// set; this is checked before any network I/O. Returns the path
    /// written.
    ///
    /// # Errors
    ///
    /// Returns `Error::Usage` for invalid destination arguments,
    /// `Error::Download` if the fetch fails and `Error::Io` if the file
    /// cannot be written. A failure never leaves a partial file at the
    /// destination.
    pub async fn fetch_to_file(
        &self,
        file_path: &str,
        destination_directory: Option<&Path>,
        destination_file: Option<&Path>,
    ) -> Result<PathBuf, Error> {
        let destination = Destination::from_options(destination_directory, destination_file)?;
        self.fetch_into(file_path, &destination).await
    }

    /// Download `file_path` and write it to `destination`
    #[instrument(skip(self))]
    pub async fn fetch_into(
        &self,
        file_path: &str,
        destination: &Destination,
    ) -> Result<PathBuf, Error> {
        let write_path = destination.resolve(file_path)?;
        let body = self.fetch(file_path).await?;

        write_whole_file(&write_path, &body).await?;
        debug!("Wrote {} bytes to {}", body.len(), write_path.display());
        Ok(write_path)
    }

    async fn get(&self, url: &str) -> Result<Bytes, DownloadError> {
        let response = self
            .client
            .inner()
            .get(url)
            .send()
            .await
            .map_err(|source| classify(url, source))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status,
            });
        }

        response
            .bytes()
            .await
            .map_err(|source| DownloadError::Transport {
                url: url.to_string(),
                source,
            })
    }
}

fn classify(url: &str, source: reqwest::Error) -> DownloadError {
    let url = url.to_string();
    if is_connection_refused(&source) {
        DownloadError::ConnectionRefused { url, source }
    } else {
        DownloadError::Transport { url, source }
    }
}

/// Whether the error chain bottoms out in a refused TCP connection
fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut cause = err.source();
    while let Some(current) = cause {
        if let Some(io) = current.downcast_ref::<std::io::Error>()
            && io.kind() == ErrorKind::ConnectionRefused
        {
            return true;
        }
        cause = current.source();
    }
    false
}

/// Write `data` to a sibling temporary file, then rename it into place
async fn write_whole_file(path: &Path, data: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }

    let temp_path = temp_path_for(path);
    if let Err(e) = tokio::fs::write(&temp_path, data).await {
        remove_temp(&temp_path).await;
        return Err(Error::io(temp_path, e));
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        remove_temp(&temp_path).await;
        return Err(Error::io(path, e));
    }
    Ok(())
}

/// Per-process sequence so concurrent writes never share a temp file
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{sequence}.part", std::process::id()))
}

async fn remove_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!("Failed to remove temporary file {}: {e}", path.display());
    }
}
