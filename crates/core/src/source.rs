//! Raw byte retrieval for the three loaders
//!
//! A source is a local path, a remote URL or an in-memory buffer. Every read
//! runs against the configured timeout: the read happens on a worker thread and
//! the caller stops waiting when the deadline passes. An abandoned read may
//! still finish in the background, but its bytes are dropped unseen.

use crate::error::{PipelineError, PipelineResult};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Where a loader gets its bytes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// File on the local filesystem
    Path(PathBuf),
    /// HTTP(S) URL; downloaded into the session's download directory first
    Url(String),
    /// Bytes already in memory (tests, embedding applications)
    Bytes(Vec<u8>),
}

impl DataSource {
    /// Build a source from a command-line style argument: anything starting
    /// with `http://` or `https://` is a URL, everything else a path
    pub fn parse(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            DataSource::Url(arg.to_string())
        } else {
            DataSource::Path(PathBuf::from(arg))
        }
    }

    /// Description used in error messages and logs
    pub fn origin(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Path(path) => write!(f, "{}", path.display()),
            DataSource::Url(url) => f.write_str(url),
            DataSource::Bytes(bytes) => write!(f, "in-memory ({} bytes)", bytes.len()),
        }
    }
}

impl From<&Path> for DataSource {
    fn from(path: &Path) -> Self {
        DataSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for DataSource {
    fn from(path: PathBuf) -> Self {
        DataSource::Path(path)
    }
}

impl From<Vec<u8>> for DataSource {
    fn from(bytes: Vec<u8>) -> Self {
        DataSource::Bytes(bytes)
    }
}

/// Settings that bound a single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Maximum time to wait for the bytes
    pub timeout: Duration,
    /// Directory remote downloads are written to before parsing
    pub download_dir: PathBuf,
}

impl FetchOptions {
    /// Options with the given timeout and the system temp directory
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            download_dir: std::env::temp_dir(),
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::with_timeout(crate::config::DEFAULT_FETCH_TIMEOUT)
    }
}

/// Read the full contents of a source
///
/// # Errors
/// Returns `DataUnavailable` if the source cannot be read, the read exceeds
/// `options.timeout`, or the source is empty.
pub fn fetch_bytes(source: &DataSource, options: &FetchOptions) -> PipelineResult<Vec<u8>> {
    let origin = source.origin();
    let bytes = match source {
        DataSource::Bytes(bytes) => bytes.clone(),
        DataSource::Path(path) => read_file_with_timeout(path, options.timeout)?,
        DataSource::Url(url) => {
            let local = download(url, options)?;
            read_file_with_timeout(&local, options.timeout)?
        }
    };

    if bytes.is_empty() {
        return Err(PipelineError::unavailable(origin, "source is empty"));
    }

    debug!(source = %origin, bytes = bytes.len(), "Fetched source");
    Ok(bytes)
}

fn read_file_with_timeout(path: &Path, timeout: Duration) -> PipelineResult<Vec<u8>> {
    let origin = path.display().to_string();
    let (tx, rx) = mpsc::channel();
    let owned = path.to_path_buf();

    thread::Builder::new()
        .name("source-read".to_string())
        .spawn(move || {
            // The receiver is gone if the caller already timed out
            let _ = tx.send(fs::read(owned));
        })
        .map_err(|e| PipelineError::unavailable(origin.clone(), format!("cannot spawn reader: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(PipelineError::unavailable(origin, e)),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(PipelineError::unavailable(
            origin,
            format!("read timed out after {:?}", timeout),
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(PipelineError::unavailable(
            origin,
            "reader thread exited without a result",
        )),
    }
}

/// File name a URL is persisted under: the last path segment without query,
/// or a fixed fallback when the URL ends in a slash
fn download_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .map_or_else(|| "download.bin".to_string(), str::to_string)
}

#[cfg(feature = "remote")]
fn download(url: &str, options: &FetchOptions) -> PipelineResult<PathBuf> {
    let client = reqwest::blocking::Client::builder()
        .timeout(options.timeout)
        .build()
        .map_err(|e| PipelineError::unavailable(url, format!("cannot build HTTP client: {e}")))?;

    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|e| PipelineError::unavailable(url, e))?;
    let body = response
        .bytes()
        .map_err(|e| PipelineError::unavailable(url, e))?;

    fs::create_dir_all(&options.download_dir).map_err(|e| {
        PipelineError::unavailable(
            url,
            format!("cannot create {}: {e}", options.download_dir.display()),
        )
    })?;
    let local = options.download_dir.join(download_file_name(url));
    fs::write(&local, &body).map_err(|e| {
        PipelineError::unavailable(url, format!("cannot persist to {}: {e}", local.display()))
    })?;

    debug!(url, path = %local.display(), bytes = body.len(), "Downloaded remote source");
    Ok(local)
}

#[cfg(not(feature = "remote"))]
fn download(url: &str, _options: &FetchOptions) -> PipelineResult<PathBuf> {
    Err(PipelineError::unavailable(
        url,
        format!(
            "remote sources require the 'remote' feature (would save as {})",
            download_file_name(url)
        ),
    ))
}
