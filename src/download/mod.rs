//! Archive download and integrity verification
//!
//! A download streams into `<name>.part` beside the destination and is renamed
//! into place only once the whole body has been written, so an interrupted
//! attempt never leaves a file at the destination path.

/// Retry policy and loop
pub mod retry;
/// HTTP transport seam
pub mod transport;

pub use retry::{run_with_retry, RetryPolicy};
pub use transport::{ReqwestTransport, ResponseBody, Transport};

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checksum::{verify_md5, Verification};
use crate::config::DownloadConfig;
use crate::error::{DatasetError, Result};
use crate::sources::DownloadTask;

const BUFFER_SIZE: usize = 64 * 1024;

/// What [`Downloader::fetch_verified`] had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A verified file was already on disk
    AlreadyPresent,
    /// Downloaded and verified on the first try
    Downloaded,
    /// A checksum mismatch forced one re-download, which verified
    Redownloaded,
}

/// Downloads files over a [`Transport`] with bounded retry
#[derive(Debug)]
pub struct Downloader<T = ReqwestTransport> {
    transport: T,
    policy: RetryPolicy,
}

impl Downloader<ReqwestTransport> {
    /// Build a downloader over a blocking HTTP client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self::new(transport, RetryPolicy::from(config)))
    }
}

impl<T: Transport> Downloader<T> {
    /// Create a downloader from parts
    pub const fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Download `url` to `destination` unless it already exists
    ///
    /// Returns `true` if a download happened, `false` if the file was present.
    ///
    /// # Errors
    /// Returns the first non-retryable failure or
    /// [`DatasetError::RetriesExhausted`]
    pub fn download_file(&self, url: &str, destination: &Path) -> Result<bool> {
        if destination.exists() {
            tracing::info!(
                path = %destination.display(),
                "file already exists, skipping download"
            );
            return Ok(false);
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
        }

        tracing::info!(url, path = %destination.display(), "starting download");

        let part_path = part_path(destination);
        let bytes = run_with_retry(&self.policy, url, |_| {
            let result = self.download_once(url, &part_path, destination);
            if result.is_err() {
                remove_if_exists(&part_path)?;
            }
            result
        })?;

        tracing::info!(
            path = %destination.display(),
            size = bytes,
            "download complete"
        );

        Ok(true)
    }

    fn download_once(&self, url: &str, part_path: &Path, destination: &Path) -> Result<u64> {
        let body = self.transport.get(url)?;
        let written = stream_to_file(url, body, part_path)?;

        fs::rename(part_path, destination).map_err(|e| DatasetError::io(destination, e))?;

        Ok(written)
    }

    /// Make sure `task.destination` exists and matches its expected MD5
    ///
    /// An existing file is verified before anything is fetched. A mismatch
    /// deletes the file and triggers exactly one re-download; a second mismatch
    /// deletes that file too and fails.
    ///
    /// # Errors
    /// Returns [`DatasetError::ChecksumMismatch`] after the second mismatch, or
    /// any download failure
    pub fn fetch_verified(&self, task: &DownloadTask) -> Result<FetchOutcome> {
        let url = task.source.url.as_str();
        let path = task.destination.as_path();

        let Some(expected) = task.source.md5.as_deref() else {
            let downloaded = self.download_file(url, path)?;
            return Ok(if downloaded {
                FetchOutcome::Downloaded
            } else {
                FetchOutcome::AlreadyPresent
            });
        };

        let mut downloaded = false;
        let mut mismatched = false;

        loop {
            if path.exists() {
                tracing::info!(path = %path.display(), "file exists, verifying MD5 checksum");
            }
            downloaded |= self.download_file(url, path)?;

            match verify_md5(path, expected)? {
                Verification::Match => {
                    tracing::info!(path = %path.display(), "passed MD5 verification");
                    return Ok(match (downloaded, mismatched) {
                        (_, true) => FetchOutcome::Redownloaded,
                        (true, false) => FetchOutcome::Downloaded,
                        (false, false) => FetchOutcome::AlreadyPresent,
                    });
                }
                Verification::Mismatch(actual) => {
                    remove_if_exists(path)?;

                    if mismatched {
                        tracing::error!(
                            path = %path.display(),
                            expected,
                            actual = %actual,
                            "failed MD5 verification again, file is corrupt"
                        );
                        return Err(DatasetError::ChecksumMismatch {
                            path: path.to_path_buf(),
                            expected: expected.to_owned(),
                            actual,
                        });
                    }

                    tracing::warn!(
                        path = %path.display(),
                        expected,
                        actual = %actual,
                        "failed MD5 check, re-downloading"
                    );
                    mismatched = true;
                }
            }
        }
    }
}

/// Temporary sibling used while a download is in flight
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

fn stream_to_file(url: &str, body: ResponseBody, part_path: &Path) -> Result<u64> {
    let ResponseBody {
        content_length,
        mut reader,
    } = body;

    let mut file = File::create(part_path).map_err(|e| DatasetError::io(part_path, e))?;
    let mut buffer = vec![0_u8; BUFFER_SIZE];
    let mut written: u64 = 0;
    let mut next_report: u64 = 10;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(DatasetError::Transfer {
                    url: url.to_owned(),
                    source: e,
                })
            }
        };

        file.write_all(&buffer[..read])
            .map_err(|e| DatasetError::io(part_path, e))?;
        written += read as u64;

        if let Some(total) = content_length.filter(|&t| t > 0) {
            let percent = written.saturating_mul(100) / total;
            if percent >= next_report {
                tracing::info!(url, percent, bytes = written, total, "download progress");
                next_report = (percent / 10 + 1) * 10;
            }
        }
    }

    if let Some(total) = content_length {
        if written < total {
            return Err(DatasetError::Transfer {
                url: url.to_owned(),
                source: std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("body ended after {written} of {total} bytes"),
                ),
            });
        }
    }

    file.sync_all().map_err(|e| DatasetError::io(part_path, e))?;

    Ok(written)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DatasetError::io(path, e)),
    }
}
