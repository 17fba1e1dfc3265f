use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while preparing a dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    /// URL could not be parsed or has no file name segment
    #[error("invalid source URL {url}: {reason}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Server answered with a non-success status
    #[error("download failed with status {status}: {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Transport-level failure (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body stopped mid-transfer
    #[error("transfer of {url} interrupted: {source}")]
    Transfer {
        /// Requested URL
        url: String,
        /// Underlying read error
        source: std::io::Error,
    },

    /// All download attempts failed
    #[error("failed to download {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Requested URL
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: Box<DatasetError>,
    },

    /// Downloaded file does not match its expected MD5
    #[error("MD5 checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// File that failed verification (already deleted)
        path: PathBuf,
        /// Expected digest
        expected: String,
        /// Computed digest
        actual: String,
    },

    /// Archive could not be unpacked
    #[error("failed to extract {archive}: {reason}")]
    Extraction {
        /// Archive path
        archive: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Audio decode failure
    #[error("failed to decode {path}: {reason}")]
    Decode {
        /// Input file
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// WAV encode failure
    #[error("failed to write WAV {path}: {source}")]
    Encode {
        /// Output file
        path: PathBuf,
        /// Underlying error
        source: hound::Error,
    },

    /// Filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

impl DatasetError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether another download attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Transfer { .. } => true,
            // 4xx other than timeout/throttling will not change on retry
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// Result alias for dataset operations
pub type Result<T> = std::result::Result<T, DatasetError>;
