//! Speech datasets - fetch, verify, unpack and normalize speech/audio corpora
//!
//! This library exports the pipeline stages for testing and reuse.

/// Decoding, resampling and WAV normalization
pub mod audio;
/// Streaming MD5 verification
pub mod checksum;
/// Configuration management
pub mod config;
/// HTTP download with retry
pub mod download;
/// Error types
pub mod error;
/// Archive extraction with completion markers
pub mod extract;
/// Stage orchestration
pub mod pipeline;
/// Built-in dataset table
pub mod sources;
/// Console and file logging
pub mod telemetry;

pub use error::{DatasetError, Result};
pub use pipeline::{Pipeline, RunSummary};
