use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sources::{builtin_datasets, Dataset};

/// Config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "speech-datasets.toml";
/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "SPEECH_DATASETS_CONFIG";

/// Top-level configuration
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Output locations
    pub paths: PathsConfig,
    /// Download retry and timeout behavior
    pub download: DownloadConfig,
    /// Archive extraction behavior
    pub extraction: ExtractionConfig,
    /// Audio normalization behavior
    pub normalize: NormalizeConfig,
    /// Logging behavior
    pub telemetry: TelemetryConfig,
    /// Replaces the built-in source table when present
    pub datasets: Option<Vec<Dataset>>,
}

/// Filesystem layout
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    /// Root under which each dataset gets its own directory
    pub datasets_dir: String,
    /// Append-only log file
    pub log_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            datasets_dir: "datasets".to_owned(),
            log_path: "data_collection.log".to_owned(),
        }
    }
}

/// Download retry policy
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DownloadConfig {
    /// Total attempts per file, including the first
    pub retries: u32,
    /// Fixed delay between attempts
    pub backoff_secs: u64,
    /// Lower bound of the random delay added to `backoff_secs`
    pub jitter_min_secs: u64,
    /// Upper bound of the random delay added to `backoff_secs`
    pub jitter_max_secs: u64,
    /// Timeout for connecting and for each read of the response body
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_secs: 5,
            jitter_min_secs: 1,
            jitter_max_secs: 3,
            timeout_secs: 60,
        }
    }
}

/// Extraction policy
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Stop the whole run on the first failed extraction
    pub abort_on_failure: bool,
}

/// Audio normalization settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Run normalization after extraction
    pub enabled: bool,
    /// Target sample rate in Hz
    pub sample_rate: u32,
    /// File extensions (lowercase, no dot) treated as audio
    pub extensions: Vec<String>,
    /// Remove compressed originals once their WAV counterpart is verified, and
    /// allow off-format WAVs to be rewritten in place
    pub delete_originals: bool,
    /// Write WAVs under this directory, mirroring the dataset layout
    pub output_dir: Option<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 16000,
            extensions: ["flac", "mp3", "ogg", "wav"]
                .iter()
                .map(|&s| s.to_owned())
                .collect(),
            delete_originals: false,
            output_dir: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl Config {
    /// Load config from `$SPEECH_DATASETS_CONFIG` or `./speech-datasets.toml`
    ///
    /// A missing `./speech-datasets.toml` yields the built-in defaults.
    ///
    /// # Errors
    /// Returns error if `$SPEECH_DATASETS_CONFIG` names a missing file, or the
    /// file exists but cannot be read or parsed
    pub fn load() -> Result<Self> {
        Self::load_from(std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
    }

    /// Load from an explicitly named file, or the default location when `None`
    ///
    /// # Errors
    /// Returns error if `explicit` does not exist, or the chosen file cannot be
    /// read or parsed
    pub fn load_from(explicit: Option<PathBuf>) -> Result<Self> {
        let Some(config_path) = explicit else {
            let default_path = PathBuf::from(CONFIG_FILE_NAME);
            if !default_path.exists() {
                return Ok(Self::default());
            }
            return Self::from_file(&default_path);
        };

        if !config_path.exists() {
            anyhow::bail!(
                "config file {} named by {CONFIG_ENV_VAR} does not exist",
                config_path.display()
            );
        }

        Self::from_file(&config_path)
    }

    /// Load config from an explicit path
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::from_toml(&contents)
    }

    /// Parse config from TOML text
    ///
    /// # Errors
    /// Returns error on malformed TOML or invalid values
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.download.retries == 0 {
            anyhow::bail!("download.retries must be > 0");
        }
        if self.download.jitter_min_secs > self.download.jitter_max_secs {
            anyhow::bail!("download.jitter_min_secs must not exceed download.jitter_max_secs");
        }
        if self.normalize.sample_rate == 0 {
            anyhow::bail!("normalize.sample_rate must be > 0");
        }
        Ok(())
    }

    /// Datasets to prepare: the configured table, or the built-in one
    pub fn datasets(&self) -> Vec<Dataset> {
        self.datasets.clone().unwrap_or_else(builtin_datasets)
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if the path starts with `~/` and `HOME` is unset
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}
