use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};

const OPENSLR_BASE_URL: &str = "http://www.openslr.org/resources/12";

/// One downloadable archive and its known-good digest
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DatasetSource {
    /// Archive URL
    pub url: String,
    /// Expected MD5 as lowercase hex; `None` skips verification
    #[serde(default)]
    pub md5: Option<String>,
}

/// A corpus made of one or more archives sharing a directory
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Dataset {
    /// Human-readable name, used in logs
    pub name: String,
    /// Directory under the datasets root
    pub subdir: String,
    /// Archives to fetch into `subdir`
    pub sources: Vec<DatasetSource>,
}

/// A source bound to the file it should be downloaded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Where the archive comes from
    pub source: DatasetSource,
    /// Where it lands on disk
    pub destination: PathBuf,
}

impl DatasetSource {
    fn new(url: impl Into<String>, md5: &str) -> Self {
        Self {
            url: url.into(),
            md5: Some(md5.to_owned()),
        }
    }

    /// Archive file name: last URL path segment, query string dropped
    ///
    /// # Errors
    /// Returns error if the URL is malformed or ends without a file name
    pub fn file_name(&self) -> Result<String> {
        let url = Url::parse(&self.url).map_err(|e| DatasetError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| DatasetError::InvalidUrl {
                url: self.url.clone(),
                reason: "URL has no file name".to_owned(),
            })
    }

    /// Bind this source to a file inside `dir`
    ///
    /// # Errors
    /// Returns error if no file name can be derived from the URL
    pub fn task_in(&self, dir: &Path) -> Result<DownloadTask> {
        Ok(DownloadTask {
            source: self.clone(),
            destination: dir.join(self.file_name()?),
        })
    }
}

/// LibriSpeech subsets and UrbanSound8K with their published MD5 digests
pub fn builtin_datasets() -> Vec<Dataset> {
    vec![
        Dataset {
            name: "LibriSpeech".to_owned(),
            subdir: "LibriSpeech".to_owned(),
            sources: vec![
                DatasetSource::new(
                    format!("{OPENSLR_BASE_URL}/train-clean-100.tar.gz"),
                    "2f494334227864a8a8fec932999db9d8",
                ),
                DatasetSource::new(
                    format!("{OPENSLR_BASE_URL}/dev-clean.tar.gz"),
                    "42e2234ba48799c1f50f24a7926300a1",
                ),
            ],
        },
        Dataset {
            name: "UrbanSound8K".to_owned(),
            subdir: "UrbanSound8K".to_owned(),
            sources: vec![DatasetSource::new(
                "https://zenodo.org/record/1203745/files/UrbanSound8K.tar.gz?download=1",
                "8fd0635bf5bba613bbe69ec7e1077501",
            )],
        },
    ]
}
