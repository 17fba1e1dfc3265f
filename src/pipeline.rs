//! Sequential dataset preparation
//!
//! Directory setup, then per source download + verify + extract, then
//! dataset-wide audio normalization. Nothing is rolled back; marker files and
//! existence checks make a re-run pick up where the previous one stopped.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::{normalize_tree, NormalizeOptions, NormalizeReport};
use crate::config::Config;
use crate::download::{Downloader, FetchOutcome, ReqwestTransport, Transport};
use crate::extract::extract_archive;
use crate::sources::Dataset;

/// What one run did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Archives fetched over the network
    pub downloaded: usize,
    /// Archives already on disk with a valid checksum
    pub already_present: usize,
    /// Archives that needed a checksum-triggered re-download
    pub redownloaded: usize,
    /// Archives unpacked in this run
    pub extracted: usize,
    /// Archives skipped because their marker was present
    pub extraction_skipped: usize,
    /// Archives whose extraction failed
    pub extraction_failures: Vec<PathBuf>,
    /// Audio normalization counts across all datasets
    pub audio: NormalizeReport,
}

impl RunSummary {
    /// Whether any item was skipped because of an error
    pub fn has_failures(&self) -> bool {
        !self.extraction_failures.is_empty() || self.audio.failed > 0
    }
}

/// Drives every dataset through download, verification, extraction and normalization
#[derive(Debug)]
pub struct Pipeline<T = ReqwestTransport> {
    config: Config,
    downloader: Downloader<T>,
    datasets_dir: PathBuf,
}

impl Pipeline<ReqwestTransport> {
    /// Build a pipeline that downloads over HTTP
    ///
    /// # Errors
    /// Returns error if paths cannot be expanded or the HTTP client cannot be built
    pub fn from_config(config: Config) -> Result<Self> {
        let downloader =
            Downloader::from_config(&config.download).context("failed to build HTTP client")?;
        Self::with_downloader(config, downloader)
    }
}

impl<T: Transport> Pipeline<T> {
    /// Build a pipeline around an existing downloader
    ///
    /// # Errors
    /// Returns error if `paths.datasets_dir` cannot be expanded
    pub fn with_downloader(config: Config, downloader: Downloader<T>) -> Result<Self> {
        let datasets_dir = Config::expand_path(&config.paths.datasets_dir)?;
        Ok(Self {
            config,
            downloader,
            datasets_dir,
        })
    }

    /// Directory a dataset is downloaded and extracted into
    pub fn dataset_dir(&self, dataset: &Dataset) -> PathBuf {
        self.datasets_dir.join(&dataset.subdir)
    }

    /// Create the datasets root and one directory per dataset
    ///
    /// # Errors
    /// Returns error if a directory cannot be created
    pub fn setup_directories(&self, datasets: &[Dataset]) -> Result<Vec<PathBuf>> {
        datasets
            .iter()
            .map(|dataset| {
                let dir = self.dataset_dir(dataset);
                fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                Ok(dir)
            })
            .collect()
    }

    /// Run every stage in order
    ///
    /// # Errors
    /// Download exhaustion and persistent checksum mismatches stop the run.
    /// Extraction failures stop it only with `extraction.abort_on_failure`.
    pub fn run(&self) -> Result<RunSummary> {
        let datasets = self.config.datasets();
        let mut summary = RunSummary::default();

        self.setup_directories(&datasets)?;

        for dataset in &datasets {
            self.prepare_dataset(dataset, &mut summary)?;
        }

        if self.config.normalize.enabled {
            for dataset in &datasets {
                let report = self.normalize_dataset(dataset)?;
                summary.audio.merge(report);
            }
        }

        if summary.has_failures() {
            tracing::warn!(
                extraction_failures = summary.extraction_failures.len(),
                audio_failures = summary.audio.failed,
                "data collection finished with skipped items"
            );
        } else {
            tracing::info!("data collection and extraction completed successfully");
        }

        Ok(summary)
    }

    fn prepare_dataset(&self, dataset: &Dataset, summary: &mut RunSummary) -> Result<()> {
        let dir = self.dataset_dir(dataset);
        tracing::info!(
            dataset = %dataset.name,
            dir = %dir.display(),
            sources = dataset.sources.len(),
            "preparing dataset"
        );

        for source in &dataset.sources {
            let task = source.task_in(&dir)?;

            let outcome = self
                .downloader
                .fetch_verified(&task)
                .with_context(|| format!("failed to fetch {}", source.url))?;
            match outcome {
                FetchOutcome::AlreadyPresent => summary.already_present += 1,
                FetchOutcome::Downloaded => summary.downloaded += 1,
                FetchOutcome::Redownloaded => summary.redownloaded += 1,
            }

            match extract_archive(&task.destination, &dir) {
                Ok(true) => summary.extracted += 1,
                Ok(false) => summary.extraction_skipped += 1,
                Err(e) if self.config.extraction.abort_on_failure => {
                    return Err(e).with_context(|| {
                        format!("failed to extract {}", task.destination.display())
                    });
                }
                Err(e) => {
                    tracing::error!(
                        archive = %task.destination.display(),
                        error = %e,
                        "extraction failed, continuing with next source"
                    );
                    summary.extraction_failures.push(task.destination.clone());
                }
            }
        }

        Ok(())
    }

    fn normalize_dataset(&self, dataset: &Dataset) -> Result<NormalizeReport> {
        let root = self.dataset_dir(dataset);
        let options = self.normalize_options(dataset)?;
        Ok(normalize_tree(&root, &options))
    }

    fn normalize_options(&self, dataset: &Dataset) -> Result<NormalizeOptions> {
        let config = &self.config.normalize;
        let output_dir = config
            .output_dir
            .as_deref()
            .map(Config::expand_path)
            .transpose()?
            .map(|dir| dir.join(&dataset.subdir));

        Ok(NormalizeOptions {
            sample_rate: config.sample_rate,
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            delete_originals: config.delete_originals,
            output_dir,
        })
    }

    /// Root under which dataset directories live
    pub fn datasets_dir(&self) -> &Path {
        &self.datasets_dir
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::transport::MockTransport;
    use crate::download::{ResponseBody, RetryPolicy};
    use crate::error::DatasetError;
    use crate::extract::marker_path;
    use crate::sources::DatasetSource;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Cursor;

    fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn config_for(root: &Path, sources: Vec<DatasetSource>) -> Config {
        let mut config = Config::default();
        config.paths.datasets_dir = root.join("datasets").to_string_lossy().into_owned();
        config.normalize.enabled = false;
        config.datasets = Some(vec![Dataset {
            name: "Tiny".to_owned(),
            subdir: "Tiny".to_owned(),
            sources,
        }]);
        config
    }

    fn source(name: &str, bytes: &[u8]) -> DatasetSource {
        DatasetSource {
            url: format!("http://example.invalid/{name}"),
            md5: Some(format!("{:x}", md5::compute(bytes))),
        }
    }

    fn serving(archive: Vec<u8>, times: usize) -> MockTransport {
        let mut transport = MockTransport::new();
        transport.expect_get().times(times).returning(move |_| {
            Ok(ResponseBody {
                content_length: Some(archive.len() as u64),
                reader: Box::new(Cursor::new(archive.clone())),
            })
        });
        transport
    }

    #[test]
    fn test_run_downloads_verifies_and_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let archive = tar_gz(&[("Tiny/readme.txt", b"hello")]);
        let config = config_for(dir.path(), vec![source("tiny.tar.gz", &archive)]);

        let downloader = Downloader::new(serving(archive, 1), RetryPolicy::immediate(3));
        let pipeline = Pipeline::with_downloader(config, downloader).unwrap();
        let summary = pipeline.run().unwrap();

        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.extracted, 1);
        assert!(!summary.has_failures());

        let dataset_dir = pipeline.datasets_dir().join("Tiny");
        assert!(dataset_dir.join("Tiny/readme.txt").exists());
        assert!(marker_path(&dataset_dir.join("tiny.tar.gz"), &dataset_dir).exists());
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let archive = tar_gz(&[("Tiny/readme.txt", b"hello")]);
        let sources = vec![source("tiny.tar.gz", &archive)];

        let first = Pipeline::with_downloader(
            config_for(dir.path(), sources.clone()),
            Downloader::new(serving(archive, 1), RetryPolicy::immediate(3)),
        )
        .unwrap();
        first.run().unwrap();

        // No request may be made on the second run
        let second = Pipeline::with_downloader(
            config_for(dir.path(), sources),
            Downloader::new(serving(Vec::new(), 0), RetryPolicy::immediate(3)),
        )
        .unwrap();
        let summary = second.run().unwrap();

        assert_eq!(summary.downloaded, 0);
        assert_eq!(summary.already_present, 1);
        assert_eq!(summary.extracted, 0);
        assert_eq!(summary.extraction_skipped, 1);
    }

    #[test]
    fn test_extraction_failure_continues_with_next_source() {
        let dir = tempfile::tempdir().unwrap();
        let broken = b"not an archive".to_vec();
        let good = tar_gz(&[("Tiny/ok.txt", b"ok")]);

        let mut transport = MockTransport::new();
        let (broken_body, good_body) = (broken.clone(), good.clone());
        transport.expect_get().times(2).returning(move |url| {
            let bytes = if url.ends_with("broken.tar.gz") {
                broken_body.clone()
            } else {
                good_body.clone()
            };
            Ok(ResponseBody {
                content_length: Some(bytes.len() as u64),
                reader: Box::new(Cursor::new(bytes)),
            })
        });

        let config = config_for(
            dir.path(),
            vec![source("broken.tar.gz", &broken), source("good.tar.gz", &good)],
        );
        let pipeline = Pipeline::with_downloader(
            config,
            Downloader::new(transport, RetryPolicy::immediate(1)),
        )
        .unwrap();
        let summary = pipeline.run().unwrap();

        assert_eq!(summary.extraction_failures.len(), 1);
        assert_eq!(summary.extracted, 1);
        assert!(summary.has_failures());
        assert!(pipeline.datasets_dir().join("Tiny/Tiny/ok.txt").exists());
    }

    #[test]
    fn test_extraction_failure_aborts_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let broken = b"not an archive".to_vec();

        let mut config = config_for(dir.path(), vec![source("broken.tar.gz", &broken)]);
        config.extraction.abort_on_failure = true;

        let pipeline = Pipeline::with_downloader(
            config,
            Downloader::new(serving(broken, 1), RetryPolicy::immediate(1)),
        )
        .unwrap();
        let err = pipeline.run().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::Extraction { .. })
        ));
    }

    #[test]
    fn test_download_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = tar_gz(&[("a.txt", b"a")]);
        let config = config_for(
            dir.path(),
            vec![source("a.tar.gz", &archive), source("b.tar.gz", &archive)],
        );

        let mut transport = MockTransport::new();
        transport.expect_get().times(2).returning(|url| {
            Err(DatasetError::HttpStatus {
                url: url.to_owned(),
                status: 503,
            })
        });

        let pipeline = Pipeline::with_downloader(
            config,
            Downloader::new(transport, RetryPolicy::immediate(2)),
        )
        .unwrap();
        let err = pipeline.run().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::RetriesExhausted { attempts: 2, .. })
        ));
        let dataset_dir = pipeline.datasets_dir().join("Tiny");
        assert!(!dataset_dir.join("a.tar.gz").exists());
        assert!(!dataset_dir.join("b.tar.gz").exists());
    }

    #[test]
    fn test_normalize_options_mirror_per_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(dir.path(), Vec::new());
        config.normalize.output_dir = Some("/srv/wav".to_owned());
        config.normalize.extensions = vec![".FLAC".to_owned()];

        let pipeline = Pipeline::with_downloader(
            config,
            Downloader::new(MockTransport::new(), RetryPolicy::immediate(1)),
        )
        .unwrap();
        let dataset = pipeline.config.datasets().remove(0);
        let options = pipeline.normalize_options(&dataset).unwrap();

        assert_eq!(options.output_dir, Some(PathBuf::from("/srv/wav/Tiny")));
        assert_eq!(options.extensions, vec!["flac".to_owned()]);
    }
}
