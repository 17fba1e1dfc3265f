use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::decode::decode_file;
use super::resample::to_mono_at_rate;
use crate::download::part_path;
use crate::error::{DatasetError, Result};

/// How a dataset tree should be normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Target sample rate in Hz
    pub sample_rate: u32,
    /// Lowercase extensions (no dot) treated as audio
    pub extensions: Vec<String>,
    /// Remove compressed originals once the WAV counterpart is verified, and
    /// allow non-conforming WAVs to be rewritten in place
    pub delete_originals: bool,
    /// Mirror root for outputs; `None` writes beside the input
    pub output_dir: Option<PathBuf>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
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

/// Per-tree counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Files decoded and written as WAV
    pub converted: usize,
    /// Files whose WAV output already existed
    pub skipped: usize,
    /// Files that could not be converted
    pub failed: usize,
    /// Originals removed, or WAVs replaced in place
    pub originals_deleted: usize,
}

impl NormalizeReport {
    /// Add another tree's counts to this one
    pub fn merge(&mut self, other: Self) {
        self.converted += other.converted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.originals_deleted += other.originals_deleted;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Converted { original_deleted: bool },
    Skipped { original_deleted: bool },
}

/// Convert every recognized audio file under `root` to mono WAV at the target rate
///
/// Files are collected before any output is written, so WAVs produced during
/// this pass are not revisited. Per-file failures are logged and counted.
pub fn normalize_tree(root: &Path, options: &NormalizeOptions) -> NormalizeReport {
    let mut report = NormalizeReport::default();

    let candidates: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| is_audio_candidate(path, &options.extensions))
        .collect();

    tracing::info!(
        root = %root.display(),
        files = candidates.len(),
        sample_rate = options.sample_rate,
        "normalizing audio"
    );

    for path in &candidates {
        match normalize_file(path, root, options) {
            Ok(FileOutcome::Converted { original_deleted }) => {
                report.converted += 1;
                report.originals_deleted += usize::from(original_deleted);
            }
            Ok(FileOutcome::Skipped { original_deleted }) => {
                report.skipped += 1;
                report.originals_deleted += usize::from(original_deleted);
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to normalize audio file");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        root = %root.display(),
        converted = report.converted,
        skipped = report.skipped,
        failed = report.failed,
        originals_deleted = report.originals_deleted,
        "audio normalization complete"
    );

    report
}

fn is_audio_candidate(path: &Path, extensions: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    // Marker files and in-flight writes
    if name.starts_with('.') || name.ends_with(".part") {
        return false;
    }

    lowercase_extension(path).is_some_and(|ext| extensions.iter().any(|e| *e == ext))
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Where the WAV counterpart of `input` lives
///
/// Beside the input by default; under `output_dir` with `input`'s path
/// relative to `root` when mirroring.
pub fn output_path(input: &Path, root: &Path, options: &NormalizeOptions) -> PathBuf {
    let wav = input.with_extension("wav");
    match &options.output_dir {
        Some(out) => wav
            .strip_prefix(root)
            .map_or_else(|_| wav.clone(), |relative| out.join(relative)),
        None => wav,
    }
}

fn normalize_file(input: &Path, root: &Path, options: &NormalizeOptions) -> Result<FileOutcome> {
    let output = output_path(input, root, options);
    let is_wav_input = lowercase_extension(input).as_deref() == Some("wav");

    // Rewriting a WAV in place replaces the original, so it follows `delete_originals`
    if output == input {
        if is_normalized(input, options.sample_rate) {
            return Ok(FileOutcome::Skipped {
                original_deleted: false,
            });
        }
        if !options.delete_originals {
            tracing::info!(
                path = %input.display(),
                "WAV not at target format, keeping original (set delete_originals or output_dir to convert)"
            );
            return Ok(FileOutcome::Skipped {
                original_deleted: false,
            });
        }
        convert(input, &output, options.sample_rate)?;
        return Ok(FileOutcome::Converted {
            original_deleted: true,
        });
    }

    if output.exists() {
        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            "WAV counterpart exists, skipping"
        );
        let original_deleted = !is_wav_input
            && options.delete_originals
            && delete_if_verified(input, &output, options.sample_rate)?;
        return Ok(FileOutcome::Skipped { original_deleted });
    }

    convert(input, &output, options.sample_rate)?;

    let original_deleted = !is_wav_input
        && options.delete_originals
        && delete_if_verified(input, &output, options.sample_rate)?;
    Ok(FileOutcome::Converted { original_deleted })
}

fn convert(input: &Path, output: &Path, sample_rate: u32) -> Result<()> {
    let decoded = decode_file(input)?;
    let mono = to_mono_at_rate(
        &decoded.samples,
        decoded.channels,
        decoded.sample_rate,
        sample_rate,
    );
    write_wav(&mono, output, sample_rate)?;

    tracing::debug!(
        input = %input.display(),
        output = %output.display(),
        source_rate = decoded.sample_rate,
        channels = decoded.channels,
        "converted to mono WAV"
    );
    Ok(())
}

/// Whether `path` is a readable mono WAV at `sample_rate`
pub fn is_normalized(path: &Path, sample_rate: u32) -> bool {
    WavReader::open(path)
        .map(|reader| {
            let spec = reader.spec();
            spec.channels == 1 && spec.sample_rate == sample_rate
        })
        .unwrap_or(false)
}

fn delete_if_verified(original: &Path, wav: &Path, sample_rate: u32) -> Result<bool> {
    if !is_normalized(wav, sample_rate) {
        tracing::warn!(
            original = %original.display(),
            wav = %wav.display(),
            "WAV counterpart failed verification, keeping original"
        );
        return Ok(false);
    }

    fs::remove_file(original).map_err(|e| DatasetError::io(original, e))?;
    tracing::debug!(path = %original.display(), "deleted original");
    Ok(true)
}

/// Write mono samples as 16-bit PCM WAV, atomically replacing `path`
///
/// # Errors
/// Returns error if directory creation or file write fails
pub fn write_wav(samples: &[f32], path: &Path, sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let temp_path = part_path(path);
    let encode_err = |source| DatasetError::Encode {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WavWriter::create(&temp_path, spec).map_err(encode_err)?;
    for &sample in samples {
        // Clamped to [-1, 1] first, so the product fits i16
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(value).map_err(encode_err)?;
    }
    writer.finalize().map_err(encode_err)?;

    fs::rename(&temp_path, path).map_err(|e| DatasetError::io(path, e))?;
    Ok(())
}
