use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;

use crate::error::{DatasetError, Result};

/// Path of the zero-byte marker recording that `archive` was extracted into `target`
///
/// Named `.<archive file name>.extracted` and placed in `target`.
pub fn marker_path(archive: &Path, target: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .map_or_else(|| "archive".into(), |n| n.to_string_lossy());
    target.join(format!(".{name}.extracted"))
}

/// Whether a prior run already extracted `archive` into `target`
pub fn is_extracted(archive: &Path, target: &Path) -> bool {
    marker_path(archive, target).exists()
}

/// Unpack `archive` into `target` unless its marker is already present
///
/// Returns `true` if extraction ran, `false` if it was skipped. The marker is
/// written only after every entry has been unpacked.
///
/// # Errors
/// Returns [`DatasetError::Extraction`] for unsupported or corrupt archives and
/// [`DatasetError::Io`] when the target or marker cannot be written
pub fn extract_archive(archive: &Path, target: &Path) -> Result<bool> {
    let marker = marker_path(archive, target);
    if marker.exists() {
        tracing::info!(
            archive = %archive.display(),
            marker = %marker.display(),
            "already extracted, skipping"
        );
        return Ok(false);
    }

    tracing::info!(
        archive = %archive.display(),
        target = %target.display(),
        "extracting archive"
    );

    fs::create_dir_all(target).map_err(|e| DatasetError::io(target, e))?;

    let file = File::open(archive).map_err(|e| DatasetError::io(archive, e))?;
    match ArchiveKind::detect(archive)? {
        ArchiveKind::TarGz => unpack_tar(archive, GzDecoder::new(file), target)?,
        ArchiveKind::Tar => unpack_tar(archive, file, target)?,
    }

    File::create(&marker).map_err(|e| DatasetError::io(&marker, e))?;

    tracing::info!(
        archive = %archive.display(),
        target = %target.display(),
        "extraction complete"
    );

    Ok(true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    TarGz,
    Tar,
}

impl ArchiveKind {
    fn detect(archive: &Path) -> Result<Self> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else {
            Err(DatasetError::Extraction {
                archive: archive.to_path_buf(),
                reason: format!("unsupported archive format: {name}"),
            })
        }
    }
}

fn unpack_tar<R: Read>(archive_path: &Path, reader: R, target: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(false);

    // `unpack` refuses entries that would land outside `target`
    archive
        .unpack(target)
        .map_err(|e| DatasetError::Extraction {
            archive: archive_path.to_path_buf(),
            reason: e.to_string(),
        })
}
