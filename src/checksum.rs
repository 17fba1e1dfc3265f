use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{DatasetError, Result};

/// Read size used while hashing
pub const CHUNK_SIZE: usize = 4096;

/// Compute the MD5 of a file as lowercase hex, streaming in fixed-size chunks
///
/// # Errors
/// Returns error if the file cannot be opened or read
pub fn compute_md5(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let mut context = md5::Context::new();
    let mut buffer = [0_u8; CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer).map_err(|e| DatasetError::io(path, e))?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Outcome of comparing a file against its expected digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Digest matches
    Match,
    /// Digest differs; carries the computed value
    Mismatch(String),
}

/// Compare a file's MD5 against `expected` (case-insensitive hex)
///
/// # Errors
/// Returns error if the file cannot be read
pub fn verify_md5(path: &Path, expected: &str) -> Result<Verification> {
    let actual = compute_md5(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(Verification::Match)
    } else {
        Ok(Verification::Mismatch(actual))
    }
}
