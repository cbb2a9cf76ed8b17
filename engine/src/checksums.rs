//! Container digest computation.
//!
//! Verification uses two independent digest algorithms (MD5 and SHA-256)
//! over the finalized container file. Both are computed in a single pass;
//! recomputing over an unchanged file yields identical values.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use serde::Serialize;
use sha2::Digest;

use crate::error::AcquireError;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// MD5 (legacy, kept because forensic tooling still cross-checks it)
    Md5,
    /// SHA-256
    Sha256,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

/// A computed digest value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Both digests over one container file, as hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerDigests {
    pub md5: String,
    pub sha256: String,
}

/// Compute a single digest over a file.
///
/// # Errors
/// Returns `AcquireError::DigestFailed` if the file cannot be read.
pub fn compute_file_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumValue, AcquireError> {
    let mut file = open_for_digest(path)?;
    let mut buffer = [0u8; 65536];

    match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut context = md5::Context::new();
            loop {
                let n = read_chunk(&mut file, &mut buffer, path)?;
                if n == 0 {
                    break;
                }
                context.consume(&buffer[..n]);
            }
            Ok(ChecksumValue::new(
                ChecksumAlgorithm::Md5,
                format!("{:x}", context.compute()),
            ))
        }
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = sha2::Sha256::new();
            loop {
                let n = read_chunk(&mut file, &mut buffer, path)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            Ok(ChecksumValue::new(
                ChecksumAlgorithm::Sha256,
                format!("{:x}", hasher.finalize()),
            ))
        }
    }
}

/// Compute both verification digests over a finalized container file.
///
/// Single read pass feeding both hashers; the algorithms stay independent,
/// the I/O does not need to be.
///
/// # Errors
/// Returns `AcquireError::DigestFailed` if the file cannot be read.
pub fn compute_container_digests(path: &Path) -> Result<ContainerDigests, AcquireError> {
    let mut file = open_for_digest(path)?;
    let mut buffer = [0u8; 65536];

    let mut md5_context = md5::Context::new();
    let mut sha_hasher = sha2::Sha256::new();

    loop {
        let n = read_chunk(&mut file, &mut buffer, path)?;
        if n == 0 {
            break;
        }
        md5_context.consume(&buffer[..n]);
        sha_hasher.update(&buffer[..n]);
    }

    Ok(ContainerDigests {
        md5: format!("{:x}", md5_context.compute()),
        sha256: format!("{:x}", sha_hasher.finalize()),
    })
}

fn open_for_digest(path: &Path) -> Result<File, AcquireError> {
    File::open(path).map_err(|e| AcquireError::DigestFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_chunk(file: &mut File, buffer: &mut [u8], path: &Path) -> Result<usize, AcquireError> {
    file.read(buffer).map_err(|e| AcquireError::DigestFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
