//! Container provisioning and finalization.
//!
//! Provisioning creates a sparse, single-volume container at the destination
//! and attaches it immediately; the attach tool's output is parsed strictly
//! for the volume path actually assigned. Finalization unconditionally
//! detaches and, when requested, computes the verification digests over the
//! closed container file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::artifacts::{NarrativeLog, RunArtifacts};
use crate::checksums::{self, ContainerDigests};
use crate::error::AcquireError;
use crate::model::{ContainerHandle, TargetHandle};
use crate::tools::HostTools;

/// Round a measured capacity up to the next (leading digit + 1) order of
/// magnitude: a capacity starting with digit `d` at magnitude `10^m` becomes
/// `(d + 1) * 10^m`. Deliberate over-provisioning — the container must never
/// come out smaller than the source, even if the source grows a little
/// between measurement and copy. Callers rely only on `result > capacity`.
pub fn derive_container_size(capacity_bytes: u64) -> u64 {
    let mut magnitude: u128 = 1;
    let mut leading: u128 = capacity_bytes as u128;
    while leading >= 10 {
        leading /= 10;
        magnitude *= 10;
    }
    let derived = (leading + 1) * magnitude;
    u64::try_from(derived).unwrap_or(u64::MAX)
}

/// Extract the assigned volume path from the attach tool's raw output.
///
/// Attach output lists device entries line by line, with the mount point as
/// the trailing path on the volume line. Mount points may contain spaces, so
/// the path runs from the first absolute non-device path to end of line.
/// Exactly one candidate must emerge; zero or several is an attach error,
/// never a guess.
pub fn parse_attach_volume(raw: &str) -> Option<PathBuf> {
    let mut candidates: Vec<&str> = Vec::new();
    for line in raw.lines() {
        let Some(pos) = line.find('/') else { continue };
        let tail = line[pos..].trim_end();
        if tail.starts_with("/dev/") {
            // Device column only; look for a second path on the same line
            if let Some(rest) = tail[1..].find(" /") {
                let mount = tail[1 + rest + 1..].trim_end();
                if !mount.starts_with("/dev/") && !mount.is_empty() {
                    candidates.push(mount);
                }
            }
        } else {
            candidates.push(tail);
        }
    }
    match candidates.as_slice() {
        [only] => Some(PathBuf::from(only)),
        _ => None,
    }
}

/// Create and attach the acquisition container.
///
/// When `size_bytes` is absent the source's used capacity is measured and
/// rounded up via [`derive_container_size`]. The destination directory is
/// created if missing. Create or attach failure is fatal: no transfer may
/// run without a valid container handle.
pub fn provision_container(
    tools: &dyn HostTools,
    size_bytes: Option<u64>,
    artifacts: &RunArtifacts,
    target: &TargetHandle,
    log: &mut NarrativeLog,
) -> Result<ContainerHandle, AcquireError> {
    let size = match size_bytes {
        Some(explicit) => explicit,
        None => {
            let measured = tools.used_capacity(&target.path)?;
            let derived = derive_container_size(measured);
            log.line(
                "provision",
                &format!("measured {} bytes used, provisioning {} bytes", measured, derived),
            );
            derived
        }
    };

    let image_path = artifacts.container_image();
    fs::create_dir_all(artifacts.destination()).map_err(|e| {
        AcquireError::ContainerCreateFailed {
            path: image_path.clone(),
            detail: format!("cannot create destination directory: {}", e),
        }
    })?;

    log.line(
        "provision",
        &format!("creating {} byte sparse container at {}", size, image_path.display()),
    );
    tools.create_container(&image_path, size, artifacts.name())?;

    let raw = tools.attach_container(&image_path)?;
    let volume_path =
        parse_attach_volume(&raw).ok_or_else(|| AcquireError::ContainerAttachFailed {
            path: image_path.clone(),
            detail: format!("no unambiguous volume path in attach output: {:?}", raw.trim()),
        })?;

    log.line("provision", &format!("container attached at {}", volume_path.display()));
    Ok(ContainerHandle {
        image_path,
        volume_path,
    })
}

/// What finalization achieved. Neither field failing fails the run.
#[derive(Debug)]
pub struct FinalizeOutcome {
    /// Set when the detach failed, with the reason.
    pub detach_error: Option<String>,

    /// Post-detach digests, when hashing was requested and succeeded.
    pub digests: Option<ContainerDigests>,

    /// Set when hashing was requested but failed.
    pub digest_error: Option<String>,
}

/// Detach the container and, when requested, digest the closed file.
///
/// Detach is attempted unconditionally; its failure is reported, not raised.
/// Digests run only after the detach attempt, over the closed container
/// file, so an in-progress attach can never skew them.
pub fn finalize_container(
    tools: &dyn HostTools,
    handle: &ContainerHandle,
    compute_hashes: bool,
    log: &mut NarrativeLog,
) -> FinalizeOutcome {
    let detach_error = match tools.detach_container(&handle.volume_path) {
        Ok(()) => {
            log.line("finalize", &format!("detached {}", handle.volume_path.display()));
            None
        }
        Err(e) => {
            log.error("finalize", &e.to_string());
            Some(e.to_string())
        }
    };

    let (digests, digest_error) = if compute_hashes {
        match checksums::compute_container_digests(&handle.image_path) {
            Ok(digests) => {
                log.line("finalize", &format!("md5    {}", digests.md5));
                log.line("finalize", &format!("sha256 {}", digests.sha256));
                (Some(digests), None)
            }
            Err(e) => {
                log.error("finalize", &e.to_string());
                (None, Some(e.to_string()))
            }
        }
    } else {
        (None, None)
    };

    FinalizeOutcome {
        detach_error,
        digests,
        digest_error,
    }
}
