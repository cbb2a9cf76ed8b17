//! Error types for the acquisition engine.
//!
//! The primary error type is `AcquireError`, which represents fatal run-level
//! errors: bad configuration, locator failures, provisioning failures, and
//! artifact I/O problems. Transfer failures are deliberately NOT represented
//! here — a partial copy is an expected outcome in logical acquisition and is
//! recorded in `TransferOutcome` instead of aborting the run.

use std::error::Error;
use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;

/// Fatal errors that abort an acquisition run.
///
/// Variants map onto the run's error taxonomy: configuration errors stop the
/// run before it starts, locator errors abort before any destination state is
/// created, provisioning errors abort after triggering container cleanup.
/// Finalization problems (detach, digest) are surfaced as summary notes by
/// the supervisor and only appear here as typed payloads for the tool seam.
#[derive(Debug)]
pub enum AcquireError {
    /// No source path given and assisted discovery was declined.
    MissingTarget,

    /// A required remote credential was not supplied and could not be prompted.
    MissingCredential { field: &'static str },

    /// Reading operator input failed.
    PromptFailed { source: io::Error },

    /// Share discovery could not reach the remote computer.
    TargetUnreachable { host: String, detail: String },

    /// The remote computer rejected the supplied credentials.
    AuthenticationFailed { host: String, detail: String },

    /// Share discovery returned no share of type Disk.
    NoShareFound { host: String },

    /// Share discovery returned more than one Disk share.
    AmbiguousShares { host: String, shares: Vec<String> },

    /// Read-only mount of the discovered share failed.
    MountFailed {
        share: String,
        mount_point: PathBuf,
        detail: String,
    },

    /// The source's used capacity could not be measured for size derivation.
    CapacityProbeFailed { path: PathBuf, detail: String },

    /// Container creation failed.
    ContainerCreateFailed { path: PathBuf, detail: String },

    /// Container attach failed, or its output named no usable volume.
    ContainerAttachFailed { path: PathBuf, detail: String },

    /// Container detach failed. Downgraded to a summary note by the finalizer.
    DetachFailed { volume: PathBuf, detail: String },

    /// Digest computation over the finalized container failed.
    DigestFailed { path: PathBuf, source: io::Error },

    /// A run artifact (narrative log, transfer log, error log) could not be
    /// created or written.
    ArtifactIo { path: PathBuf, source: io::Error },

    /// The operator interrupted the run.
    Cancelled,
}

impl Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTarget => {
                write!(f, "no acquisition target: supply a mounted source path or use assisted mode")
            }
            Self::MissingCredential { field } => {
                write!(f, "assisted mode requires a {}", field)
            }
            Self::PromptFailed { .. } => {
                write!(f, "failed to read operator input")
            }
            Self::TargetUnreachable { host, detail } => {
                write!(f, "cannot reach '{}': {}", host, detail)
            }
            Self::AuthenticationFailed { host, detail } => {
                write!(f, "authentication to '{}' failed: {}", host, detail)
            }
            Self::NoShareFound { host } => {
                write!(f, "'{}' advertises no Disk share to mount", host)
            }
            Self::AmbiguousShares { host, shares } => {
                write!(
                    f,
                    "'{}' advertises {} Disk shares ({}); cannot choose one",
                    host,
                    shares.len(),
                    shares.join(", ")
                )
            }
            Self::MountFailed { share, mount_point, detail } => {
                write!(
                    f,
                    "read-only mount of '{}' at {} failed: {}",
                    share,
                    mount_point.display(),
                    detail
                )
            }
            Self::CapacityProbeFailed { path, detail } => {
                write!(f, "cannot measure used capacity of {}: {}", path.display(), detail)
            }
            Self::ContainerCreateFailed { path, detail } => {
                write!(f, "container creation at {} failed: {}", path.display(), detail)
            }
            Self::ContainerAttachFailed { path, detail } => {
                write!(f, "container attach of {} failed: {}", path.display(), detail)
            }
            Self::DetachFailed { volume, detail } => {
                write!(f, "detach of {} failed: {}", volume.display(), detail)
            }
            Self::DigestFailed { path, .. } => {
                write!(f, "digest computation over {} failed", path.display())
            }
            Self::ArtifactIo { path, .. } => {
                write!(f, "cannot write run artifact {}", path.display())
            }
            Self::Cancelled => {
                write!(f, "run cancelled by operator")
            }
        }
    }
}

impl Error for AcquireError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PromptFailed { source }
            | Self::DigestFailed { source, .. }
            | Self::ArtifactIo { source, .. } => Some(source),
            _ => None,
        }
    }
}
