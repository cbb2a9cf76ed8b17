//! Core data model for acquisition runs.
//!
//! This module defines the structures describing one acquisition attempt:
//! - RunConfig: the immutable request (what to acquire, where to put it)
//! - TargetHandle / ContainerHandle: the two resources a run holds
//! - RunState: the supervisor's stage machine
//! - RunSummary: the structured record a completed run emits

use std::fmt;
use std::path::PathBuf;
use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::checksums::ContainerDigests;

/// Immutable description of one acquisition attempt.
///
/// Constructed once at run start and never mutated. `source` may be absent
/// when `assisted` is set; the Target Locator then produces the handle.
/// Remote credential fields left as `None` are filled interactively by the
/// supervisor through its input provider.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Pre-mounted, read-only source path (absent in assisted mode)
    pub source: Option<PathBuf>,

    /// Directory that receives the container and the run artifacts
    pub destination: PathBuf,

    /// Base name for the container file and its artifact set
    pub container_name: String,

    /// Requested container size in bytes; absent means derive from the
    /// source's measured used capacity
    pub size_bytes: Option<u64>,

    /// Copy or mirror, fixed for the whole run
    pub strategy: TransferStrategy,

    /// Compute MD5 + SHA-256 over the finalized container file
    pub compute_hashes: bool,

    /// Discover and mount the remote share on the operator's behalf
    pub assisted: bool,

    /// Remote computer display name (assisted mode)
    pub remote_host: Option<String>,

    /// Remote username (assisted mode)
    pub remote_user: Option<String>,

    /// Remote password (assisted mode); ignored when `no_password` is set
    pub remote_password: Option<String>,

    /// Connect without a password instead of prompting for one
    pub no_password: bool,
}

/// Credentials the locator uses to reach a remote computer.
///
/// `password: None` means "connect with no password", requested explicitly —
/// the supervisor never leaves the field unresolved.
#[derive(Debug, Clone)]
pub struct RemoteCredentials {
    pub host: String,
    pub user: String,
    pub password: Option<String>,
}

/// The transfer strategy used to move file data into the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStrategy {
    /// Recursive, attribute- and symlink-preserving copy
    Copy,
    /// Archive-preserving, delta-aware mirror with its own structured log
    Mirror,
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStrategy::Copy => write!(f, "copy"),
            TransferStrategy::Mirror => write!(f, "mirror"),
        }
    }
}

impl TransferStrategy {
    /// Parse a strategy selector; `None` for anything unrecognized.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "copy" => Some(Self::Copy),
            "mirror" => Some(Self::Mirror),
            _ => None,
        }
    }
}

/// The resolved, mounted, read-only path an acquisition reads from.
///
/// Never written to; never unmounted by this system.
#[derive(Debug, Clone)]
pub struct TargetHandle {
    pub path: PathBuf,
}

/// The attached, writable container volume a run copies into.
///
/// Owned exclusively by the run supervisor for the duration of the run.
/// `volume_path` is the path the attach actually assigned, which may differ
/// from the requested name on collision.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    /// Path of the container file on disk
    pub image_path: PathBuf,

    /// Path where the container's volume is attached
    pub volume_path: PathBuf,
}

/// Stages of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Backup,
    LocateTarget,
    Provision,
    Transfer,
    Finalize,
    Summary,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::Backup => "backup",
            RunState::LocateTarget => "locate",
            RunState::Provision => "provision",
            RunState::Transfer => "transfer",
            RunState::Finalize => "finalize",
            RunState::Summary => "summary",
            RunState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Structured record of a completed run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// Unique identifier for this run
    pub run_id: Uuid,

    /// When the run started
    pub started_at: DateTime<Local>,

    /// When the run finished
    pub finished_at: DateTime<Local>,

    /// Resolved source path the data was read from
    pub source: PathBuf,

    /// Destination directory holding the container and artifacts
    pub destination: PathBuf,

    /// Container file path
    pub container_image: PathBuf,

    /// Volume path the container was attached at during transfer
    pub container_volume: PathBuf,

    /// Strategy used for the whole run
    pub strategy: TransferStrategy,

    /// Folder prior artifacts were archived into, if any existed
    pub backup_folder: Option<PathBuf>,

    /// Exit code of the transfer subprocess (None when killed by a signal
    /// or never started); non-zero does not fail the run
    pub transfer_exit_code: Option<i32>,

    /// Post-detach digests over the container file, when requested
    pub digests: Option<ContainerDigests>,

    /// Non-fatal problems accumulated along the way (detach failure,
    /// digest failure, archival misses)
    pub notes: Vec<String>,
}

impl RunSummary {
    /// True when the transfer subprocess reported a clean exit.
    pub fn transfer_clean(&self) -> bool {
        self.transfer_exit_code == Some(0)
    }
}
