//! # Acquire Engine - Logical Acquisition Library
//!
//! A headless engine for read-only, repeatable logical acquisition of a
//! remote filesystem share into a freshly provisioned disk container,
//! leaving an auditable artifact trail behind every attempt.
//!
//! ## Overview
//!
//! One acquisition run moves through a fixed sequence:
//! archive prior artifacts, resolve the target (directly, or by discovering
//! and read-only mounting a remote share), provision and attach a sparse
//! container, transfer the source's contents with partial-failure tolerance,
//! detach and optionally digest the container, and emit a structured
//! summary. The source is never written to and never unmounted; the
//! container is detached on every exit path, exactly once.
//!
//! Native primitives (share discovery, mounting, container tooling,
//! capacity probing) sit behind the [`tools::HostTools`] trait, and operator
//! prompts behind [`prompt::InputProvider`], so the sequencing is fully
//! testable without host privileges or a terminal.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::path::PathBuf;
//! use engine::{execute_run, CancelToken, RunConfig, ScriptedInput, SystemTools, TransferStrategy};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig {
//!     source: Some(PathBuf::from("/mnt/share")),
//!     destination: PathBuf::from("/cases/out"),
//!     container_name: "evidence".to_string(),
//!     size_bytes: None,
//!     strategy: TransferStrategy::Copy,
//!     compute_hashes: true,
//!     assisted: false,
//!     remote_host: None,
//!     remote_user: None,
//!     remote_password: None,
//!     no_password: false,
//! };
//!
//! let tools = SystemTools::new();
//! let mut input = ScriptedInput::default();
//! let summary = execute_run(&config, &tools, &mut input, &CancelToken::new())?;
//! println!("container: {}", summary.container_image.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (RunConfig, handles, RunSummary)
//! - **error**: Fatal error taxonomy
//! - **artifacts**: Deterministic artifact paths and the narrative log
//! - **backup**: Prior-run archival
//! - **locator**: Assisted-mode share discovery and read-only mount
//! - **container**: Container provisioning and finalization
//! - **transfer**: Copy/mirror transfer strategies
//! - **checksums**: Post-detach container digests
//! - **tools**: External host-tool seam
//! - **prompt**: Operator input seam
//! - **run**: The run supervisor

pub mod artifacts;
pub mod backup;
pub mod checksums;
pub mod container;
pub mod error;
pub mod locator;
pub mod model;
pub mod prompt;
pub mod run;
pub mod tools;
pub mod transfer;

// Re-export main types and functions
pub use artifacts::{NarrativeLog, RunArtifacts};
pub use backup::{archive_previous_run, ArchiveOutcome};
pub use checksums::{compute_container_digests, ChecksumAlgorithm, ContainerDigests};
pub use container::{derive_container_size, FinalizeOutcome};
pub use error::AcquireError;
pub use model::{
    ContainerHandle, RemoteCredentials, RunConfig, RunState, RunSummary, TargetHandle,
    TransferStrategy,
};
pub use prompt::{InputProvider, ScriptedInput};
pub use run::{execute_run, CancelToken};
pub use tools::{HostTools, SystemTools};
pub use transfer::TransferOutcome;
