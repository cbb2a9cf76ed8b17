//! Transfer engine.
//!
//! Moves the mounted source's contents into the attached container by
//! driving an external copy tool, with its per-item transcript redirected to
//! the transfer log and its diagnostics to the error log. A non-zero exit is
//! an expected outcome — permission-denied and in-use files are routine in
//! logical acquisition — so the exit code is recorded, never escalated; the
//! supervisor proceeds to finalization regardless.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::artifacts::{NarrativeLog, RunArtifacts};
use crate::error::AcquireError;
use crate::model::{ContainerHandle, TargetHandle, TransferStrategy};

/// Result of one transfer invocation. Never a run-level error.
#[derive(Debug)]
pub struct TransferOutcome {
    pub strategy: TransferStrategy,

    /// Exit code of the transfer subprocess; `None` when it was killed by a
    /// signal or could not be started at all.
    pub exit_code: Option<i32>,

    /// Set when the subprocess could not even be spawned.
    pub spawn_error: Option<String>,
}

impl TransferOutcome {
    pub fn clean(&self) -> bool {
        self.exit_code == Some(0) && self.spawn_error.is_none()
    }
}

/// Normalize a path to a string with exactly one trailing separator, so the
/// strategy copies the directory's *contents*, not the directory itself
/// nested one level down.
pub fn with_trailing_slash(path: &Path) -> String {
    let mut s = path.to_string_lossy().into_owned();
    while s.ends_with('/') {
        s.pop();
    }
    s.push('/');
    s
}

/// Build the subprocess for a strategy, source, and destination volume.
///
/// - `copy`: recursive, attribute-preserving, symlink-preserving copy of the
///   source's contents.
/// - `mirror`: archive-mode delta copy that also writes its own structured
///   log next to the run artifacts.
pub fn strategy_command(
    strategy: TransferStrategy,
    source: &Path,
    volume: &Path,
    artifacts: &RunArtifacts,
) -> Command {
    let src = with_trailing_slash(source);
    let dst = with_trailing_slash(volume);
    match strategy {
        TransferStrategy::Copy => {
            let mut cmd = Command::new("cp");
            // `<src>/.` so dotfiles at the source root come along
            cmd.arg("-R").arg("-p").arg("-P").arg("-v");
            cmd.arg(format!("{}.", src));
            cmd.arg(dst);
            cmd
        }
        TransferStrategy::Mirror => {
            let mut cmd = Command::new("rsync");
            cmd.arg("-a").arg("-v");
            cmd.arg(format!("--log-file={}", artifacts.mirror_log().display()));
            cmd.arg(src);
            cmd.arg(dst);
            cmd
        }
    }
}

/// Execute the configured strategy, source contents into container root.
///
/// stdout goes to the transfer log, stderr to the error log, both opened
/// append-only. Exactly one strategy executes per run.
///
/// # Errors
/// Only artifact-file problems are errors here; every copy-level failure is
/// data in the returned `TransferOutcome`.
pub fn run_transfer(
    strategy: TransferStrategy,
    target: &TargetHandle,
    container: &ContainerHandle,
    artifacts: &RunArtifacts,
    log: &mut NarrativeLog,
) -> Result<TransferOutcome, AcquireError> {
    let stdout_file = open_append(&artifacts.transfer_log())?;
    let stderr_file = open_append(&artifacts.error_log())?;

    let mut cmd = strategy_command(strategy, &target.path, &container.volume_path, artifacts);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::from(stdout_file));
    cmd.stderr(Stdio::from(stderr_file));

    log.line(
        "transfer",
        &format!(
            "{} strategy: {} -> {}",
            strategy,
            target.path.display(),
            container.volume_path.display()
        ),
    );

    let status = match cmd.status() {
        Ok(status) => status,
        Err(e) => {
            log.error("transfer", &format!("could not start transfer tool: {}", e));
            return Ok(TransferOutcome {
                strategy,
                exit_code: None,
                spawn_error: Some(e.to_string()),
            });
        }
    };

    match status.code() {
        Some(0) => log.line("transfer", "transfer completed cleanly"),
        Some(code) => log.error(
            "transfer",
            &format!(
                "transfer exited with code {}; see {} for failed items",
                code,
                artifacts.error_log().display()
            ),
        ),
        None => log.error("transfer", "transfer tool terminated by signal"),
    }

    Ok(TransferOutcome {
        strategy,
        exit_code: status.code(),
        spawn_error: None,
    })
}

fn open_append(path: &Path) -> Result<std::fs::File, AcquireError> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| AcquireError::ArtifactIo {
            path: path.to_path_buf(),
            source: e,
        })
}
