//! Run artifacts: deterministic paths and the narrative log.
//!
//! Every run produces a container file plus three append-only logs under the
//! destination directory, all named from the container name:
//! `<name>.sparseimage`, `<name>.out` (narrative), `<name>.log` (transfer
//! successes), `<name>.err` (transfer errors). The mirror strategy also
//! leaves `<name>.rsync.log`, its tool-native structured log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use chrono::Local;

use crate::error::AcquireError;

/// Suffix of the container file.
pub const CONTAINER_SUFFIX: &str = "sparseimage";

/// Deterministic artifact paths for one (destination, container name) pair.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    destination: PathBuf,
    name: String,
}

impl RunArtifacts {
    pub fn new(destination: &Path, name: &str) -> Self {
        RunArtifacts {
            destination: destination.to_path_buf(),
            name: name.to_string(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<destination>/<name>.sparseimage`
    pub fn container_image(&self) -> PathBuf {
        self.destination.join(format!("{}.{}", self.name, CONTAINER_SUFFIX))
    }

    /// `<destination>/<name>.out` — narrative transcript of the whole run.
    pub fn narrative_log(&self) -> PathBuf {
        self.destination.join(format!("{}.out", self.name))
    }

    /// `<destination>/<name>.log` — successful transfer items.
    pub fn transfer_log(&self) -> PathBuf {
        self.destination.join(format!("{}.log", self.name))
    }

    /// `<destination>/<name>.err` — transfer errors.
    pub fn error_log(&self) -> PathBuf {
        self.destination.join(format!("{}.err", self.name))
    }

    /// `<destination>/<name>.rsync.log` — the mirror strategy's own log.
    pub fn mirror_log(&self) -> PathBuf {
        self.destination.join(format!("{}.rsync.log", self.name))
    }

    /// Every artifact path a prior run with this name may have left behind,
    /// in archival order.
    pub fn archivable(&self) -> Vec<PathBuf> {
        vec![
            self.container_image(),
            self.narrative_log(),
            self.transfer_log(),
            self.error_log(),
            self.mirror_log(),
        ]
    }
}

/// Append-only writer for the `.out` transcript.
///
/// Every line is timestamped, stage-prefixed, and teed to stderr so the
/// operator sees the run live while the transcript stays complete on disk.
/// Write failures after creation are swallowed: narration must never take
/// down an acquisition that is otherwise progressing.
pub struct NarrativeLog {
    file: File,
    echo: bool,
}

impl NarrativeLog {
    /// Open (append, create) the narrative log at `path`.
    ///
    /// # Errors
    /// Returns `AcquireError::ArtifactIo` if the file cannot be opened.
    pub fn create(path: &Path, echo: bool) -> Result<Self, AcquireError> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| AcquireError::ArtifactIo {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(NarrativeLog { file, echo })
    }

    /// Write one stage-prefixed line.
    pub fn line(&mut self, stage: &str, message: &str) {
        let rendered = format!(
            "{} [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            stage,
            message
        );
        if self.echo {
            eprintln!("{}", rendered);
        }
        let _ = writeln!(self.file, "{}", rendered);
    }

    /// Write one stage-prefixed error line. Errors always reach the
    /// transcript in addition to any dedicated log.
    pub fn error(&mut self, stage: &str, message: &str) {
        self.line(stage, &format!("ERROR: {}", message));
    }
}
