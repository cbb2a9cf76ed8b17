//! Prior-run archival.
//!
//! Before a new run starts, any artifact a previous run with the same
//! container name left in the destination root is moved into a fresh
//! timestamp-named subfolder, each file renamed `<timestamp>.<original>`.
//! Archival is the de facto mutual exclusion for the artifact namespace:
//! after it runs, the subsequent provisioning step starts from a clean
//! slate. It is strictly best-effort and never deletes anything — a move
//! failure leaves the original in place and is reported, not escalated.

use std::fs;
use std::path::{Path, PathBuf};
use chrono::Local;

use crate::artifacts::RunArtifacts;

/// What the archival pass did.
#[derive(Debug)]
pub struct ArchiveOutcome {
    /// The timestamped folder artifacts were moved into; `None` when there
    /// was nothing to archive or the folder could not be created.
    pub folder: Option<PathBuf>,

    /// Artifacts successfully moved out of the destination root.
    pub moved: Vec<PathBuf>,

    /// Artifacts that existed but could not be moved, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl ArchiveOutcome {
    fn empty() -> Self {
        ArchiveOutcome {
            folder: None,
            moved: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Archive every existing artifact of a prior run with this name.
///
/// Missing artifacts are silently skipped. The folder is only created when
/// at least one artifact exists; second-granularity timestamps name both
/// the folder and the file prefixes.
pub fn archive_previous_run(artifacts: &RunArtifacts) -> ArchiveOutcome {
    let existing: Vec<PathBuf> = artifacts
        .archivable()
        .into_iter()
        .filter(|p| p.exists())
        .collect();

    if existing.is_empty() {
        return ArchiveOutcome::empty();
    }

    let timestamp = Local::now().format("%Y%m%d%H%M%S").to_string();
    let folder = artifacts.destination().join(&timestamp);
    if let Err(e) = fs::create_dir_all(&folder) {
        let mut outcome = ArchiveOutcome::empty();
        outcome.failed = existing
            .into_iter()
            .map(|p| (p, format!("cannot create backup folder: {}", e)))
            .collect();
        return outcome;
    }

    let mut outcome = ArchiveOutcome {
        folder: Some(folder.clone()),
        moved: Vec::new(),
        failed: Vec::new(),
    };

    for path in existing {
        let target = archived_name(&folder, &timestamp, &path);
        match fs::rename(&path, &target) {
            Ok(()) => outcome.moved.push(target),
            Err(e) => outcome.failed.push((path, e.to_string())),
        }
    }

    outcome
}

fn archived_name(folder: &Path, timestamp: &str, original: &Path) -> PathBuf {
    let file_name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    folder.join(format!("{}.{}", timestamp, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact_set(dir: &Path) -> RunArtifacts {
        RunArtifacts::new(dir, "evidence")
    }

    #[test]
    fn test_archive_with_nothing_present_is_a_no_op() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let outcome = archive_previous_run(&artifact_set(temp_dir.path()));

        assert!(outcome.folder.is_none());
        assert!(outcome.moved.is_empty());
        assert!(outcome.failed.is_empty());
        // No stray folder either
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_archive_moves_all_existing_artifacts() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let artifacts = artifact_set(temp_dir.path());

        fs::write(artifacts.container_image(), b"image bytes").unwrap();
        fs::write(artifacts.narrative_log(), b"narrative").unwrap();
        fs::write(artifacts.transfer_log(), b"copied a, copied b").unwrap();
        fs::write(artifacts.error_log(), b"").unwrap();

        let outcome = archive_previous_run(&artifacts);
        let folder = outcome.folder.expect("Expected a backup folder");

        assert_eq!(outcome.moved.len(), 4);
        assert!(outcome.failed.is_empty());

        // Nothing with the original names remains in the destination root
        assert!(!artifacts.container_image().exists());
        assert!(!artifacts.narrative_log().exists());
        assert!(!artifacts.transfer_log().exists());
        assert!(!artifacts.error_log().exists());

        // Content survived the move byte for byte
        let ts = folder.file_name().unwrap().to_string_lossy().into_owned();
        let moved_image = folder.join(format!("{}.evidence.sparseimage", ts));
        assert_eq!(fs::read(&moved_image).unwrap(), b"image bytes");
        let moved_log = folder.join(format!("{}.evidence.log", ts));
        assert_eq!(fs::read(&moved_log).unwrap(), b"copied a, copied b");
    }

    #[test]
    fn test_archive_skips_missing_artifacts() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let artifacts = artifact_set(temp_dir.path());

        // Only the error log exists
        fs::write(artifacts.error_log(), b"perm denied: /x").unwrap();

        let outcome = archive_previous_run(&artifacts);
        assert!(outcome.folder.is_some());
        assert_eq!(outcome.moved.len(), 1);
        assert!(!artifacts.error_log().exists());
    }

    #[test]
    fn test_archive_timestamp_folder_shape() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let artifacts = artifact_set(temp_dir.path());
        fs::write(artifacts.narrative_log(), b"x").unwrap();

        let outcome = archive_previous_run(&artifacts);
        let folder = outcome.folder.expect("Expected a backup folder");
        let name = folder.file_name().unwrap().to_string_lossy().into_owned();

        assert_eq!(name.len(), 14, "expected YYYYMMDDHHMMSS, got {}", name);
        assert!(name.chars().all(|c| c.is_ascii_digit()));
    }
}
