//! Run supervisor.
//!
//! Sequences one acquisition: archive prior artifacts, resolve the target
//! (directly or through the assisted locator), provision the container,
//! transfer, finalize, summarize. Execution is strictly sequential and
//! single-threaded; every stage completes before the next begins.
//!
//! Container cleanup is a scoped acquisition: `ContainerGuard` is armed the
//! moment the attach succeeds and disarmed when the finalizer takes over, so
//! exactly one of {finalizer detach, guard detach} runs on every exit path —
//! normal completion, early return, or unwind.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use chrono::Local;
use uuid::Uuid;

use crate::artifacts::{NarrativeLog, RunArtifacts};
use crate::backup::{self, ArchiveOutcome};
use crate::container;
use crate::error::AcquireError;
use crate::locator;
use crate::model::{RemoteCredentials, RunConfig, RunState, RunSummary, TargetHandle};
use crate::prompt::InputProvider;
use crate::tools::HostTools;
use crate::transfer;

/// Operator-driven cancellation flag, checked at stage boundaries.
///
/// The stages themselves are blocking subprocess waits, so an interrupt
/// takes effect at the next boundary and unwinds through the container
/// guard.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Detaches the container on drop unless the finalizer has taken over.
struct ContainerGuard<'a> {
    tools: &'a dyn HostTools,
    volume: PathBuf,
    armed: bool,
}

impl<'a> ContainerGuard<'a> {
    fn new(tools: &'a dyn HostTools, volume: PathBuf) -> Self {
        ContainerGuard {
            tools,
            volume,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            // Best effort; the run is already unwinding
            let _ = self.tools.detach_container(&self.volume);
        }
    }
}

/// Execute one acquisition run end to end.
///
/// Returns the structured summary on success — including partial-transfer
/// success — or the fatal error that aborted the run. Transfer exit codes
/// never surface as errors here.
pub fn execute_run(
    config: &RunConfig,
    tools: &dyn HostTools,
    input: &mut dyn InputProvider,
    cancel: &CancelToken,
) -> Result<RunSummary, AcquireError> {
    if cancel.is_cancelled() {
        return Err(AcquireError::Cancelled);
    }

    let artifacts = RunArtifacts::new(&config.destination, &config.container_name);
    fs::create_dir_all(&config.destination).map_err(|e| AcquireError::ArtifactIo {
        path: config.destination.clone(),
        source: e,
    })?;

    // Archive before the new narrative log claims its name
    let archive = backup::archive_previous_run(&artifacts);

    let mut log = NarrativeLog::create(&artifacts.narrative_log(), true)?;
    let result = run_stages(config, tools, input, cancel, &artifacts, &archive, &mut log);
    if let Err(e) = &result {
        log.error("supervisor", &format!("run {}: {}", RunState::Aborted, e));
    }
    result
}

fn enter(log: &mut NarrativeLog, state: RunState) {
    log.line("supervisor", &format!("stage: {}", state));
}

fn run_stages(
    config: &RunConfig,
    tools: &dyn HostTools,
    input: &mut dyn InputProvider,
    cancel: &CancelToken,
    artifacts: &RunArtifacts,
    archive: &ArchiveOutcome,
    log: &mut NarrativeLog,
) -> Result<RunSummary, AcquireError> {
    let run_id = Uuid::new_v4();
    let started_at = Local::now();
    let mut notes: Vec<String> = Vec::new();

    enter(log, RunState::Init);
    log.line("init", &format!("run {} started", run_id));
    log.line("init", &format!("strategy: {}", config.strategy));

    enter(log, RunState::Backup);
    match &archive.folder {
        Some(folder) => log.line(
            "backup",
            &format!("archived {} prior artifact(s) into {}", archive.moved.len(), folder.display()),
        ),
        None if archive.failed.is_empty() => log.line("backup", "no prior artifacts to archive"),
        None => log.error("backup", "could not create backup folder"),
    }
    for (path, reason) in &archive.failed {
        let note = format!("archival of {} failed: {}", path.display(), reason);
        log.error("backup", &note);
        notes.push(note);
    }

    let target = resolve_target(config, tools, input, log)?;
    log.line("init", &format!("acquiring from {}", target.path.display()));

    if cancel.is_cancelled() {
        return Err(AcquireError::Cancelled);
    }

    enter(log, RunState::Provision);
    let handle = container::provision_container(tools, config.size_bytes, artifacts, &target, log)?;
    let mut guard = ContainerGuard::new(tools, handle.volume_path.clone());

    if cancel.is_cancelled() {
        log.error("supervisor", "cancelled after provisioning; detaching container");
        return Err(AcquireError::Cancelled);
    }

    enter(log, RunState::Transfer);
    let outcome = transfer::run_transfer(config.strategy, &target, &handle, artifacts, log)?;
    if let Some(spawn_error) = &outcome.spawn_error {
        notes.push(format!("transfer tool could not start: {}", spawn_error));
    } else if !outcome.clean() {
        notes.push(format!(
            "transfer exited with code {:?}; see {}",
            outcome.exit_code,
            artifacts.error_log().display()
        ));
    }

    // Finalizer owns the detach from here; the guard stands down
    enter(log, RunState::Finalize);
    guard.disarm();
    let finalized = container::finalize_container(tools, &handle, config.compute_hashes, log);
    if let Some(detach_error) = &finalized.detach_error {
        notes.push(format!("detach failed: {}", detach_error));
    }
    if let Some(digest_error) = &finalized.digest_error {
        notes.push(format!("digest computation failed: {}", digest_error));
    }

    let summary = RunSummary {
        run_id,
        started_at,
        finished_at: Local::now(),
        source: target.path.clone(),
        destination: config.destination.clone(),
        container_image: handle.image_path.clone(),
        container_volume: handle.volume_path.clone(),
        strategy: config.strategy,
        backup_folder: archive.folder.clone(),
        transfer_exit_code: outcome.exit_code,
        digests: finalized.digests,
        notes,
    };

    enter(log, RunState::Summary);
    log.line("summary", &format!("container: {}", summary.container_image.display()));
    log.line(
        "summary",
        &format!("transfer exit code: {:?}", summary.transfer_exit_code),
    );
    if let Some(digests) = &summary.digests {
        log.line("summary", &format!("md5: {}  sha256: {}", digests.md5, digests.sha256));
    }
    for note in &summary.notes {
        log.line("summary", &format!("note: {}", note));
    }
    log.line("summary", &format!("run {} finished", run_id));

    Ok(summary)
}

/// Resolve the Target Handle: pre-mounted path, or assisted discovery.
///
/// With no source and no `--assisted`, the operator is asked whether to
/// discover interactively; declining is a configuration error.
fn resolve_target(
    config: &RunConfig,
    tools: &dyn HostTools,
    input: &mut dyn InputProvider,
    log: &mut NarrativeLog,
) -> Result<TargetHandle, AcquireError> {
    if !config.assisted {
        if let Some(source) = &config.source {
            return Ok(TargetHandle {
                path: source.clone(),
            });
        }
        let discover = input
            .confirm("No target path given. Discover and mount a remote share? [y/N] ")
            .map_err(|e| AcquireError::PromptFailed { source: e })?;
        if !discover {
            return Err(AcquireError::MissingTarget);
        }
    }

    enter(log, RunState::LocateTarget);
    let creds = resolve_credentials(config, input)?;
    let mount_point = env::temp_dir().join(format!(
        "acquire-{}",
        locator::escape_component(&creds.host)
    ));
    locator::locate_target(tools, &creds, &mount_point, log)
}

fn resolve_credentials(
    config: &RunConfig,
    input: &mut dyn InputProvider,
) -> Result<RemoteCredentials, AcquireError> {
    let host = required_field(config.remote_host.as_deref(), "Remote computer name: ", "computer name", input)?;
    let user = required_field(config.remote_user.as_deref(), "Username: ", "username", input)?;

    let password = if config.no_password {
        None
    } else if let Some(password) = &config.remote_password {
        Some(password.clone())
    } else {
        let entered = input
            .secret("Password: ")
            .map_err(|e| AcquireError::PromptFailed { source: e })?;
        Some(entered)
    };

    Ok(RemoteCredentials {
        host,
        user,
        password,
    })
}

fn required_field(
    configured: Option<&str>,
    prompt: &str,
    field: &'static str,
    input: &mut dyn InputProvider,
) -> Result<String, AcquireError> {
    let value = match configured {
        Some(value) => value.to_string(),
        None => input
            .line(prompt)
            .map_err(|e| AcquireError::PromptFailed { source: e })?,
    };
    let value = value.trim().to_string();
    if value.is_empty() {
        Err(AcquireError::MissingCredential { field })
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransferStrategy;
    use crate::prompt::ScriptedInput;
    use std::cell::{Cell, RefCell};
    use std::path::Path;

    /// Scripted HostTools double recording every call.
    struct FakeTools {
        listing: Option<String>,
        attach_output: Option<String>,
        image_payload: Vec<u8>,
        fail_detach: bool,
        mount_seed: Option<(String, Vec<u8>)>,
        cancel_on_attach: Option<CancelToken>,
        calls: RefCell<Vec<&'static str>>,
        detach_count: Cell<usize>,
    }

    impl FakeTools {
        fn new(attach_output: Option<String>) -> Self {
            FakeTools {
                listing: None,
                attach_output,
                image_payload: b"sparse image bytes".to_vec(),
                fail_detach: false,
                mount_seed: None,
                cancel_on_attach: None,
                calls: RefCell::new(Vec::new()),
                detach_count: Cell::new(0),
            }
        }

        fn called(&self, name: &str) -> bool {
            self.calls.borrow().iter().any(|c| *c == name)
        }
    }

    impl HostTools for FakeTools {
        fn list_shares(&self, creds: &RemoteCredentials) -> Result<String, AcquireError> {
            self.calls.borrow_mut().push("list_shares");
            match &self.listing {
                Some(listing) => Ok(listing.clone()),
                None => Err(AcquireError::TargetUnreachable {
                    host: creds.host.clone(),
                    detail: "connection refused".to_string(),
                }),
            }
        }

        fn mount_read_only(
            &self,
            _creds: &RemoteCredentials,
            _share: &str,
            mount_point: &Path,
        ) -> Result<(), AcquireError> {
            self.calls.borrow_mut().push("mount_read_only");
            if let Some((name, content)) = &self.mount_seed {
                fs::write(mount_point.join(name), content).unwrap();
            }
            Ok(())
        }

        fn create_container(
            &self,
            image_path: &Path,
            _size_bytes: u64,
            _volume_name: &str,
        ) -> Result<(), AcquireError> {
            self.calls.borrow_mut().push("create_container");
            fs::write(image_path, &self.image_payload).unwrap();
            Ok(())
        }

        fn attach_container(&self, image_path: &Path) -> Result<String, AcquireError> {
            self.calls.borrow_mut().push("attach_container");
            if let Some(token) = &self.cancel_on_attach {
                token.cancel();
            }
            match &self.attach_output {
                Some(output) => Ok(output.clone()),
                None => Err(AcquireError::ContainerAttachFailed {
                    path: image_path.to_path_buf(),
                    detail: "attach refused".to_string(),
                }),
            }
        }

        fn detach_container(&self, volume_path: &Path) -> Result<(), AcquireError> {
            self.calls.borrow_mut().push("detach_container");
            self.detach_count.set(self.detach_count.get() + 1);
            if self.fail_detach {
                Err(AcquireError::DetachFailed {
                    volume: volume_path.to_path_buf(),
                    detail: "resource busy".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn used_capacity(&self, _path: &Path) -> Result<u64, AcquireError> {
            self.calls.borrow_mut().push("used_capacity");
            Ok(40_000_000_000)
        }
    }

    fn base_config(source: Option<PathBuf>, destination: PathBuf) -> RunConfig {
        RunConfig {
            source,
            destination,
            container_name: "evidence".to_string(),
            size_bytes: None,
            strategy: TransferStrategy::Copy,
            compute_hashes: false,
            assisted: false,
            remote_host: None,
            remote_user: None,
            remote_password: None,
            no_password: false,
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        src: PathBuf,
        dest: PathBuf,
        volume: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        let volume = temp.path().join("volume");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&volume).unwrap();
        fs::write(src.join("note.txt"), b"payload").unwrap();
        Fixture {
            _temp: temp,
            src,
            dest,
            volume,
        }
    }

    fn attach_line(volume: &Path) -> Option<String> {
        Some(format!("{}\n", volume.display()))
    }

    #[test]
    fn test_premounted_run_reaches_summary() {
        let fx = fixture();
        let tools = FakeTools::new(attach_line(&fx.volume));
        let mut config = base_config(Some(fx.src.clone()), fx.dest.clone());
        config.compute_hashes = true;
        let mut input = ScriptedInput::default();

        let summary =
            execute_run(&config, &tools, &mut input, &CancelToken::new()).expect("run failed");

        assert_eq!(summary.transfer_exit_code, Some(0));
        assert!(summary.transfer_clean());
        assert_eq!(summary.destination, fx.dest);
        assert_eq!(summary.source, fx.src);
        assert!(summary.backup_folder.is_none());

        // Copied contents landed at the volume root
        assert_eq!(fs::read(fx.volume.join("note.txt")).unwrap(), b"payload");

        // Size was derived because none was requested
        assert!(tools.called("used_capacity"));

        // Exactly one detach, performed by the finalizer
        assert_eq!(tools.detach_count.get(), 1);

        // Digests cover the container file the double wrote
        let digests = summary.digests.expect("expected digests");
        let again = crate::checksums::compute_container_digests(&summary.container_image).unwrap();
        assert_eq!(digests, again);

        // The narrative transcript tells the whole story
        let narrative =
            fs::read_to_string(fx.dest.join("evidence.out")).expect("missing narrative log");
        assert!(narrative.contains("[init]"));
        assert!(narrative.contains("[provision]"));
        assert!(narrative.contains("[transfer]"));
        assert!(narrative.contains("[finalize]"));
        assert!(narrative.contains("[summary]"));
    }

    #[test]
    fn test_explicit_size_skips_capacity_probe() {
        let fx = fixture();
        let tools = FakeTools::new(attach_line(&fx.volume));
        let mut config = base_config(Some(fx.src.clone()), fx.dest.clone());
        config.size_bytes = Some(10_000_000_000);
        let mut input = ScriptedInput::default();

        execute_run(&config, &tools, &mut input, &CancelToken::new()).expect("run failed");
        assert!(!tools.called("used_capacity"));
    }

    #[test]
    fn test_prior_artifacts_archived_before_run() {
        let fx = fixture();
        fs::create_dir_all(&fx.dest).unwrap();
        fs::write(fx.dest.join("evidence.out"), b"old narrative").unwrap();
        fs::write(fx.dest.join("evidence.sparseimage"), b"old image").unwrap();

        let tools = FakeTools::new(attach_line(&fx.volume));
        let config = base_config(Some(fx.src.clone()), fx.dest.clone());
        let mut input = ScriptedInput::default();

        let summary =
            execute_run(&config, &tools, &mut input, &CancelToken::new()).expect("run failed");

        let folder = summary.backup_folder.expect("expected a backup folder");
        assert!(folder.starts_with(&fx.dest));

        // Old artifacts moved, new narrative is fresh
        let narrative = fs::read_to_string(fx.dest.join("evidence.out")).unwrap();
        assert!(!narrative.contains("old narrative"));
        let ts = folder.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(
            fs::read(folder.join(format!("{}.evidence.sparseimage", ts))).unwrap(),
            b"old image"
        );
    }

    #[test]
    fn test_locator_failure_is_fatal_before_any_container() {
        let fx = fixture();
        let mut tools = FakeTools::new(attach_line(&fx.volume));
        tools.listing = None;
        let mut config = base_config(None, fx.dest.clone());
        config.assisted = true;
        config.remote_host = Some("lab-mac".to_string());
        config.remote_user = Some("examiner".to_string());
        config.remote_password = Some("wrong".to_string());
        let mut input = ScriptedInput::default();

        let result = execute_run(&config, &tools, &mut input, &CancelToken::new());
        assert!(matches!(result, Err(AcquireError::TargetUnreachable { .. })));
        assert!(!tools.called("create_container"));
        assert_eq!(tools.detach_count.get(), 0);
        assert!(!fx.dest.join("evidence.sparseimage").exists());
    }

    #[test]
    fn test_ambiguous_shares_are_fatal() {
        let fx = fixture();
        let mut tools = FakeTools::new(attach_line(&fx.volume));
        tools.listing = Some("Data  Disk\nMedia  Disk\n".to_string());
        let mut config = base_config(None, fx.dest.clone());
        config.assisted = true;
        config.remote_host = Some("lab-mac".to_string());
        config.remote_user = Some("examiner".to_string());
        config.no_password = true;

        let result = execute_run(&config, &tools, &mut ScriptedInput::default(), &CancelToken::new());
        assert!(matches!(result, Err(AcquireError::AmbiguousShares { .. })));
        assert!(!tools.called("mount_read_only"));
    }

    #[test]
    fn test_assisted_run_prompts_for_credentials() {
        let fx = fixture();
        let mut tools = FakeTools::new(attach_line(&fx.volume));
        tools.listing = Some("Data  Disk\n".to_string());
        tools.mount_seed = Some(("shared.txt".to_string(), b"from the share".to_vec()));
        let mut config = base_config(None, fx.dest.clone());
        config.assisted = true;

        // Unique host keeps the derived mount point test-local
        let host = format!("lab-{}", Uuid::new_v4());
        let mut input = ScriptedInput::new([host.as_str(), "examiner", "hunter2"]);

        let summary =
            execute_run(&config, &tools, &mut input, &CancelToken::new()).expect("run failed");

        assert!(tools.called("list_shares"));
        assert!(tools.called("mount_read_only"));
        assert_eq!(summary.transfer_exit_code, Some(0));
        assert_eq!(
            fs::read(fx.volume.join("shared.txt")).unwrap(),
            b"from the share"
        );
    }

    #[test]
    fn test_missing_target_and_declined_discovery() {
        let fx = fixture();
        let tools = FakeTools::new(attach_line(&fx.volume));
        let config = base_config(None, fx.dest.clone());
        let mut input = ScriptedInput::new(["n"]);

        let result = execute_run(&config, &tools, &mut input, &CancelToken::new());
        assert!(matches!(result, Err(AcquireError::MissingTarget)));
        assert!(!tools.called("create_container"));
    }

    #[test]
    fn test_attach_failure_aborts_without_detach() {
        let fx = fixture();
        let tools = FakeTools::new(None);
        let config = base_config(Some(fx.src.clone()), fx.dest.clone());

        let result =
            execute_run(&config, &tools, &mut ScriptedInput::default(), &CancelToken::new());
        assert!(matches!(result, Err(AcquireError::ContainerAttachFailed { .. })));
        // Never attached, so nothing to detach
        assert_eq!(tools.detach_count.get(), 0);
    }

    #[test]
    fn test_failed_transfer_still_reaches_summary() {
        let fx = fixture();
        let tools = FakeTools::new(attach_line(&fx.volume));
        // Source path does not exist, so the copy tool fails
        let config = base_config(Some(fx.src.join("vanished")), fx.dest.clone());

        let summary =
            execute_run(&config, &tools, &mut ScriptedInput::default(), &CancelToken::new())
                .expect("partial transfer must not abort the run");

        assert_ne!(summary.transfer_exit_code, Some(0));
        assert!(!summary.notes.is_empty());
        assert_eq!(tools.detach_count.get(), 1);

        let errors = fs::read_to_string(fx.dest.join("evidence.err")).unwrap();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_detach_failure_is_a_note_not_an_error() {
        let fx = fixture();
        let mut tools = FakeTools::new(attach_line(&fx.volume));
        tools.fail_detach = true;
        let config = base_config(Some(fx.src.clone()), fx.dest.clone());

        let summary =
            execute_run(&config, &tools, &mut ScriptedInput::default(), &CancelToken::new())
                .expect("detach failure must not abort the run");

        assert!(summary.notes.iter().any(|n| n.contains("detach failed")));
        // Finalizer attempted once; the disarmed guard never fired a second
        assert_eq!(tools.detach_count.get(), 1);
    }

    #[test]
    fn test_cancel_before_start() {
        let fx = fixture();
        let tools = FakeTools::new(attach_line(&fx.volume));
        let config = base_config(Some(fx.src.clone()), fx.dest.clone());
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = execute_run(&config, &tools, &mut ScriptedInput::default(), &cancel);
        assert!(matches!(result, Err(AcquireError::Cancelled)));
        assert!(tools.calls.borrow().is_empty());
    }

    #[test]
    fn test_cancel_after_attach_fires_the_guard() {
        let fx = fixture();
        let cancel = CancelToken::new();
        let mut tools = FakeTools::new(attach_line(&fx.volume));
        tools.cancel_on_attach = Some(cancel.clone());
        let config = base_config(Some(fx.src.clone()), fx.dest.clone());

        let result = execute_run(&config, &tools, &mut ScriptedInput::default(), &cancel);
        assert!(matches!(result, Err(AcquireError::Cancelled)));
        // The armed guard detached the container exactly once
        assert_eq!(tools.detach_count.get(), 1);
    }

    #[test]
    fn test_blank_prompted_credential_is_fatal() {
        let fx = fixture();
        let tools = FakeTools::new(attach_line(&fx.volume));
        let mut config = base_config(None, fx.dest.clone());
        config.assisted = true;
        let mut input = ScriptedInput::new(["  ", "examiner", "pw"]);

        let result = execute_run(&config, &tools, &mut input, &CancelToken::new());
        assert!(matches!(
            result,
            Err(AcquireError::MissingCredential { field: "computer name" })
        ));
    }
}
