//! Host tool seam.
//!
//! Every native primitive the run depends on — share discovery, read-only
//! network mount, sparse container create/attach/detach, used-capacity
//! probing — is a blocking external call behind the `HostTools` trait.
//! `SystemTools` is the production implementation shelling out to the host's
//! own tooling; tests script the trait instead, so the supervisor's
//! sequencing is exercised without host privileges.

use std::io;
use std::path::Path;
use std::process::{Command, Output};

use crate::error::AcquireError;
use crate::locator;
use crate::model::RemoteCredentials;

/// Blocking external primitives consumed by an acquisition run.
///
/// Each method either returns the tool's textual result or a well-defined
/// failure; none of them are retried automatically.
pub trait HostTools {
    /// List shares advertised by the remote computer. Returns the raw
    /// listing text; the locator owns parsing it.
    fn list_shares(&self, creds: &RemoteCredentials) -> Result<String, AcquireError>;

    /// Mount `share` from the remote computer at `mount_point`, strictly
    /// read-only.
    fn mount_read_only(
        &self,
        creds: &RemoteCredentials,
        share: &str,
        mount_point: &Path,
    ) -> Result<(), AcquireError>;

    /// Create a single-volume, sparse container of `size_bytes` at
    /// `image_path`, with `volume_name` as its volume label.
    fn create_container(
        &self,
        image_path: &Path,
        size_bytes: u64,
        volume_name: &str,
    ) -> Result<(), AcquireError>;

    /// Attach the container and return the attach tool's raw output; the
    /// provisioner parses the assigned volume path out of it.
    fn attach_container(&self, image_path: &Path) -> Result<String, AcquireError>;

    /// Detach the container volume.
    fn detach_container(&self, volume_path: &Path) -> Result<(), AcquireError>;

    /// Measure the used capacity of the filesystem holding `path`, in bytes.
    fn used_capacity(&self, path: &Path) -> Result<u64, AcquireError>;
}

/// Production `HostTools` backed by the host's native commands:
/// `smbutil` for discovery, `mount_smbfs` for the read-only mount,
/// `hdiutil` for the container lifecycle, `df` for capacity.
#[derive(Debug, Default)]
pub struct SystemTools;

impl SystemTools {
    pub fn new() -> Self {
        SystemTools
    }
}

fn run_tool(program: &str, args: &[&str]) -> io::Result<Output> {
    Command::new(program).args(args).output()
}

fn stderr_text(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if text.is_empty() {
        format!("exit status {}", output.status)
    } else {
        text
    }
}

impl HostTools for SystemTools {
    fn list_shares(&self, creds: &RemoteCredentials) -> Result<String, AcquireError> {
        let address = locator::discovery_address(creds);
        let output = if creds.password.is_some() {
            run_tool("smbutil", &["view", &address])
        } else {
            run_tool("smbutil", &["view", "-N", &address])
        }
        .map_err(|e| AcquireError::TargetUnreachable {
            host: creds.host.clone(),
            detail: e.to_string(),
        })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let detail = stderr_text(&output);
        if detail.to_lowercase().contains("auth") {
            Err(AcquireError::AuthenticationFailed {
                host: creds.host.clone(),
                detail,
            })
        } else {
            Err(AcquireError::TargetUnreachable {
                host: creds.host.clone(),
                detail,
            })
        }
    }

    fn mount_read_only(
        &self,
        creds: &RemoteCredentials,
        share: &str,
        mount_point: &Path,
    ) -> Result<(), AcquireError> {
        let url = locator::share_url(creds, share);
        let mount_str = mount_point.to_string_lossy();
        let output = run_tool("mount_smbfs", &["-o", "rdonly", &url, &mount_str]).map_err(|e| {
            AcquireError::MountFailed {
                share: share.to_string(),
                mount_point: mount_point.to_path_buf(),
                detail: e.to_string(),
            }
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(AcquireError::MountFailed {
                share: share.to_string(),
                mount_point: mount_point.to_path_buf(),
                detail: stderr_text(&output),
            })
        }
    }

    fn create_container(
        &self,
        image_path: &Path,
        size_bytes: u64,
        volume_name: &str,
    ) -> Result<(), AcquireError> {
        let size = format!("{}b", size_bytes);
        let image_str = image_path.to_string_lossy();
        let output = run_tool(
            "hdiutil",
            &[
                "create", "-size", &size, "-type", "SPARSE", "-fs", "APFS", "-volname",
                volume_name, &image_str,
            ],
        )
        .map_err(|e| AcquireError::ContainerCreateFailed {
            path: image_path.to_path_buf(),
            detail: e.to_string(),
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(AcquireError::ContainerCreateFailed {
                path: image_path.to_path_buf(),
                detail: stderr_text(&output),
            })
        }
    }

    fn attach_container(&self, image_path: &Path) -> Result<String, AcquireError> {
        let image_str = image_path.to_string_lossy();
        let output = run_tool("hdiutil", &["attach", &image_str]).map_err(|e| {
            AcquireError::ContainerAttachFailed {
                path: image_path.to_path_buf(),
                detail: e.to_string(),
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(AcquireError::ContainerAttachFailed {
                path: image_path.to_path_buf(),
                detail: stderr_text(&output),
            })
        }
    }

    fn detach_container(&self, volume_path: &Path) -> Result<(), AcquireError> {
        let volume_str = volume_path.to_string_lossy();
        let output = run_tool("hdiutil", &["detach", &volume_str]).map_err(|e| {
            AcquireError::DetachFailed {
                volume: volume_path.to_path_buf(),
                detail: e.to_string(),
            }
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(AcquireError::DetachFailed {
                volume: volume_path.to_path_buf(),
                detail: stderr_text(&output),
            })
        }
    }

    fn used_capacity(&self, path: &Path) -> Result<u64, AcquireError> {
        let path_str = path.to_string_lossy();
        let output =
            run_tool("df", &["-k", &path_str]).map_err(|e| AcquireError::CapacityProbeFailed {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(AcquireError::CapacityProbeFailed {
                path: path.to_path_buf(),
                detail: stderr_text(&output),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        parse_df_used(&text).ok_or_else(|| AcquireError::CapacityProbeFailed {
            path: path.to_path_buf(),
            detail: format!("unrecognized df output: {:?}", text.trim()),
        })
    }
}

/// Extract the used-capacity column (bytes) from `df -k` output.
///
/// Strict parse of the last data line: the Used column is the third field
/// and must be numeric, in 1 KiB blocks.
pub(crate) fn parse_df_used(output: &str) -> Option<u64> {
    let line = output.lines().filter(|l| !l.trim().is_empty()).last()?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }
    let used_kib: u64 = fields[2].parse().ok()?;
    Some(used_kib * 1024)
}
