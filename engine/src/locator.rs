//! Target locator for assisted mode.
//!
//! Given a remote computer's display name and credentials, discover its
//! advertised shares, insist on exactly one share of type Disk, and mount it
//! strictly read-only. Read-only mounting is a correctness invariant of the
//! whole system, not an option: the source must never be mutated.
//!
//! The share listing is tool output and therefore text; the parser here is
//! strict — zero matches and multiple matches are distinct fatal errors,
//! never "take the first line".

use std::fs;
use std::path::Path;

use crate::artifacts::NarrativeLog;
use crate::error::AcquireError;
use crate::model::{RemoteCredentials, TargetHandle};
use crate::tools::HostTools;

/// Percent-encode a name component for use in a service-discovery address.
///
/// Display names routinely contain spaces; anything outside the unreserved
/// set is encoded so the address parses unambiguously.
pub fn escape_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Address used to query the remote computer's share listing.
pub fn discovery_address(creds: &RemoteCredentials) -> String {
    match &creds.password {
        Some(password) => format!(
            "//{}:{}@{}",
            escape_component(&creds.user),
            escape_component(password),
            escape_component(&creds.host)
        ),
        None => format!(
            "//{}@{}",
            escape_component(&creds.user),
            escape_component(&creds.host)
        ),
    }
}

/// Mountable URL for one discovered share.
pub fn share_url(creds: &RemoteCredentials, share: &str) -> String {
    format!("{}/{}", discovery_address(creds), escape_component(share))
}

/// Extract the names of shares advertised with type `Disk`.
///
/// Listing lines look like `<name>  <type>  <comment>`; share names may
/// themselves contain spaces, so the name is everything before the `Disk`
/// type token.
pub fn parse_disk_shares(listing: &str) -> Vec<String> {
    let mut shares = Vec::new();
    for line in listing.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if let Some(pos) = tokens.iter().position(|t| *t == "Disk") {
            if pos > 0 {
                shares.push(tokens[..pos].join(" "));
            }
        }
    }
    shares
}

/// Discover and read-only mount the remote computer's single Disk share.
///
/// # Errors
/// - `TargetUnreachable` / `AuthenticationFailed` when the listing query
///   fails
/// - `NoShareFound` / `AmbiguousShares` when the listing does not name
///   exactly one Disk share
/// - `MountFailed` when the mount point cannot be created or the mount
///   itself fails
///
/// None of these are retried; the operator re-runs after fixing the cause.
pub fn locate_target(
    tools: &dyn HostTools,
    creds: &RemoteCredentials,
    mount_point: &Path,
    log: &mut NarrativeLog,
) -> Result<TargetHandle, AcquireError> {
    log.line("locate", &format!("querying shares on '{}'", creds.host));
    let listing = tools.list_shares(creds)?;

    let shares = parse_disk_shares(&listing);
    let share = match shares.as_slice() {
        [] => {
            return Err(AcquireError::NoShareFound {
                host: creds.host.clone(),
            })
        }
        [only] => only.clone(),
        _ => {
            return Err(AcquireError::AmbiguousShares {
                host: creds.host.clone(),
                shares,
            })
        }
    };
    log.line("locate", &format!("found Disk share '{}'", share));

    fs::create_dir_all(mount_point).map_err(|e| AcquireError::MountFailed {
        share: share.clone(),
        mount_point: mount_point.to_path_buf(),
        detail: format!("cannot create mount point: {}", e),
    })?;

    tools.mount_read_only(creds, &share, mount_point)?;
    log.line(
        "locate",
        &format!("mounted '{}' read-only at {}", share, mount_point.display()),
    );

    Ok(TargetHandle {
        path: mount_point.to_path_buf(),
    })
}
