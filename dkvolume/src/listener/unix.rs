//! Unix domain socket provisioning.

use std::fs::{self, DirBuilder, Permissions};
use std::os::unix::fs::{DirBuilderExt, FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use nix::unistd::{Gid, Group, chown};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use super::{Provisioned, bind_error};
use crate::error::{Error, Result};

/// Owner and group read/write, no world access.
const SOCKET_MODE: u32 = 0o660;

/// Private directory the socket is bound in before it is moved into place.
const STAGING_MODE: u32 = 0o700;

const STAGED_SOCKET: &str = "sock";

/// Execute a cleanup operation, logging any errors without failing.
///
/// Cleanup failures must not mask the error that triggered the cleanup.
fn log_cleanup_error<F, E>(operation: &str, f: F)
where
    F: FnOnce() -> std::result::Result<(), E>,
    E: std::fmt::Display,
{
    if let Err(e) = f() {
        warn!(operation, error = %e, "cleanup failed");
    }
}

pub(super) async fn provision_unix(address: &str, group: Option<&str>) -> Result<Provisioned> {
    let path = Path::new(address);
    remove_stale_socket(path).await?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let staging = create_staging_dir(parent)?;
    let result = bind_restricted(&staging, address, group).and_then(|listener| {
        fs::rename(staging.join(STAGED_SOCKET), path).map_err(|e| {
            Error::permission(path, format!("failed to move socket into place: {e}"))
        })?;
        Ok(listener)
    });
    log_cleanup_error("remove staging directory", || fs::remove_dir_all(&staging));

    Ok(Provisioned::Unix(result?, path.to_path_buf()))
}

/// Create a directory only the server's user can enter, next to the
/// socket's final location.
///
/// The socket is bound here with whatever mode the umask yields; nobody
/// else can reach it until it has its final group and mode.
fn create_staging_dir(parent: &Path) -> Result<PathBuf> {
    static NEXT: AtomicUsize = AtomicUsize::new(0);

    let id = NEXT.fetch_add(1, Ordering::Relaxed);
    let staging = parent.join(format!(".dkvolume-{}-{id}", std::process::id()));
    if fs::symlink_metadata(&staging).is_ok() {
        debug!(path = %staging.display(), "removing leftover staging directory");
        fs::remove_dir_all(&staging)?;
    }
    DirBuilder::new().mode(STAGING_MODE).create(&staging)?;
    Ok(staging)
}

fn bind_restricted(staging: &Path, address: &str, group: Option<&str>) -> Result<UnixListener> {
    let staged = staging.join(STAGED_SOCKET);
    let listener = UnixListener::bind(&staged).map_err(|e| bind_error(address, e))?;
    restrict_access(&staged, group)?;
    Ok(listener)
}

/// Remove a socket file left behind by a previous process.
///
/// A socket that still accepts connections belongs to a live server and is
/// left alone.
async fn remove_stale_socket(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if metadata.file_type().is_socket() && UnixStream::connect(path).await.is_ok() {
        return Err(Error::AddressInUse {
            address: path.display().to_string(),
        });
    }

    debug!(path = %path.display(), "removing stale socket file");
    fs::remove_file(path)?;
    Ok(())
}

fn restrict_access(path: &Path, group: Option<&str>) -> Result<()> {
    if let Some(group) = group {
        let gid = resolve_group(path, group)?;
        chown(path, None, Some(gid)).map_err(|e| {
            Error::permission(path, format!("failed to set group {group}: {e}"))
        })?;
    }

    fs::set_permissions(path, Permissions::from_mode(SOCKET_MODE))
        .map_err(|e| Error::permission(path, format!("failed to set mode: {e}")))
}

/// Resolve a group name or numeric gid through the host group database.
///
/// A numeric gid with no database entry is used as is.
fn resolve_group(path: &Path, group: &str) -> Result<Gid> {
    let lookup_failed =
        |e: nix::Error| Error::permission(path, format!("group lookup for {group} failed: {e}"));

    if let Some(entry) = Group::from_name(group).map_err(lookup_failed)? {
        return Ok(entry.gid);
    }

    let Ok(raw) = group.parse::<u32>() else {
        return Err(Error::GroupNotFound {
            group: group.to_string(),
        });
    };
    let gid = Gid::from_raw(raw);
    if Group::from_gid(gid).map_err(lookup_failed)?.is_none() {
        warn!(gid = raw, "gid not found in group database, using it as is");
    }
    Ok(gid)
}
