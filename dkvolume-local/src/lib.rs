//! dkvolume-local: a directory-backed volume plugin.
//!
//! Each volume is a directory under the storage root the server injects into
//! every request. Mounting hands out the directory itself and keeps a
//! per-volume mount count so a volume in use cannot be removed.

pub mod error;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dkvolume::{VolumeDriver, VolumeRequest, VolumeResponse};
use tracing::{debug, info};

pub use error::{Error, Result};

/// Volume driver that stores each volume as a plain directory.
#[derive(Debug, Default)]
pub struct LocalDriver {
    /// Active mount count per volume directory.
    mounts: Mutex<HashMap<PathBuf, usize>>,
}

impl LocalDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active mounts of the volume at `path`.
    pub fn mount_count(&self, path: &Path) -> usize {
        self.lock_mounts().get(path).copied().unwrap_or(0)
    }

    fn lock_mounts(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, usize>> {
        self.mounts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create_volume(&self, req: &VolumeRequest) -> Result<PathBuf> {
        let path = volume_dir(req)?;
        fs::create_dir_all(&path).map_err(Error::io(&req.name))?;
        info!(volume = %req.name, path = %path.display(), "created volume");
        Ok(path)
    }

    fn remove_volume(&self, req: &VolumeRequest) -> Result<()> {
        let path = existing_volume_dir(req)?;
        let mut mounts = self.lock_mounts();
        if let Some(&count) = mounts.get(&path) {
            return Err(Error::VolumeBusy {
                name: req.name.clone(),
                mounts: count,
            });
        }
        fs::remove_dir_all(&path).map_err(Error::io(&req.name))?;
        mounts.remove(&path);
        info!(volume = %req.name, "removed volume");
        Ok(())
    }

    fn mount_volume(&self, req: &VolumeRequest) -> Result<PathBuf> {
        let path = existing_volume_dir(req)?;
        let mut mounts = self.lock_mounts();
        let count = mounts.entry(path.clone()).or_insert(0);
        *count += 1;
        debug!(volume = %req.name, mounts = *count, "mounted volume");
        Ok(path)
    }

    fn umount_volume(&self, req: &VolumeRequest) -> Result<()> {
        let path = volume_dir(req)?;
        let mut mounts = self.lock_mounts();
        match mounts.get_mut(&path) {
            Some(count) if *count > 1 => {
                *count -= 1;
                debug!(volume = %req.name, mounts = *count, "unmounted volume");
            }
            Some(_) => {
                mounts.remove(&path);
                debug!(volume = %req.name, mounts = 0, "unmounted volume");
            }
            None => return Err(Error::NotMounted(req.name.clone())),
        }
        Ok(())
    }
}

fn volume_dir(req: &VolumeRequest) -> Result<PathBuf> {
    if req.root.is_empty() {
        return Err(Error::MissingRoot);
    }
    let name = req.name.as_str();
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(Path::new(&req.root).join(name))
}

fn existing_volume_dir(req: &VolumeRequest) -> Result<PathBuf> {
    let path = volume_dir(req)?;
    if !path.is_dir() {
        return Err(Error::VolumeNotFound(req.name.clone()));
    }
    Ok(path)
}

fn mountpoint(result: Result<PathBuf>) -> VolumeResponse {
    match result {
        Ok(path) => VolumeResponse::mountpoint(path.display().to_string()),
        Err(e) => VolumeResponse::error(e),
    }
}

fn outcome(result: Result<()>) -> VolumeResponse {
    match result {
        Ok(()) => VolumeResponse::ok(),
        Err(e) => VolumeResponse::error(e),
    }
}

impl VolumeDriver for LocalDriver {
    fn create(&self, req: VolumeRequest) -> VolumeResponse {
        outcome(self.create_volume(&req).map(|_| ()))
    }

    fn remove(&self, req: VolumeRequest) -> VolumeResponse {
        outcome(self.remove_volume(&req))
    }

    fn path(&self, req: VolumeRequest) -> VolumeResponse {
        mountpoint(existing_volume_dir(&req))
    }

    fn mount(&self, req: VolumeRequest) -> VolumeResponse {
        mountpoint(self.mount_volume(&req))
    }

    fn umount(&self, req: VolumeRequest) -> VolumeResponse {
        outcome(self.umount_volume(&req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        driver: LocalDriver,
        root: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                driver: LocalDriver::new(),
                root: TempDir::new().expect("failed to create temp dir"),
            }
        }

        fn request(&self, name: &str) -> VolumeRequest {
            VolumeRequest {
                root: self.root.path().display().to_string(),
                name: name.to_string(),
            }
        }

        fn volume_path(&self, name: &str) -> PathBuf {
            self.root.path().join(name)
        }
    }

    #[test]
    fn create_makes_directory() {
        let f = Fixture::new();
        let res = f.driver.create(f.request("v1"));
        assert!(!res.is_error(), "{res:?}");
        assert!(f.volume_path("v1").is_dir());
    }

    #[test]
    fn create_is_idempotent() {
        let f = Fixture::new();
        assert!(!f.driver.create(f.request("v1")).is_error());
        assert!(!f.driver.create(f.request("v1")).is_error());
    }

    #[test]
    fn path_reports_directory() {
        let f = Fixture::new();
        f.driver.create(f.request("v1"));

        let res = f.driver.path(f.request("v1"));
        assert_eq!(res.mountpoint, f.volume_path("v1").display().to_string());
        assert!(!res.is_error());
    }

    #[test]
    fn path_of_missing_volume_fails() {
        let f = Fixture::new();
        let res = f.driver.path(f.request("ghost"));
        assert!(res.is_error());
        assert_eq!(res.err.as_deref(), Some("volume not found: ghost"));
    }

    #[test]
    fn mounted_volume_is_busy() {
        let f = Fixture::new();
        f.driver.create(f.request("v1"));

        let res = f.driver.mount(f.request("v1"));
        assert_eq!(res.mountpoint, f.volume_path("v1").display().to_string());
        f.driver.mount(f.request("v1"));
        assert_eq!(f.driver.mount_count(&f.volume_path("v1")), 2);

        let res = f.driver.remove(f.request("v1"));
        assert!(res.is_error());
        assert!(res.err.unwrap().starts_with("volume busy"));
        assert!(f.volume_path("v1").is_dir());

        assert!(!f.driver.umount(f.request("v1")).is_error());
        assert!(!f.driver.umount(f.request("v1")).is_error());
        assert_eq!(f.driver.mount_count(&f.volume_path("v1")), 0);

        assert!(!f.driver.remove(f.request("v1")).is_error());
        assert!(!f.volume_path("v1").exists());
    }

    #[test]
    fn umount_without_mount_fails() {
        let f = Fixture::new();
        f.driver.create(f.request("v1"));
        let res = f.driver.umount(f.request("v1"));
        assert_eq!(res.err.as_deref(), Some("volume not mounted: v1"));
    }

    #[test]
    fn mount_of_missing_volume_fails() {
        let f = Fixture::new();
        assert!(f.driver.mount(f.request("ghost")).is_error());
        assert_eq!(f.driver.mount_count(&f.volume_path("ghost")), 0);
    }

    #[test]
    fn names_cannot_escape_root() {
        let f = Fixture::new();
        for name in ["", ".", "..", "../etc", "a/b"] {
            let res = f.driver.create(f.request(name));
            assert!(res.is_error(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn missing_root_is_rejected() {
        let driver = LocalDriver::new();
        let res = driver.create(VolumeRequest::new("v1"));
        assert_eq!(res.err.as_deref(), Some("request has no storage root"));
    }
}
