//! The volume driver capability set.
//!
//! The router forwards each decoded request to one of these operations and
//! relays the result. What the operations actually do is up to the
//! implementer.

use crate::types::{Action, VolumeRequest, VolumeResponse};

/// Volume management operations served by a plugin.
///
/// Calls are synchronous. The router runs them on Tokio's blocking pool, so
/// an implementation is free to do blocking I/O.
pub trait VolumeDriver: Send + Sync + 'static {
    /// Create a volume.
    fn create(&self, req: VolumeRequest) -> VolumeResponse;

    /// Remove a volume.
    fn remove(&self, req: VolumeRequest) -> VolumeResponse;

    /// Report the host path of a volume.
    fn path(&self, req: VolumeRequest) -> VolumeResponse;

    /// Mount a volume and report its mountpoint.
    fn mount(&self, req: VolumeRequest) -> VolumeResponse;

    /// Unmount a volume.
    fn umount(&self, req: VolumeRequest) -> VolumeResponse;
}

impl Action {
    /// Call the driver operation for this action.
    pub fn dispatch<D>(self, driver: &D, req: VolumeRequest) -> VolumeResponse
    where
        D: VolumeDriver + ?Sized,
    {
        match self {
            Action::Create => driver.create(req),
            Action::Remove => driver.remove(req),
            Action::Path => driver.path(req),
            Action::Mount => driver.mount(req),
            Action::Umount => driver.umount(req),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::RecordingDriver;

    #[test]
    fn dispatch_reaches_matching_operation() {
        let driver = RecordingDriver::new();
        for action in Action::ALL {
            let res = action.dispatch(&driver, VolumeRequest::new("v1"));
            assert!(!res.is_error());
            assert_eq!(driver.calls(action), 1);
        }
        assert_eq!(driver.total_calls(), Action::ALL.len());
    }
}
