//! Shared test utilities.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::driver::VolumeDriver;
use crate::types::{Action, VolumeRequest, VolumeResponse};

/// Driver stub that records every call and replies with canned responses.
///
/// Actions without a canned response reply with [`VolumeResponse::ok`].
#[derive(Default)]
pub struct RecordingDriver {
    responses: HashMap<Action, VolumeResponse>,
    calls: Mutex<Vec<(Action, VolumeRequest)>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, action: Action, response: VolumeResponse) -> Self {
        self.responses.insert(action, response);
        self
    }

    pub fn calls(&self, action: Action) -> usize {
        self.lock().iter().filter(|(a, _)| *a == action).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().len()
    }

    /// Requests observed by the driver, in call order.
    pub fn requests(&self) -> Vec<VolumeRequest> {
        self.lock().iter().map(|(_, req)| req.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Action, VolumeRequest)>> {
        self.calls.lock().expect("calls lock poisoned")
    }

    fn record(&self, action: Action, req: VolumeRequest) -> VolumeResponse {
        self.lock().push((action, req));
        self.responses.get(&action).cloned().unwrap_or_default()
    }
}

impl VolumeDriver for RecordingDriver {
    fn create(&self, req: VolumeRequest) -> VolumeResponse {
        self.record(Action::Create, req)
    }

    fn remove(&self, req: VolumeRequest) -> VolumeResponse {
        self.record(Action::Remove, req)
    }

    fn path(&self, req: VolumeRequest) -> VolumeResponse {
        self.record(Action::Path, req)
    }

    fn mount(&self, req: VolumeRequest) -> VolumeResponse {
        self.record(Action::Mount, req)
    }

    fn umount(&self, req: VolumeRequest) -> VolumeResponse {
        self.record(Action::Umount, req)
    }
}
