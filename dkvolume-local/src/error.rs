//! Error types for the local volume driver.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Local driver errors.
///
/// These never leave the process as Rust errors: the driver renders them
/// into the `Err` field of the plugin response.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid volume name: {0:?}")]
    InvalidName(String),

    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    #[error("volume busy: {name} has {mounts} active mount(s)")]
    VolumeBusy { name: String, mounts: usize },

    #[error("volume not mounted: {0}")]
    NotMounted(String),

    #[error("request has no storage root")]
    MissingRoot,

    #[error("I/O error on volume {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(name: &str) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            name: name.to_string(),
            source,
        }
    }
}
