//! Fallback for platforms without Unix domain sockets.

use super::Provisioned;
use crate::error::{Error, Result};

pub(super) async fn provision_unix(_address: &str, _group: Option<&str>) -> Result<Provisioned> {
    Err(Error::UnsupportedPlatform)
}
