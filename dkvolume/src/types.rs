//! Wire types for the volume plugin protocol.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

/// Request body sent by the plugin host to every `VolumeDriver.*` endpoint.
///
/// Keys are matched without regard to ASCII case, so `Name`, `name` and
/// `NAME` all set the volume name. When a key appears more than once the
/// last value wins. A `null` value leaves the field unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolumeRequest {
    /// Storage root of the server.
    ///
    /// Always overwritten by the router before the driver sees the request,
    /// so a client-supplied value has no effect.
    #[serde(rename = "Root", skip_serializing_if = "String::is_empty")]
    pub root: String,

    /// Volume name.
    #[serde(rename = "Name")]
    pub name: String,
}

impl VolumeRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            root: String::new(),
            name: name.into(),
        }
    }
}

impl<'de> Deserialize<'de> for VolumeRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(RequestVisitor)
    }
}

struct RequestVisitor;

impl<'de> Visitor<'de> for RequestVisitor {
    type Value = VolumeRequest;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a volume request object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut root = None;
        let mut name = None;
        while let Some(key) = map.next_key::<String>()? {
            if key.eq_ignore_ascii_case("Name") {
                if let Some(value) = map.next_value::<Option<String>>()? {
                    name = Some(value);
                }
            } else if key.eq_ignore_ascii_case("Root") {
                if let Some(value) = map.next_value::<Option<String>>()? {
                    root = Some(value);
                }
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }

        Ok(VolumeRequest {
            root: root.unwrap_or_default(),
            name: name.ok_or_else(|| de::Error::missing_field("Name"))?,
        })
    }
}

/// Response body returned by every `VolumeDriver.*` endpoint.
///
/// A non-empty `err` marks the call as failed; `mountpoint` is only
/// meaningful for `Path` and `Mount`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeResponse {
    #[serde(rename = "Mountpoint", default)]
    pub mountpoint: String,

    #[serde(rename = "Err", default)]
    pub err: Option<String>,
}

impl VolumeResponse {
    /// A successful response with no mountpoint.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A successful response carrying a mountpoint.
    pub fn mountpoint(mountpoint: impl Into<String>) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            err: None,
        }
    }

    /// A failed response.
    pub fn error(err: impl fmt::Display) -> Self {
        Self {
            mountpoint: String::new(),
            err: Some(err.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.err.as_deref().is_some_and(|e| !e.is_empty())
    }
}

/// The fixed set of driver actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Remove,
    Path,
    Mount,
    Umount,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Remove,
        Action::Path,
        Action::Mount,
        Action::Umount,
    ];

    /// HTTP path of the endpoint serving this action.
    pub fn endpoint(self) -> &'static str {
        match self {
            Action::Create => "/VolumeDriver.Create",
            Action::Remove => "/VolumeDriver.Remove",
            Action::Path => "/VolumeDriver.Path",
            Action::Mount => "/VolumeDriver.Mount",
            Action::Umount => "/VolumeDriver.Umount",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Create => "create",
            Action::Remove => "remove",
            Action::Path => "path",
            Action::Mount => "mount",
            Action::Umount => "umount",
        };
        f.write_str(name)
    }
}

/// Socket family the plugin listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Unix,
    Tcp,
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unix" => Ok(Transport::Unix),
            "tcp" => Ok(Transport::Tcp),
            other => Err(Error::UnsupportedTransport {
                transport: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Unix => f.write_str("unix"),
            Transport::Tcp => f.write_str("tcp"),
        }
    }
}

/// Address a provisioned listener is bound to.
///
/// Sent through the readiness signal once the bind succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAddr {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

impl fmt::Display for LocalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalAddr::Unix(path) => write!(f, "unix://{}", path.display()),
            LocalAddr::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}
