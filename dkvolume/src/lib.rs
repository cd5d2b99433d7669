//! dkvolume: server side of the Docker volume plugin protocol.
//!
//! A plugin exposes a fixed set of HTTP endpoints over a Unix or TCP socket.
//! The host activates the plugin with a handshake, then forwards volume
//! operations to the five `VolumeDriver.*` endpoints. This crate handles the
//! socket, the handshake, and the envelope; the volume logic itself is a
//! [`VolumeDriver`] supplied by the caller.
//!
//! # Library Usage
//!
//! ```ignore
//! use dkvolume::{ListenerConfig, VolumeHandler};
//!
//! let handler = VolumeHandler::with_root("/var/lib/myplugin", MyDriver::new());
//! let config = ListenerConfig::for_plugin("myplugin").with_group("docker");
//! handler.listen_and_serve(&config, None).await?;
//! ```

pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod listener;
pub mod router;
pub mod server;
pub mod types;

pub use codec::{CONTENT_TYPE, IMPLEMENTATION_MANIFEST, decode_request, encode_response, status_for};
pub use config::{Config, DEFAULT_ROOT, DEFAULT_SOCKET_PATH, ListenerConfig, PLUGIN_SOCKET_DIR};
pub use driver::VolumeDriver;
pub use error::{ConfigError, DecodeError, Error, Result};
pub use listener::{Listener, Provisioned, StreamListener, provision};
pub use router::{ACTIVATE_ENDPOINT, router};
pub use server::VolumeHandler;
pub use types::{Action, LocalAddr, Transport, VolumeRequest, VolumeResponse};

#[cfg(test)]
pub(crate) mod test_util;
