//! The volume plugin server.
//!
//! [`VolumeHandler`] owns the router for one driver and serves it over any
//! [`Listener`]. Each accepted connection is served on its own task, so a
//! slow or broken connection never holds up the accept loop.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_ROOT, ListenerConfig};
use crate::driver::VolumeDriver;
use crate::error::Result;
use crate::listener::{Listener, Provisioned, provision};
use crate::router::router;
use crate::types::LocalAddr;

/// Pause before accepting again after the process ran out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Serves the plugin protocol for a single [`VolumeDriver`].
#[derive(Clone)]
pub struct VolumeHandler {
    root: String,
    router: Router,
}

impl VolumeHandler {
    /// Create a handler using the default storage root,
    /// `/var/lib/docker/volumes`.
    pub fn new<D: VolumeDriver>(driver: D) -> Self {
        Self::with_root(DEFAULT_ROOT, driver)
    }

    /// Create a handler that injects `root` into every request.
    pub fn with_root<D: VolumeDriver>(root: impl AsRef<Path>, driver: D) -> Self {
        Self::from_shared(root, Arc::new(driver))
    }

    /// Create a handler around a driver that is shared with other code.
    pub fn from_shared<D>(root: impl AsRef<Path>, driver: Arc<D>) -> Self
    where
        D: VolumeDriver + ?Sized,
    {
        let root = root.as_ref().to_string_lossy().into_owned();
        Self {
            router: router(root.clone(), driver),
            root,
        }
    }

    /// Create a handler from a loaded [`Config`].
    pub fn from_config<D: VolumeDriver>(config: &Config, driver: D) -> Self {
        Self::with_root(&config.root, driver)
    }

    /// Storage root injected into every request.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The HTTP router, for embedding into another server.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind the configured listener and serve until it fails.
    ///
    /// `ready` fires once, after the bind succeeds and before the first
    /// connection is accepted.
    pub async fn listen_and_serve(
        &self,
        config: &ListenerConfig,
        ready: Option<oneshot::Sender<LocalAddr>>,
    ) -> Result<()> {
        let provisioned = provision(config).await?;
        let addr = provisioned.local_addr()?;
        info!(%addr, root = %self.root, "volume plugin serving");

        if let Some(ready) = ready {
            if ready.send(addr).is_err() {
                debug!("readiness receiver dropped");
            }
        }

        match provisioned {
            Provisioned::Tcp(listener) => self.serve(listener).await,
            #[cfg(unix)]
            Provisioned::Unix(listener, _) => self.serve(listener).await,
        }
    }

    /// Accept connections from `listener` until it fails.
    ///
    /// Connection errors are isolated to their connection. That includes
    /// accept errors that belong to a single peer, such as a client that
    /// resets before it is accepted. Running out of file descriptors pauses
    /// the loop briefly. Any other accept error ends the loop and is
    /// returned. A [`StreamListener`] whose senders are all dropped ends the
    /// loop with `Ok(())`.
    ///
    /// [`StreamListener`]: crate::listener::StreamListener
    pub async fn serve<L>(&self, mut listener: L) -> Result<()>
    where
        L: Listener,
    {
        loop {
            let stream = match listener.accept().await {
                Ok(stream) => stream,
                // Channel closed (StreamListener exhausted) - normal exit
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
                Err(e) => match classify_accept_error(&e) {
                    AcceptError::Connection => {
                        debug!(error = %e, "dropping failed incoming connection");
                        continue;
                    }
                    AcceptError::Exhausted => {
                        warn!(error = %e, "accept failed, retrying");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                    AcceptError::Fatal => return Err(e.into()),
                },
            };

            let service = TowerToHyperService::new(self.router.clone());
            tokio::spawn(async move {
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!(error = %e, "volume plugin connection error");
                }
            });
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum AcceptError {
    /// The peer went away; only its connection is lost.
    Connection,
    /// Out of descriptors or buffers; may clear once connections close.
    Exhausted,
    /// The listener itself is broken.
    Fatal,
}

fn classify_accept_error(err: &io::Error) -> AcceptError {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => AcceptError::Connection,
        io::ErrorKind::OutOfMemory => AcceptError::Exhausted,
        _ if is_resource_exhaustion(err) => AcceptError::Exhausted,
        _ => AcceptError::Fatal,
    }
}

#[cfg(unix)]
fn is_resource_exhaustion(err: &io::Error) -> bool {
    use nix::errno::Errno;

    err.raw_os_error().is_some_and(|code| {
        matches!(
            Errno::from_raw(code),
            Errno::EMFILE | Errno::ENFILE | Errno::ENOBUFS | Errno::ENOMEM
        )
    })
}

#[cfg(not(unix))]
fn is_resource_exhaustion(_err: &io::Error) -> bool {
    false
}
