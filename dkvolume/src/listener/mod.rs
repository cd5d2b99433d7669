//! Listener provisioning and the accept abstraction.
//!
//! [`provision`] binds the socket described by a [`ListenerConfig`]:
//! - TCP sockets bind `host:port` directly
//! - Unix sockets replace stale socket files and restrict access to the
//!   owner and the configured group
//!
//! [`Listener`] abstracts over connection sources so the server loop can
//! serve TCP, Unix, or in-memory streams (testing) the same way. A TLS
//! wrapper only needs to implement [`Listener`] to be served.

#[cfg(unix)]
mod unix;
#[cfg(not(unix))]
mod unsupported;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, trace};

#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::config::ListenerConfig;
use crate::error::{Error, Result};
use crate::types::{LocalAddr, Transport};

#[cfg(unix)]
use unix::provision_unix;
#[cfg(not(unix))]
use unsupported::provision_unix;

/// A source of plugin client connections.
///
/// [`VolumeHandler::serve`](crate::VolumeHandler::serve) drives any
/// implementation. Errors tied to a single peer (reset, aborted) are skipped
/// by the server; anything else ends it.
#[async_trait]
pub trait Listener: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next client connection.
    async fn accept(&mut self) -> std::io::Result<Self::Stream>;
}

#[async_trait]
impl Listener for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> std::io::Result<Self::Stream> {
        let (stream, peer) = TcpListener::accept(self).await?;
        trace!(%peer, "accepted plugin client");
        Ok(stream)
    }
}

#[cfg(unix)]
#[async_trait]
impl Listener for UnixListener {
    type Stream = UnixStream;

    async fn accept(&mut self) -> std::io::Result<Self::Stream> {
        let (stream, _peer) = UnixListener::accept(self).await?;
        trace!("accepted plugin client");
        Ok(stream)
    }
}

/// Serves plugin connections handed over through a channel.
///
/// Lets an embedder (or a test) feed in-memory streams to the server. When
/// every sender is gone, `accept` reports `BrokenPipe` and `serve` returns
/// `Ok(())`.
pub struct StreamListener<S> {
    incoming: mpsc::Receiver<S>,
}

impl<S> StreamListener<S> {
    /// Returns the sending half together with the listener. At most
    /// `backlog` streams wait to be accepted.
    pub fn new(backlog: usize) -> (mpsc::Sender<S>, Self) {
        let (tx, incoming) = mpsc::channel(backlog);
        (tx, Self { incoming })
    }
}

#[async_trait]
impl<S> Listener for StreamListener<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    async fn accept(&mut self) -> std::io::Result<Self::Stream> {
        self.incoming.recv().await.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "no more plugin connections")
        })
    }
}

/// A bound listener produced by [`provision`].
#[derive(Debug)]
pub enum Provisioned {
    Tcp(TcpListener),
    /// A Unix listener and the path clients connect to. The socket is bound
    /// elsewhere and moved into place, so the kernel's view of its address
    /// is stale.
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
}

impl Provisioned {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<LocalAddr> {
        match self {
            Provisioned::Tcp(listener) => Ok(LocalAddr::Tcp(listener.local_addr()?)),
            #[cfg(unix)]
            Provisioned::Unix(_, path) => Ok(LocalAddr::Unix(path.clone())),
        }
    }
}

/// Bind the listener described by `config`.
pub async fn provision(config: &ListenerConfig) -> Result<Provisioned> {
    let provisioned = match config.transport {
        Transport::Tcp => provision_tcp(&config.address).await?,
        Transport::Unix => provision_unix(&config.address, config.group.as_deref()).await?,
    };
    info!(
        transport = %config.transport,
        address = %config.address,
        group = config.group.as_deref().unwrap_or("-"),
        "volume plugin listener bound"
    );
    Ok(provisioned)
}

async fn provision_tcp(address: &str) -> Result<Provisioned> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| bind_error(address, e))?;
    Ok(Provisioned::Tcp(listener))
}

fn bind_error(address: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::AddrInUse {
        Error::AddressInUse {
            address: address.to_string(),
        }
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tcp_provision_reports_bound_port() {
        let config = ListenerConfig::tcp("127.0.0.1:0");
        let provisioned = provision(&config).await.unwrap();
        match provisioned.local_addr().unwrap() {
            LocalAddr::Tcp(addr) => assert_ne!(addr.port(), 0),
            other => panic!("unexpected address: {other}"),
        }
    }

    #[tokio::test]
    async fn tcp_provision_detects_address_in_use() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = first.local_addr().unwrap().to_string();

        let result = provision(&ListenerConfig::tcp(&address)).await;
        assert!(matches!(result, Err(Error::AddressInUse { address: a }) if a == address));
    }
}
