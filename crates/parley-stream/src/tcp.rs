//! TCP transport: framed messages over a socket.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::framing::StreamTransport;

/// Connect to a listening peer.
pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<StreamTransport<TcpStream>> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    debug!(peer = %stream.peer_addr()?, "tcp transport connected");
    Ok(StreamTransport::new(stream))
}

/// Accepts inbound connections as ready transports.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind to an address. Use port 0 for an ephemeral port.
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Self {
            inner: TcpListener::bind(addr).await?,
        })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Wait for the next client.
    pub async fn accept(&self) -> io::Result<(StreamTransport<TcpStream>, SocketAddr)> {
        let (stream, peer) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        debug!(%peer, "tcp client accepted");
        Ok((StreamTransport::new(stream), peer))
    }
}
