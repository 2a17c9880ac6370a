//! TCP stand-in for the short-range radio.
//!
//! On a desktop host there is no serial-port profile to connect to, so
//! bonded peers are configured as socket addresses and each channel is a
//! TCP stream. The service identifier is not part of the address; the
//! listening port plays that role.

use crate::transfer::transport::{ChannelStrategy, PeerChannel, Radio, TransferCandidate};
use std::io::{self, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use uuid::Uuid;

/// A radio whose bonded peers are TCP endpoints.
#[derive(Debug, Clone)]
pub struct TcpRadio {
    peers: Vec<TransferCandidate>,
    enabled: bool,
    connect_timeout: Duration,
}

impl TcpRadio {
    pub fn new(peers: Vec<TransferCandidate>, connect_timeout: Duration) -> Self {
        Self {
            peers,
            enabled: true,
            connect_timeout,
        }
    }

    /// Simulate the radio being switched off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl Radio for TcpRadio {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn bonded_peers(&self) -> Vec<TransferCandidate> {
        self.peers.clone()
    }

    fn cancel_discovery(&self) {
        tracing::trace!("TCP radio has no discovery to cancel");
    }

    fn open_channel(
        &self,
        peer: &TransferCandidate,
        service: Uuid,
        strategy: ChannelStrategy,
    ) -> io::Result<Box<dyn PeerChannel>> {
        match strategy {
            ChannelStrategy::Secure | ChannelStrategy::Insecure => {
                let addr = resolve(&peer.address)?;
                tracing::trace!(%service, %addr, "Opening TCP channel");
                Ok(Box::new(TcpChannel {
                    addr,
                    connect_timeout: self.connect_timeout,
                    stream: None,
                }))
            }
            ChannelStrategy::RawChannel(ch) => Err(io::Error::new(
                ErrorKind::Unsupported,
                format!("raw channel {ch} is not available over TCP"),
            )),
        }
    }
}

fn resolve(address: &str) -> io::Result<SocketAddr> {
    address.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            ErrorKind::AddrNotAvailable,
            format!("no address for {address}"),
        )
    })
}

/// A TCP channel that connects on demand.
pub struct TcpChannel {
    addr: SocketAddr,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpChannel {
    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::from(ErrorKind::NotConnected))
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }
}

impl PeerChannel for TcpChannel {
    fn connect(&mut self) -> io::Result<()> {
        let stream = TcpStream::connect_timeout(&self.addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(stream) => match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != ErrorKind::NotConnected => Err(e),
                _ => Ok(()),
            },
            None => Ok(()),
        }
    }
}
