//! Short-range wireless transport as seen by the transfer engine.
//!
//! The platform radio exposes bonded peers and opens connection-oriented
//! byte-stream channels to a service identifier. Channel creation is tried
//! with each [`ChannelStrategy`] in [`CHANNEL_STRATEGIES`] order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use uuid::Uuid;

/// Standard serial-port profile service class, used for the record channel.
pub const SERIAL_PORT_SERVICE: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5F9B_34FB);

/// A previously bonded peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCandidate {
    /// Platform peer identifier (hardware address, socket address, ...)
    pub address: String,
    /// Display name
    pub name: String,
}

impl TransferCandidate {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TransferCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' @ {}", self.name, self.address)
    }
}

/// How a channel to a peer is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStrategy {
    /// Authenticated channel looked up through the service record
    Secure,
    /// Unauthenticated channel looked up through the service record
    Insecure,
    /// Direct open of a fixed channel number, bypassing the service lookup
    RawChannel(u8),
}

/// Strategies in the order they are tried.
pub const CHANNEL_STRATEGIES: [ChannelStrategy; 3] = [
    ChannelStrategy::Secure,
    ChannelStrategy::Insecure,
    ChannelStrategy::RawChannel(1),
];

impl fmt::Display for ChannelStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStrategy::Secure => f.write_str("secure"),
            ChannelStrategy::Insecure => f.write_str("insecure"),
            ChannelStrategy::RawChannel(ch) => write!(f, "raw channel {ch}"),
        }
    }
}

/// An unconnected or connected channel to one peer.
///
/// Bytes written go to the peer once [`connect`](PeerChannel::connect)
/// succeeded.
pub trait PeerChannel: Write + Send {
    /// Perform the connection handshake. May be called again after a failure.
    fn connect(&mut self) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

/// The platform radio.
pub trait Radio {
    fn is_enabled(&self) -> bool;

    /// Bonded peers in platform order.
    fn bonded_peers(&self) -> Vec<TransferCandidate>;

    /// Stop any ongoing peer discovery.
    fn cancel_discovery(&self);

    /// Create a channel handle to `service` on `peer`. Does not connect.
    fn open_channel(
        &self,
        peer: &TransferCandidate,
        service: Uuid,
        strategy: ChannelStrategy,
    ) -> io::Result<Box<dyn PeerChannel>>;
}
