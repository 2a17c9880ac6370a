//! Hand-off of the finished record to a bonded companion device.

pub mod backoff;
pub mod engine;
pub mod tcp;
pub mod transport;

pub use backoff::{Backoff, Sleeper, ThreadSleeper};
pub use engine::{
    PeerFailure, PeerFailureReason, TransferEngine, TransferError, TransferPolicy, TransferReport,
};
pub use tcp::{TcpChannel, TcpRadio};
pub use transport::{
    ChannelStrategy, PeerChannel, Radio, TransferCandidate, CHANNEL_STRATEGIES,
    SERIAL_PORT_SERVICE,
};
