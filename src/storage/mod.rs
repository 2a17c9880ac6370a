//! Durable storage of the rolling session record.

pub mod record;
pub mod writer;

pub use record::{format_row, RecordStore, RECORD_HEADER, TIMESTAMP_FORMAT};
pub use writer::{write_snapshot, DurableWriter, WriterError};
