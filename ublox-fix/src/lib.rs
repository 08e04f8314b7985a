#![deny(missing_docs)]
//! # u-blox fix acquisition
//! Reads NMEA output from a u-blox receiver and publishes position fixes.
//!
//! Decodes `$GNGGA` sentences into signed decimal-degree positions, raises
//! the receiver's navigation rate with a UBX-CFG-RATE command, and drives
//! both from an [`AcquisitionLoop`] over any [`Transport`].
mod acquire;
mod nmea;
mod sink;
mod transport;
mod ubx;

use std::time::Duration;

use thiserror::Error;

pub use acquire::{AcquisitionConfig, AcquisitionLoop, LoopState, Shutdown, StreamStats};
pub use nmea::{
    decode_fix, parse_sentence, DecodeError, GeoFix, Position, Sentence, SentenceKind,
    FIX_REPORT_ID,
};
pub use sink::{ChannelSink, FixEvent, FixSink, DEFAULT_FRAME_ID, DEFAULT_QUEUE_SIZE};
pub use transport::{LineReader, ReadLine, SerialTransport, Transport, MAX_LINE_LEN};
pub use ubx::{TimeRef, UbxChecksum, UbxCommand, UBX_SYNC};

/// Default bound on a single line read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause after the rate command
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
/// Failures that end acquisition
pub enum FixError {
    /// The serial device could not be opened
    #[error("Failed to open {port}: {source}")]
    Open {
        /// Device path
        port: String,
        /// Underlying error
        source: serialport::Error,
    },
    /// Reading from or writing to the receiver failed
    #[error("Serial exception: {0}")]
    Io(#[from] std::io::Error),
    /// The loop already ran and released its transport
    #[error("Acquisition loop already closed")]
    Closed,
}
