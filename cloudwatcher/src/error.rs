//! Error types for cloudwatcher.

use std::io;
use thiserror::Error;

/// Result type for cloudwatcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for cloudwatcher operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the link (read or write failure).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A normal-mode read returned fewer bytes than a full frame.
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes requested.
        expected: usize,
        /// Bytes received before the read timed out.
        actual: usize,
    },

    /// The block terminating a response was not the handshake frame.
    #[error("Framing fault: bad handshake frame {actual:02X?}")]
    Framing {
        /// The frame received in place of the handshake.
        actual: Vec<u8>,
    },

    /// A response frame did not start with the expected tag.
    #[error("Prefix mismatch: expected {expected:?}, got {actual:?}")]
    PrefixMismatch {
        /// Expected tag.
        expected: String,
        /// Leading bytes actually received.
        actual: String,
    },

    /// A response carried the expected tag but a non-ASCII payload.
    #[error("Malformed payload after {tag:?}: {payload:02X?}")]
    MalformedPayload {
        /// Tag the frame started with.
        tag: String,
        /// Payload bytes after the tag.
        payload: Vec<u8>,
    },

    /// A well-framed response did not carry a decimal integer.
    #[error("Malformed integer: {0:?}")]
    MalformedInteger(String),

    /// A status response decoded to an unknown literal.
    #[error("Unexpected status: {0:?}")]
    UnexpectedStatus(String),

    /// The station reported the "not connected" sentinel for a sensor.
    #[error("{0} sensor not connected")]
    SensorNotConnected(&'static str),

    /// The link could not be re-acquired after repeated faults.
    #[error("Fatal link fault: {0}")]
    FatalLink(String),

    /// The preamble never completed during firmware upgrade.
    #[error("Timeout waiting for upgrade preamble ({sync_count} sync bytes received)")]
    SyncTimeout {
        /// Sync bytes counted before the timeout.
        sync_count: u32,
    },

    /// The station stopped requesting bytes before the image was complete.
    #[error("Firmware transfer timed out at low {low}/{low_len}, high {high}/{high_len}")]
    TransferTimeout {
        /// Low-half cursor at the timeout.
        low: i64,
        /// Low-half length.
        low_len: usize,
        /// High-half cursor at the timeout.
        high: i64,
        /// High-half length.
        high_len: usize,
    },

    /// The station kept talking after the transfer and never left upgrade mode.
    #[error("Station stuck in upgrade mode after {0} trailing bytes")]
    StuckInUpgradeMode(usize),

    /// The firmware image cannot be transferred.
    #[error("Invalid firmware: {0}")]
    InvalidFirmware(String),

    /// An argument was outside the range the station accepts.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Whether this error is a transient link fault the connection guard may absorb.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::ShortRead { .. } => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::ShortRead { expected: 15, actual: 0 }.is_transient());
        assert!(Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone")).is_transient());
        assert!(!Error::Framing { actual: vec![0; 15] }.is_transient());
        assert!(!Error::MalformedInteger("abc".into()).is_transient());
        assert!(!Error::SyncTimeout { sync_count: 3 }.is_transient());
        assert!(!Error::StuckInUpgradeMode(1000).is_transient());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::PrefixMismatch {
            expected: "!X".into(),
            actual: "!Y".into(),
        };
        assert_eq!(err.to_string(), "Prefix mismatch: expected \"!X\", got \"!Y\"");

        let err = Error::SensorNotConnected("High precision humidity");
        assert_eq!(err.to_string(), "High precision humidity sensor not connected");
    }
}
