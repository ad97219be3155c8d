//! Core error types and result handling
//!
//! One error enum covers both sides of the bridge. The only recoverable
//! variant is [`BridgeError::Timeout`], raised by the RTU-side framer when
//! no request arrives within the initial timeout; everything else is fatal
//! to the owning bridge task.

use thiserror::Error;

/// Result type used throughout the crate.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error taxonomy.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// RTU-side read timed out waiting for a frame. Recoverable; the
    /// forward task retries the read.
    #[error("timeout")]
    Timeout,

    /// Transport I/O failure on either side.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream (EOF on a pipe or serial line).
    #[error("connection closed")]
    ConnectionClosed,

    /// CAN device could not be opened.
    #[error("failed to open CAN device {device}: {message}")]
    DeviceOpen { device: String, message: String },

    /// CAN device read/write failure.
    #[error("CAN device error: {message}")]
    Device { message: String },

    /// A device read returned zero messages. Distinct from a timeout.
    #[error("zero messages in CAN buffer")]
    ZeroMessages,

    /// A reassembled message was shorter than the minimum viable length.
    #[error("invalid message length: {actual} bytes (minimum {minimum})")]
    InvalidLength { actual: usize, minimum: usize },

    /// A message cannot be encoded within the SEG control byte's 7-bit
    /// continuation count, or an RTU frame overran the framer buffer.
    #[error("message too large: {len} bytes (max {max})")]
    MessageTooLarge { len: usize, max: usize },

    /// Requested functionality was not compiled in.
    #[error("unsupported: {message}")]
    Unsupported { message: String },

    /// Invalid or incomplete launch configuration.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A bridge task failed outside its own error path (panic, abort).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// True for the recoverable timeout sentinel.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout)
    }
}
