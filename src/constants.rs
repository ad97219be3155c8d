//! Wire-level constants for the SEG protocol and the bridge defaults
//!
//! SEG frames are CAN payloads: one control byte followed by up to
//! `frame size - 1` message bytes. The control byte is either 0 (single
//! frame), `0x80 | n` (start frame announcing `n` continuations), or the
//! continuation index itself.

// ============================================================================
// SEG Framing Constants
// ============================================================================

/// High bit of the control byte, marking the start frame of a multi-frame
/// message. The low 7 bits of a start frame carry the continuation count.
pub const SEG_START_BIT: u8 = 1 << 7;

/// Largest continuation count encodable in the control byte's low 7 bits.
///
/// A message of `n` bytes needs `(n - 1) / (size - 1)` continuations, so
/// the longest encodable message is `(size - 1) * (MAX_CONT_COUNT + 1)`
/// bytes (896 bytes at the default frame size of 8).
pub const MAX_CONT_COUNT: u8 = 0x7F;

/// Default SEG frame size: one classic CAN payload.
pub const DEFAULT_FRAME_SIZE: usize = 8;

// ============================================================================
// CAN Transport Constants
// ============================================================================

/// Classic CAN maximum payload width.
pub const CAN_MAX_DLEN: usize = 8;

/// Scratch buffer capacity for batched device reads, in messages.
pub const CAN_BATCH_SIZE: usize = 64;

/// Default transmit identifier (bridge → device).
pub const DEFAULT_CAN_TXID: u32 = 0x1234_5678;

/// Default receive identifier (device → bridge).
pub const DEFAULT_CAN_RXID: u32 = 0x18FA_1900;

// ============================================================================
// Bridge Defaults
// ============================================================================

/// Trailing CRC16 length of a Modbus RTU ADU.
pub const CRC_LEN: usize = 2;

/// Minimum viable reassembled message length before the CRC is appended.
pub const MIN_MSG_LEN: usize = 2;

/// Response command byte that triggers duplicate-ACK emulation.
pub const DEFAULT_CATCH_COMMAND: u8 = 0x01;

/// Extra transmissions of a request once the duplicate-ACK flag fires.
pub const MULTI_ACK_REPEATS: usize = 2;

/// Spacing between the repeated transmissions, in milliseconds.
pub const MULTI_ACK_DELAY_MS: u64 = 50;

/// RTU framer: how long to wait for the first byte of a request.
pub const DEFAULT_INITIAL_TIMEOUT_MS: u64 = 3000;

/// RTU framer: inter-byte silence that delimits a frame.
pub const DEFAULT_INTER_BYTE_TIMEOUT_MS: u64 = 30;

/// RTU framer internal buffer size.
pub const FRAMER_BUF_SIZE: usize = 512;
