//! Bridge and CAN adapter configuration
//!
//! Plain configuration structs with defaults matching the historical
//! `segrun` command-line flags. The CAN side carries one identifier per
//! direction; all traffic through one adapter instance uses exactly that
//! pair, and inbound frames addressed otherwise are dropped.

use std::time::Duration;

use crate::constants::{
    DEFAULT_CAN_RXID, DEFAULT_CAN_TXID, DEFAULT_CATCH_COMMAND, DEFAULT_FRAME_SIZE,
    DEFAULT_INITIAL_TIMEOUT_MS, DEFAULT_INTER_BYTE_TIMEOUT_MS,
};

/// A CAN bus identifier plus its addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanId {
    /// Raw identifier (11-bit standard or 29-bit extended).
    pub id: u32,
    /// True for extended (29-bit) frames.
    pub extended: bool,
}

impl CanId {
    /// Create an identifier.
    #[inline]
    pub fn new(id: u32, extended: bool) -> Self {
        Self { id, extended }
    }
}

/// CAN adapter configuration: device specification and the identifier pair.
#[derive(Debug, Clone)]
pub struct CanConfig {
    /// Device name understood by the backend (e.g. `can0`).
    pub device: String,
    /// Additional comma-joined device options.
    pub options: Vec<String>,
    /// Transmit identifier (bridge → device).
    pub txid: CanId,
    /// Receive identifier (device → bridge).
    pub rxid: CanId,
}

impl CanConfig {
    /// Build a configuration for `device` with the default identifier pair.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            options: Vec::new(),
            txid: CanId::new(DEFAULT_CAN_TXID, true),
            rxid: CanId::new(DEFAULT_CAN_RXID, true),
        }
    }

    /// Full device specification string: device name plus comma-joined
    /// options, as consumed by the device backend.
    pub fn device_spec(&self) -> String {
        if self.options.is_empty() {
            self.device.clone()
        } else {
            format!("{},{}", self.device, self.options.join(","))
        }
    }
}

/// Bridge loop configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// SEG frame size in bytes (CAN payload capacity, 2..=8).
    pub frame_size: usize,
    /// Enable duplicate-ACK emulation for the catch command.
    pub multi_acks: bool,
    /// Response command byte (offset 2) that arms the duplicate-ACK flag.
    pub catch_command: u8,
    /// RTU framer: wait for the first byte of a request.
    pub initial_timeout: Duration,
    /// RTU framer: inter-byte silence delimiting a frame.
    pub inter_byte_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            multi_acks: false,
            catch_command: DEFAULT_CATCH_COMMAND,
            initial_timeout: Duration::from_millis(DEFAULT_INITIAL_TIMEOUT_MS),
            inter_byte_timeout: Duration::from_millis(DEFAULT_INTER_BYTE_TIMEOUT_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_spec_without_options() {
        let cfg = CanConfig::new("can0");
        assert_eq!(cfg.device_spec(), "can0");
    }

    #[test]
    fn test_device_spec_joins_options() {
        let mut cfg = CanConfig::new("can0");
        cfg.options = vec!["baud=250k".to_string(), "listen".to_string()];
        assert_eq!(cfg.device_spec(), "can0,baud=250k,listen");
    }

    #[test]
    fn test_defaults_match_historical_flags() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.frame_size, 8);
        assert_eq!(cfg.catch_command, 0x01);
        assert!(!cfg.multi_acks);
        assert_eq!(cfg.initial_timeout, Duration::from_secs(3));
        assert_eq!(cfg.inter_byte_timeout, Duration::from_millis(30));

        let can = CanConfig::new("can0");
        assert_eq!(can.txid, CanId::new(0x12345678, true));
        assert_eq!(can.rxid, CanId::new(0x18FA1900, true));
    }
}
