//! CRC16 checksum for Modbus RTU framing
//!
//! The IBM/Modbus polynomial (0x8005 reflected, init 0xFFFF), appended to
//! the ADU as two little-endian bytes, low byte first.

use crc::{Crc, CRC_16_MODBUS};

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the Modbus CRC16 of `data`.
#[inline]
pub fn checksum(data: &[u8]) -> u16 {
    MODBUS.checksum(data)
}

/// Append the CRC16 of the buffer's current content, little-endian.
pub fn append(buf: &mut Vec<u8>) {
    let crc = checksum(buf);
    buf.extend_from_slice(&crc.to_le_bytes());
}
