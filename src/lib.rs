//! # voltage_segbridge
//!
//! Bridge between Modbus RTU framed I/O and a CAN bus carrying the SEG
//! segmentation protocol.
//!
//! Modbus RTU delimits frames by silence on the wire and protects them
//! with a trailing CRC16. CAN limits every transmission to 8 payload
//! bytes. This crate connects the two: RTU requests are cut on timing,
//! stripped of their CRC, segmented into SEG frames and written to the
//! bus; responses are reassembled, re-framed with a fresh CRC and
//! returned. The [`bridge`] module runs both directions concurrently and
//! optionally emulates the duplicate acknowledgements some devices expect
//! on a multi-drop line.
//!
//! ## Features
//!
//! - **SEG codec**: single/start/continuation control bytes, a 7-bit
//!   continuation count, and a resynchronizing reader that survives lost
//!   or reordered frames ([`seg`])
//! - **Frame transports**: CAN devices with a fixed identifier pair per
//!   direction, or plain byte streams such as stdio ([`transport`])
//! - **RTU framing**: timeout-delimited frame reader with Modbus timing
//!   ([`framer`])
//! - **Observability**: a [`tracer::CanTracer`] decorator logs raw CAN
//!   traffic; SEG frame traces go through `tracing` under the `seg`
//!   target
//! - **SocketCAN backend** behind the `socketcan` feature (Linux)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voltage_segbridge::{bridge, BridgeConfig, SegReader, SegWriter};
//! use voltage_segbridge::transport::{ByteReader, ByteWriter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = BridgeConfig::default();
//!     let seg_tx = SegWriter::new(ByteWriter::new(tokio::io::stdout()), cfg.frame_size, "stdio");
//!     let seg_rx = SegReader::new(ByteReader::new(tokio::io::stdin()), cfg.frame_size, "stdio");
//!     // The RTU side would normally be a subprocess or a serial port.
//!     let (rtu, _peer) = tokio::io::duplex(1024);
//!     let (rtu_r, rtu_w) = tokio::io::split(rtu);
//!     bridge::run(rtu_r, rtu_w, seg_tx, seg_rx, cfg).await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod can;
pub mod config;
pub mod constants;
pub mod crc16;
pub mod error;
pub mod framer;
pub mod seg;
pub mod tracer;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use can::{CanDevice, CanMsg, MsgFlags, WrapFn};
pub use config::{BridgeConfig, CanConfig, CanId};
pub use error::{BridgeError, BridgeResult};
pub use framer::FrameStream;
pub use seg::{SegReader, SegWriter};
pub use tracer::CanTracer;
pub use transport::{ByteReader, ByteWriter, CanRx, CanTx, FrameRead, FrameWrite};

#[cfg(feature = "socketcan")]
pub use can::SocketCanDevice;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
