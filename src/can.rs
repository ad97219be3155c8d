//! CAN message model and device contract
//!
//! [`CanMsg`] is the unit exchanged with a device backend: identifier,
//! flags, and up to 8 payload bytes. [`CanDevice`] is the object-safe
//! async contract a backend implements; the bridge only ever talks to a
//! device through it, so tracers and test doubles slot in by delegation.
//!
//! The SocketCAN backend (Linux) lives behind the `socketcan` feature.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;

use crate::constants::CAN_MAX_DLEN;
use crate::error::BridgeResult;

// ============================================================================
// Message flags
// ============================================================================

/// Per-message flag bits: addressing mode and bus status indications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MsgFlags(u32);

impl MsgFlags {
    /// No flags set.
    pub const NONE: MsgFlags = MsgFlags(0);
    /// Extended (29-bit) identifier.
    pub const EXT_FRAME: MsgFlags = MsgFlags(1 << 0);
    /// Bus status: error active.
    pub const ERROR_ACTIVE: MsgFlags = MsgFlags(1 << 1);
    /// Bus status: error passive.
    pub const ERROR_PASSIVE: MsgFlags = MsgFlags(1 << 2);
    /// Bus status: bus-off.
    pub const BUS_OFF: MsgFlags = MsgFlags(1 << 3);

    const STATUS: MsgFlags = MsgFlags(Self::ERROR_ACTIVE.0 | Self::ERROR_PASSIVE.0 | Self::BUS_OFF.0);

    /// True if every bit of `other` is set.
    #[inline]
    pub fn contains(self, other: MsgFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set.
    #[inline]
    pub fn intersects(self, other: MsgFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for MsgFlags {
    type Output = MsgFlags;

    #[inline]
    fn bitor(self, rhs: MsgFlags) -> MsgFlags {
        MsgFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for MsgFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: MsgFlags) {
        self.0 |= rhs.0;
    }
}

// ============================================================================
// CanMsg
// ============================================================================

/// One CAN message: identifier, flags, payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanMsg {
    /// Bus identifier.
    pub id: u32,
    /// Addressing mode and status bits.
    pub flags: MsgFlags,
    /// Payload buffer.
    pub data: [u8; CAN_MAX_DLEN],
    /// Valid payload length.
    pub len: usize,
}

impl CanMsg {
    /// Build a data message. The payload is capped at the CAN payload width.
    pub fn new(id: u32, extended: bool, payload: &[u8]) -> Self {
        let len = payload.len().min(CAN_MAX_DLEN);
        let mut data = [0u8; CAN_MAX_DLEN];
        data[..len].copy_from_slice(&payload[..len]);
        let mut flags = MsgFlags::NONE;
        if extended {
            flags |= MsgFlags::EXT_FRAME;
        }
        Self {
            id,
            flags,
            data,
            len,
        }
    }

    /// Build a status message carrying bus state indications.
    pub fn status(flags: MsgFlags) -> Self {
        Self {
            id: 0,
            flags,
            data: [0u8; CAN_MAX_DLEN],
            len: 0,
        }
    }

    /// Valid payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// True for bus status indications (error state, bus-off). Status
    /// messages carry no application payload.
    #[inline]
    pub fn is_status(&self) -> bool {
        self.flags.intersects(MsgFlags::STATUS)
    }

    /// True for extended (29-bit) addressing.
    #[inline]
    pub fn ext_frame(&self) -> bool {
        self.flags.contains(MsgFlags::EXT_FRAME)
    }

    /// Names of the status flags set on this message.
    pub fn status_names(&self) -> String {
        let mut s = String::new();
        if self.flags.contains(MsgFlags::ERROR_ACTIVE) {
            s.push_str("ERROR ACTIVE");
        }
        if self.flags.contains(MsgFlags::ERROR_PASSIVE) {
            s.push_str("ERROR PASSIVE");
        }
        if self.flags.contains(MsgFlags::BUS_OFF) {
            s.push_str("BUSOFF");
        }
        s
    }
}

/// Format bytes as space-separated lowercase hex pairs.
pub(crate) fn hex(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 3);
    for (i, b) in data.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{b:02x}");
    }
    s
}

// ============================================================================
// Device contract
// ============================================================================

/// Async CAN device contract.
///
/// Methods take `&self`: a device handle is shared between the transmit
/// and receive halves of the transport, and concrete backends are either
/// fd-based (SocketCAN) or manage their own interior state.
#[async_trait]
pub trait CanDevice: Send + Sync {
    /// Pull a batch of messages into `buf`, returning how many were
    /// written. Blocks until at least one message is available or the
    /// device fails. Returning zero is treated as an error by callers.
    async fn read_msgs(&self, buf: &mut [CanMsg]) -> BridgeResult<usize>;

    /// Submit one message as a single bus transmission.
    async fn write_msg(&self, msg: &CanMsg) -> BridgeResult<()>;

    /// Release the device handle.
    async fn close(&self) -> BridgeResult<()>;

    /// Textual identity of the device (e.g. the interface name).
    fn name(&self) -> String;
}

#[async_trait]
impl<T: CanDevice + ?Sized> CanDevice for Arc<T> {
    async fn read_msgs(&self, buf: &mut [CanMsg]) -> BridgeResult<usize> {
        (**self).read_msgs(buf).await
    }

    async fn write_msg(&self, msg: &CanMsg) -> BridgeResult<()> {
        (**self).write_msg(msg).await
    }

    async fn close(&self) -> BridgeResult<()> {
        (**self).close().await
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/// Device decoration hook applied once at dial time, before first use.
/// Receives the freshly opened device and its textual identity.
pub type WrapFn = Box<dyn FnOnce(Box<dyn CanDevice>, &str) -> Box<dyn CanDevice> + Send>;

// ============================================================================
// SocketCAN backend
// ============================================================================

#[cfg(feature = "socketcan")]
pub use self::socketcan_dev::SocketCanDevice;

#[cfg(feature = "socketcan")]
mod socketcan_dev {
    use async_trait::async_trait;
    use socketcan::tokio::CanSocket;
    use socketcan::{CanFrame, EmbeddedFrame, ExtendedId, Id, StandardId};

    use super::{CanDevice, CanMsg, MsgFlags};
    use crate::error::{BridgeError, BridgeResult};

    /// CAN device backed by a Linux SocketCAN interface.
    pub struct SocketCanDevice {
        socket: CanSocket,
        name: String,
    }

    impl SocketCanDevice {
        /// Open the interface named by `spec`. Options after the first
        /// comma are accepted for compatibility but SocketCAN interfaces
        /// are configured via `ip link`, so they are ignored.
        pub fn open(spec: &str) -> BridgeResult<Self> {
            let name = spec.split(',').next().unwrap_or(spec).to_string();
            let socket = CanSocket::open(&name).map_err(|e| BridgeError::DeviceOpen {
                device: name.clone(),
                message: e.to_string(),
            })?;
            Ok(Self { socket, name })
        }

        /// Map a message to a validated bus identifier. Standard ids must
        /// fit 11 bits; the full 32-bit value is range-checked, never
        /// truncated.
        fn bus_id(msg: &CanMsg) -> BridgeResult<Id> {
            if msg.ext_frame() {
                Ok(ExtendedId::new(msg.id)
                    .ok_or_else(|| BridgeError::Device {
                        message: format!("invalid extended identifier {:#x}", msg.id),
                    })?
                    .into())
            } else {
                Ok(u16::try_from(msg.id)
                    .ok()
                    .and_then(StandardId::new)
                    .ok_or_else(|| BridgeError::Device {
                        message: format!("invalid standard identifier {:#x}", msg.id),
                    })?
                    .into())
            }
        }

        fn convert(frame: CanFrame) -> CanMsg {
            match frame {
                CanFrame::Data(f) => {
                    let (id, extended) = match f.id() {
                        Id::Standard(id) => (id.as_raw() as u32, false),
                        Id::Extended(id) => (id.as_raw(), true),
                    };
                    CanMsg::new(id, extended, f.data())
                }
                // Error frames surface as status messages; the transport
                // drops them and the tracer names their bus state.
                CanFrame::Error(_) => CanMsg::status(MsgFlags::ERROR_PASSIVE),
                // Remote frames carry no payload; treat them like status
                // so the transport filters them out.
                CanFrame::Remote(_) => CanMsg::status(MsgFlags::ERROR_ACTIVE),
            }
        }
    }

    #[async_trait]
    impl CanDevice for SocketCanDevice {
        async fn read_msgs(&self, buf: &mut [CanMsg]) -> BridgeResult<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            let frame = self
                .socket
                .read_frame()
                .await
                .map_err(|e| BridgeError::Device {
                    message: e.to_string(),
                })?;
            buf[0] = Self::convert(frame);
            Ok(1)
        }

        async fn write_msg(&self, msg: &CanMsg) -> BridgeResult<()> {
            let id = Self::bus_id(msg)?;
            let frame = CanFrame::new(id, msg.payload()).ok_or_else(|| BridgeError::Device {
                message: format!("payload too long for CAN frame: {}", msg.len),
            })?;
            self.socket
                .write_frame(frame)
                .await
                .map_err(|e| BridgeError::Device {
                    message: e.to_string(),
                })
        }

        async fn close(&self) -> BridgeResult<()> {
            // The socket is closed when the handle is dropped.
            Ok(())
        }

        fn name(&self) -> String {
            self.name.clone()
        }
    }

}
