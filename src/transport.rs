//! Frame transports
//!
//! The segmentation codec moves whole frames, never byte streams. The
//! [`FrameRead`] and [`FrameWrite`] traits capture that contract: one
//! call, one frame. Two transports implement them:
//!
//! - [`CanTx`]/[`CanRx`]: a CAN device adapter mapping each frame to one
//!   CAN message with a fixed identifier per direction. The receive half
//!   batches device reads and filters by identifier and addressing mode.
//! - [`ByteReader`]/[`ByteWriter`]: plain byte streams (stdio, pipes)
//!   where frame boundaries are preserved by the transport underneath.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::can::{CanDevice, CanMsg};
use crate::config::{CanConfig, CanId};
use crate::constants::CAN_BATCH_SIZE;
use crate::error::{BridgeError, BridgeResult};

/// Read one frame per call.
pub trait FrameRead: Send {
    /// Read the next frame into `buf`, returning its length. A frame
    /// longer than `buf` is truncated.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = BridgeResult<usize>> + Send;
}

/// Write one frame per call.
pub trait FrameWrite: Send {
    /// Write `buf` as a single frame, returning how many bytes were
    /// accepted.
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = BridgeResult<usize>> + Send;
}

// ============================================================================
// CAN adapter
// ============================================================================

/// Transmit half of a CAN frame transport.
pub struct CanTx<D> {
    dev: D,
    txid: CanId,
}

/// Receive half of a CAN frame transport.
///
/// Device reads fill an internal batch which is drained one message per
/// [`FrameRead::read`] call. Status messages and messages not matching
/// the configured receive identifier are skipped.
pub struct CanRx<D> {
    dev: D,
    rxid: CanId,
    batch: Vec<CanMsg>,
    next: usize,
    filled: usize,
}

/// Split a shared device handle into transmit and receive halves.
pub fn split<D: CanDevice + Clone>(dev: D, cfg: &CanConfig) -> (CanTx<D>, CanRx<D>) {
    (
        CanTx {
            dev: dev.clone(),
            txid: cfg.txid,
        },
        CanRx {
            dev,
            rxid: cfg.rxid,
            batch: vec![CanMsg::default(); CAN_BATCH_SIZE],
            next: 0,
            filled: 0,
        },
    )
}

impl<D: CanDevice> FrameWrite for CanTx<D> {
    async fn write(&mut self, buf: &[u8]) -> BridgeResult<usize> {
        let msg = CanMsg::new(self.txid.id, self.txid.extended, buf);
        self.dev.write_msg(&msg).await?;
        Ok(buf.len().min(msg.len))
    }
}

impl<D: CanDevice> CanRx<D> {
    async fn fill(&mut self) -> BridgeResult<()> {
        let n = self.dev.read_msgs(&mut self.batch).await?;
        if n == 0 {
            return Err(BridgeError::ZeroMessages);
        }
        self.next = 0;
        self.filled = n;
        Ok(())
    }
}

impl<D: CanDevice> FrameRead for CanRx<D> {
    async fn read(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        loop {
            if self.next >= self.filled {
                self.fill().await?;
            }
            let msg = &self.batch[self.next];
            self.next += 1;
            if msg.is_status()
                || msg.ext_frame() != self.rxid.extended
                || msg.id != self.rxid.id
            {
                continue;
            }
            let n = msg.len.min(buf.len());
            buf[..n].copy_from_slice(&msg.data[..n]);
            return Ok(n);
        }
    }
}

// ============================================================================
// Byte stream adapter
// ============================================================================

/// Frame reader over a byte stream. Each underlying read is taken as one
/// frame, which holds for pipe-like transports where the peer writes one
/// frame at a time.
pub struct ByteReader<R>(R);

/// Frame writer over a byte stream, flushing after every frame.
pub struct ByteWriter<W>(W);

impl<R: AsyncRead + Unpin + Send> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self(inner)
    }
}

impl<W: AsyncWrite + Unpin + Send> ByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self(inner)
    }
}

impl<R: AsyncRead + Unpin + Send> FrameRead for ByteReader<R> {
    async fn read(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        let n = self.0.read(buf).await?;
        if n == 0 && !buf.is_empty() {
            return Err(BridgeError::ConnectionClosed);
        }
        Ok(n)
    }
}

impl<W: AsyncWrite + Unpin + Send> FrameWrite for ByteWriter<W> {
    async fn write(&mut self, buf: &[u8]) -> BridgeResult<usize> {
        self.0.write_all(buf).await?;
        self.0.flush().await?;
        Ok(buf.len())
    }
}

// ============================================================================
// Dial
// ============================================================================

/// Open the configured SocketCAN device, apply the optional decoration
/// hook, and return a shareable handle.
#[cfg(feature = "socketcan")]
pub fn dial(cfg: &CanConfig, wrap: Option<crate::can::WrapFn>) -> BridgeResult<std::sync::Arc<dyn CanDevice>> {
    let dev = crate::can::SocketCanDevice::open(&cfg.device_spec())?;
    Ok(wrap_device(Box::new(dev), wrap))
}

/// Apply the optional decoration hook to a freshly opened device.
pub fn wrap_device(
    dev: Box<dyn CanDevice>,
    wrap: Option<crate::can::WrapFn>,
) -> std::sync::Arc<dyn CanDevice> {
    let id = dev.name();
    let dev = match wrap {
        Some(f) => f(dev, &id),
        None => dev,
    };
    std::sync::Arc::from(dev)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::can::MsgFlags;
    use crate::testutil::MockCanDevice;
    use tokio_test::assert_ok;

    fn config() -> CanConfig {
        CanConfig::new("mock0")
    }

    #[tokio::test]
    async fn test_rx_delivers_matching_payloads_in_order() {
        let dev = Arc::new(MockCanDevice::new("mock0"));
        let cfg = config();
        dev.push_batch(vec![
            CanMsg::new(cfg.rxid.id, true, &[0x00, 0x01]),
            CanMsg::new(cfg.rxid.id, true, &[0x01, 0x02, 0x03]),
        ]);
        let (_, mut rx) = split(dev, &cfg);

        let mut buf = [0u8; 16];
        let n = rx.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x00, 0x01]);
        let n = rx.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x02, 0x03]);
    }

    #[tokio::test]
    async fn test_rx_skips_foreign_and_status_messages() {
        let dev = Arc::new(MockCanDevice::new("mock0"));
        let cfg = config();
        dev.push_batch(vec![
            CanMsg::new(0x42, true, &[0xEE]),
            CanMsg::status(MsgFlags::ERROR_PASSIVE),
            CanMsg::new(cfg.rxid.id, false, &[0xEE]),
            CanMsg::new(cfg.rxid.id, true, &[0xAB, 0xCD]),
        ]);
        let (_, mut rx) = split(dev, &cfg);

        let mut buf = [0u8; 16];
        let n = rx.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0xAB, 0xCD]);
    }

    #[tokio::test]
    async fn test_rx_zero_messages_is_an_error() {
        let dev = Arc::new(MockCanDevice::new("mock0"));
        let (_, mut rx) = split(dev, &config());

        let mut buf = [0u8; 16];
        let err = rx.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, BridgeError::ZeroMessages));
    }

    #[tokio::test]
    async fn test_tx_uses_configured_identifier() {
        let dev = Arc::new(MockCanDevice::new("mock0"));
        let cfg = config();
        let (mut tx, _) = split(dev.clone(), &cfg);

        tx.write(&[0x00, 0xAA, 0xBB]).await.unwrap();
        let sent = dev.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, cfg.txid.id);
        assert!(sent[0].ext_frame());
        assert_eq!(sent[0].payload(), &[0x00, 0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn test_tx_caps_payload_at_can_width() {
        let dev = Arc::new(MockCanDevice::new("mock0"));
        let (mut tx, _) = split(dev.clone(), &config());

        let n = tx.write(&[0u8; 12]).await.unwrap();
        assert_eq!(n, 8);
        assert_eq!(dev.sent()[0].len, 8);
    }

    #[tokio::test]
    async fn test_byte_stream_round_trip() {
        let (a, b) = tokio::io::duplex(64);
        let (ar, _aw) = tokio::io::split(a);
        let (_br, bw) = tokio::io::split(b);
        let mut w = ByteWriter::new(bw);
        let mut r = ByteReader::new(ar);

        assert_ok!(w.write(&[1, 2, 3]).await);
        let mut buf = [0u8; 16];
        let n = r.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_byte_reader_eof_is_connection_closed() {
        let (a, b) = tokio::io::duplex(64);
        drop(b);
        let (ar, _aw) = tokio::io::split(a);
        let mut r = ByteReader::new(ar);

        let mut buf = [0u8; 16];
        let err = r.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, BridgeError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_wrap_device_applies_hook_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let wrap: crate::can::WrapFn = Box::new(move |dev, id| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(id, "mock0");
            dev
        });
        let dev = wrap_device(Box::new(MockCanDevice::new("mock0")), Some(wrap));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dev.name(), "mock0");
    }
}
