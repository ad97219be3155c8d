//! Request/response bridge
//!
//! Two concurrent tasks tie the RTU side to the SEG transport:
//!
//! - forward: cut RTU frames on timing, strip the trailing CRC16, and
//!   write the bare PDU as one SEG message.
//! - respond: reassemble SEG messages, append a freshly computed CRC16,
//!   and write the framed response back to the RTU side.
//!
//! Duplicate-ACK emulation covers devices that acknowledge a command
//! several times on the bus: when a response carries the configured
//! catch command, a flag is armed and the next forwarded request is
//! repeated twice at a fixed interval, so the device side sees the same
//! traffic pattern it would on a real multi-drop line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinError;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::constants::{CRC_LEN, MIN_MSG_LEN, MULTI_ACK_DELAY_MS, MULTI_ACK_REPEATS};
use crate::crc16;
use crate::error::{BridgeError, BridgeResult};
use crate::framer::FrameStream;
use crate::seg::{SegReader, SegWriter};
use crate::transport::{FrameRead, FrameWrite};

/// Take-once flag shared between the two bridge tasks. The response task
/// arms it; the forward task takes it, which clears it in the same step,
/// so one catch response triggers exactly one round of repeats.
#[derive(Clone, Default)]
struct AckFlag(Arc<AtomicBool>);

impl AckFlag {
    fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Run the bridge until either side fails or closes.
pub async fn run<R, W, SW, SR>(
    rtu_reader: R,
    rtu_writer: W,
    seg_tx: SegWriter<SW>,
    seg_rx: SegReader<SR>,
    cfg: BridgeConfig,
) -> BridgeResult<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    SW: FrameWrite + 'static,
    SR: FrameRead + 'static,
{
    let acks = AckFlag::default();
    let stream = FrameStream::new(rtu_reader).with_timeouts(cfg.initial_timeout, cfg.inter_byte_timeout);

    let mut fwd = tokio::spawn(forward(stream, seg_tx, acks.clone()));
    let mut rsp = tokio::spawn(respond(seg_rx, rtu_writer, acks, cfg));

    let result = tokio::select! {
        r = &mut fwd => flatten(r),
        r = &mut rsp => flatten(r),
    };
    fwd.abort();
    rsp.abort();
    result
}

fn flatten(res: Result<BridgeResult<()>, JoinError>) -> BridgeResult<()> {
    match res {
        Ok(r) => r,
        Err(e) => Err(BridgeError::Internal {
            message: e.to_string(),
        }),
    }
}

async fn forward<R, SW>(
    mut stream: FrameStream<R>,
    mut seg: SegWriter<SW>,
    acks: AckFlag,
) -> BridgeResult<()>
where
    R: AsyncRead + Unpin + Send,
    SW: FrameWrite,
{
    loop {
        let data = match stream.read_frame().await {
            Ok(data) => data,
            Err(e) if e.is_timeout() => continue,
            Err(e) => return Err(e),
        };
        if data.len() < CRC_LEN {
            warn!(len = data.len(), "dropping short RTU frame");
            continue;
        }
        // The device side computes its own integrity checks; only the
        // bare PDU crosses the SEG transport.
        let payload = &data[..data.len() - CRC_LEN];
        debug!(len = payload.len(), "forwarding request");
        seg.write_msg(payload).await?;
        if acks.take() {
            for _ in 0..MULTI_ACK_REPEATS {
                sleep(Duration::from_millis(MULTI_ACK_DELAY_MS)).await;
                debug!(len = payload.len(), "repeating request");
                seg.write_msg(payload).await?;
            }
        }
    }
}

async fn respond<SR, W>(
    mut seg: SegReader<SR>,
    mut out: W,
    acks: AckFlag,
    cfg: BridgeConfig,
) -> BridgeResult<()>
where
    SR: FrameRead,
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let msg = seg.read_msg().await?;
        if msg.len() < MIN_MSG_LEN {
            return Err(BridgeError::InvalidLength {
                actual: msg.len(),
                minimum: MIN_MSG_LEN,
            });
        }
        if cfg.multi_acks && msg.len() > 2 && msg[2] == cfg.catch_command {
            debug!(command = msg[2], "arming duplicate-ACK repeats");
            acks.arm();
        }
        let mut frame = Vec::with_capacity(msg.len() + CRC_LEN);
        frame.extend_from_slice(msg);
        crc16::append(&mut frame);
        debug!(len = frame.len(), "returning response");
        out.write_all(&frame).await?;
        out.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use super::*;
    use crate::testutil::{chan_pipe, ChanRead, ChanWrite};

    struct Harness {
        rtu: tokio::io::DuplexStream,
        seg_out: mpsc::UnboundedReceiver<Vec<u8>>,
        seg_in: mpsc::UnboundedSender<Vec<u8>>,
        handle: tokio::task::JoinHandle<BridgeResult<()>>,
    }

    fn start(cfg: BridgeConfig) -> Harness {
        let (rtu, bridge_side) = tokio::io::duplex(1024);
        let (br, bw) = tokio::io::split(bridge_side);
        let (seg_tx, seg_out): (ChanWrite, ChanRead) = chan_pipe();
        let (seg_in, seg_rx) = chan_pipe();
        let frame_size = cfg.frame_size;
        let handle = tokio::spawn(run(
            br,
            bw,
            SegWriter::new(seg_tx, frame_size, "test"),
            SegReader::new(seg_rx, frame_size, "test"),
            cfg,
        ));
        Harness {
            rtu,
            seg_out: seg_out.0,
            seg_in: seg_in.0,
            handle,
        }
    }

    /// A request frame with a valid CRC appended.
    fn request(pdu: &[u8]) -> Vec<u8> {
        let mut frame = pdu.to_vec();
        crc16::append(&mut frame);
        frame
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_strips_crc() {
        let mut h = start(BridgeConfig::default());

        h.rtu.write_all(&request(&[0x01, 0x03, 0x00, 0x2A])).await.unwrap();
        let frame = h.seg_out.recv().await.unwrap();
        assert_eq!(frame, vec![0x00, 0x01, 0x03, 0x00, 0x2A]);
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_gets_crc_appended() {
        let mut h = start(BridgeConfig::default());

        h.seg_in.send(vec![0x00, 0x01, 0x03, 0x02]).unwrap();
        let mut buf = [0u8; 6];
        h.rtu.read_exact(&mut buf[..5]).await.unwrap();
        assert_eq!(&buf[..3], &[0x01, 0x03, 0x02]);
        assert_eq!(crc16::checksum(&buf[..5]), 0);
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_response_is_fatal() {
        let h = start(BridgeConfig::default());

        let (_rtu, seg_in, handle) = (h.rtu, h.seg_in, h.handle);
        seg_in.send(vec![0x00, 0x01]).unwrap();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::InvalidLength { actual: 1, minimum: 2 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_catch_response_repeats_next_request_once() {
        let cfg = BridgeConfig {
            multi_acks: true,
            ..BridgeConfig::default()
        };
        let mut h = start(cfg);

        // A response carrying the catch command at offset 2 arms the flag.
        h.seg_in.send(vec![0x00, 0xAA, 0xBB, 0x01]).unwrap();
        let mut buf = [0u8; 5];
        h.rtu.read_exact(&mut buf).await.unwrap();

        let started = Instant::now();
        h.rtu.write_all(&request(&[0x01, 0x06, 0x00])).await.unwrap();
        let first = h.seg_out.recv().await.unwrap();
        let second = h.seg_out.recv().await.unwrap();
        let third = h.seg_out.recv().await.unwrap();
        assert_eq!(first, vec![0x00, 0x01, 0x06, 0x00]);
        assert_eq!(second, first);
        assert_eq!(third, first);
        // Two repeats spaced 50 ms apart.
        assert!(started.elapsed() >= Duration::from_millis(100));

        // The flag is spent: the next request goes out exactly once.
        h.rtu.write_all(&request(&[0x01, 0x06, 0x01])).await.unwrap();
        assert_eq!(h.seg_out.recv().await.unwrap(), vec![0x00, 0x01, 0x06, 0x01]);
        assert!(h.seg_out.try_recv().is_err());
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_catch_ignored_when_multi_acks_disabled() {
        let mut h = start(BridgeConfig::default());

        h.seg_in.send(vec![0x00, 0xAA, 0xBB, 0x01]).unwrap();
        let mut buf = [0u8; 5];
        h.rtu.read_exact(&mut buf).await.unwrap();

        h.rtu.write_all(&request(&[0x01, 0x06, 0x00])).await.unwrap();
        assert_eq!(h.seg_out.recv().await.unwrap(), vec![0x00, 0x01, 0x06, 0x00]);
        assert!(h.seg_out.try_recv().is_err());
        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_rtu_frame_dropped() {
        let mut h = start(BridgeConfig::default());

        h.rtu.write_all(&[0x01]).await.unwrap();
        // Let the inter-byte timeout close the short frame first.
        sleep(Duration::from_millis(50)).await;
        h.rtu.write_all(&request(&[0x01, 0x03])).await.unwrap();
        // Only the well-formed request makes it across.
        assert_eq!(h.seg_out.recv().await.unwrap(), vec![0x00, 0x01, 0x03]);
        h.handle.abort();
    }

    #[test]
    fn test_ack_flag_take_clears() {
        let flag = AckFlag::default();
        assert!(!flag.take());
        flag.arm();
        assert!(flag.take());
        assert!(!flag.take());
    }
}
