//! SEG segmentation codec
//!
//! Carries arbitrary-length messages over a transport with a small fixed
//! frame size (typically a CAN payload, 8 bytes). Every frame spends its
//! first byte on control; the rest is message content:
//!
//! - `0x00`: a complete message in one frame.
//! - `0x80 | n`: start of a segmented message followed by `n`
//!   continuation frames.
//! - `1..=0x7F`: continuation frame carrying its own sequence number.
//!
//! The reader is resynchronizing: any frame that does not fit the
//! expected sequence is dropped together with the partial message, an
//! error counter is bumped, and scanning restarts at the next start or
//! single frame. Decode errors never surface to the caller.

use bytes::BytesMut;
use tracing::trace;

use crate::can::hex;
use crate::constants::{MAX_CONT_COUNT, SEG_START_BIT};
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{FrameRead, FrameWrite};

/// Receive states: scanning for a message boundary, or collecting
/// continuations of one in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvState {
    ExpectStartOrSingle,
    ExpectContinuation,
}

/// Segmenting message writer.
pub struct SegWriter<W> {
    conn: W,
    wbuf: Vec<u8>,
    name: String,
}

impl<W: FrameWrite> SegWriter<W> {
    /// Create a writer producing frames of `frame_size` bytes.
    pub fn new(conn: W, frame_size: usize, name: impl Into<String>) -> Self {
        assert!(frame_size >= 2, "SEG frame size must be at least 2");
        Self {
            conn,
            wbuf: vec![0u8; frame_size],
            name: name.into(),
        }
    }

    /// Write one message, segmenting as needed. Returns the number of
    /// message bytes written.
    pub async fn write_msg(&mut self, msg: &[u8]) -> BridgeResult<usize> {
        let nb = self.wbuf.len() - 1;
        let max = nb * (MAX_CONT_COUNT as usize + 1);
        if msg.len() > max {
            return Err(BridgeError::MessageTooLarge {
                len: msg.len(),
                max,
            });
        }

        let mut rest = msg;
        let mut icont: u8 = 0;
        let mut sent = 0usize;
        loop {
            let n = rest.len();
            if n <= nb {
                // Final frame: a single for unsegmented messages,
                // otherwise the last continuation.
                let (ctrl, event) = if icont == 0 { (0, "single") } else { (icont, "cont") };
                self.wbuf[0] = ctrl;
                self.wbuf[1..1 + n].copy_from_slice(rest);
                let res = self.conn.write(&self.wbuf[..n + 1]).await;
                self.trace("<-", event, &self.wbuf[..n + 1]);
                res?;
                sent += n;
                return Ok(sent);
            }
            let (ctrl, event) = if icont == 0 {
                ((((n - 1) / nb) as u8) | SEG_START_BIT, "start")
            } else {
                (icont, "cont")
            };
            self.wbuf[0] = ctrl;
            self.wbuf[1..].copy_from_slice(&rest[..nb]);
            let res = self.conn.write(&self.wbuf[..]).await;
            self.trace("<-", event, &self.wbuf[..]);
            res?;
            rest = &rest[nb..];
            sent += nb;
            icont += 1;
        }
    }

    fn trace(&self, dir: &str, event: &str, frame: &[u8]) {
        trace!(target: "seg", "{dir} seg/{} {event} {}", self.name, hex(frame));
    }
}

/// Reassembling message reader.
pub struct SegReader<R> {
    conn: R,
    rbuf: Vec<u8>,
    rmsg: BytesMut,
    name: String,
    nerr: u64,
}

impl<R: FrameRead> SegReader<R> {
    /// Create a reader consuming frames of up to `frame_size` bytes.
    pub fn new(conn: R, frame_size: usize, name: impl Into<String>) -> Self {
        assert!(frame_size >= 2, "SEG frame size must be at least 2");
        Self {
            conn,
            rbuf: vec![0u8; frame_size],
            rmsg: BytesMut::new(),
            name: name.into(),
            nerr: 0,
        }
    }

    /// Read the next complete message. Blocks across malformed input,
    /// resynchronizing until a whole message arrives. The returned slice
    /// is valid until the next call.
    pub async fn read_msg(&mut self) -> BridgeResult<&[u8]> {
        self.rmsg.clear();
        let mut state = RecvState::ExpectStartOrSingle;
        let mut icont: u8 = 0;
        let mut ncont: u8 = 0;
        loop {
            let n = self.conn.read(&mut self.rbuf).await?;
            if n == 0 {
                self.resync(&mut state, &[]);
                continue;
            }
            let ctrl = self.rbuf[0];
            match state {
                RecvState::ExpectStartOrSingle => {
                    if ctrl == 0 {
                        self.trace("->", "single", n);
                        self.rmsg.extend_from_slice(&self.rbuf[1..n]);
                        return Ok(&self.rmsg[..]);
                    }
                    if ctrl & SEG_START_BIT == 0 {
                        // Continuation with no message in progress.
                        let frame = self.rbuf[..n].to_vec();
                        self.resync(&mut state, &frame);
                        continue;
                    }
                    ncont = ctrl & !SEG_START_BIT;
                    icont = 0;
                    state = RecvState::ExpectContinuation;
                    self.trace("->", "start", n);
                }
                RecvState::ExpectContinuation => {
                    if ctrl & SEG_START_BIT != 0 || ctrl != icont {
                        let frame = self.rbuf[..n].to_vec();
                        self.resync(&mut state, &frame);
                        continue;
                    }
                    self.trace("->", "cont", n);
                }
            }
            self.rmsg.extend_from_slice(&self.rbuf[1..n]);
            if icont == ncont {
                return Ok(&self.rmsg[..]);
            }
            icont += 1;
        }
    }

    /// Decode errors seen since creation.
    pub fn error_count(&self) -> u64 {
        self.nerr
    }

    fn resync(&mut self, state: &mut RecvState, frame: &[u8]) {
        self.nerr += 1;
        // Drop any partially reassembled message with the bad frame.
        self.rmsg.clear();
        *state = RecvState::ExpectStartOrSingle;
        trace!(target: "seg", "-> seg/{} ?? {}", self.name, hex(frame));
    }

    fn trace(&self, dir: &str, event: &str, n: usize) {
        trace!(target: "seg", "{dir} seg/{} {event} {}", self.name, hex(&self.rbuf[..n]));
    }
}
