//! Modbus RTU frame delimiting
//!
//! RTU frames are delimited by silence on the wire, not by length
//! fields. [`FrameStream`] reads a byte stream and cuts frames on timing:
//! a long initial timeout waits for the first bytes of a request, then a
//! short inter-byte timeout ends the frame once the line goes quiet.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout, Duration};

use crate::constants::{DEFAULT_INITIAL_TIMEOUT_MS, DEFAULT_INTER_BYTE_TIMEOUT_MS, FRAMER_BUF_SIZE};
use crate::error::{BridgeError, BridgeResult};

/// Timeout-delimited frame reader over a byte stream.
pub struct FrameStream<R> {
    reader: R,
    buf: BytesMut,
    initial: Duration,
    inter_byte: Duration,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameStream<R> {
    /// Wrap `reader` with the default Modbus timing.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(FRAMER_BUF_SIZE),
            initial: Duration::from_millis(DEFAULT_INITIAL_TIMEOUT_MS),
            inter_byte: Duration::from_millis(DEFAULT_INTER_BYTE_TIMEOUT_MS),
            eof: false,
        }
    }

    /// Override the frame timing.
    pub fn with_timeouts(mut self, initial: Duration, inter_byte: Duration) -> Self {
        self.initial = initial;
        self.inter_byte = inter_byte;
        self
    }

    /// Read one frame. Returns [`BridgeError::Timeout`] if no byte
    /// arrives within the initial window, which callers treat as an idle
    /// line rather than a failure. The returned slice is valid until the
    /// next call.
    pub async fn read_frame(&mut self) -> BridgeResult<&[u8]> {
        self.buf.clear();
        if self.eof {
            return Err(BridgeError::ConnectionClosed);
        }
        let mut chunk = [0u8; 256];

        // First byte: wait out the idle line.
        match timeout(self.initial, self.reader.read(&mut chunk)).await {
            Err(_) => return Err(BridgeError::Timeout),
            Ok(Ok(0)) => {
                self.eof = true;
                return Err(BridgeError::ConnectionClosed);
            }
            Ok(Ok(n)) => self.push(&chunk[..n])?,
            Ok(Err(e)) => return Err(e.into()),
        }

        // Accumulate until the line goes quiet.
        loop {
            match timeout(self.inter_byte, self.reader.read(&mut chunk)).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    // Deliver what we have; the next call reports EOF.
                    self.eof = true;
                    break;
                }
                Ok(Ok(n)) => self.push(&chunk[..n])?,
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        Ok(&self.buf[..])
    }

    fn push(&mut self, data: &[u8]) -> BridgeResult<()> {
        if self.buf.len() + data.len() > FRAMER_BUF_SIZE {
            return Err(BridgeError::MessageTooLarge {
                len: self.buf.len() + data.len(),
                max: FRAMER_BUF_SIZE,
            });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }
}
