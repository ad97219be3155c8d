//! In-memory doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::can::{CanDevice, CanMsg};
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{FrameRead, FrameWrite};

/// CAN device double with scripted inbound batches and a captured outbox.
pub(crate) struct MockCanDevice {
    name: String,
    incoming: Mutex<VecDeque<Vec<CanMsg>>>,
    sent: Mutex<Vec<CanMsg>>,
}

impl MockCanDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            incoming: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Queue a single-message batch for the next device read.
    pub fn push_incoming(&self, msg: CanMsg) {
        self.push_batch(vec![msg]);
    }

    /// Queue a batch of messages delivered by one device read.
    pub fn push_batch(&self, batch: Vec<CanMsg>) {
        self.incoming.lock().unwrap().push_back(batch);
    }

    /// Messages written through the device so far.
    pub fn sent(&self) -> Vec<CanMsg> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl CanDevice for MockCanDevice {
    async fn read_msgs(&self, buf: &mut [CanMsg]) -> BridgeResult<usize> {
        match self.incoming.lock().unwrap().pop_front() {
            Some(batch) => {
                let n = batch.len().min(buf.len());
                buf[..n].copy_from_slice(&batch[..n]);
                Ok(n)
            }
            // An exhausted script behaves like a device returning an
            // empty batch, which callers must treat as an error.
            None => Ok(0),
        }
    }

    async fn write_msg(&self, msg: &CanMsg) -> BridgeResult<()> {
        self.sent.lock().unwrap().push(*msg);
        Ok(())
    }

    async fn close(&self) -> BridgeResult<()> {
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Frame-preserving channel transport: every write arrives as one frame.
pub(crate) struct ChanWrite(pub mpsc::UnboundedSender<Vec<u8>>);

/// Read half of [`chan_pipe`].
pub(crate) struct ChanRead(pub mpsc::UnboundedReceiver<Vec<u8>>);

/// Build a connected frame channel: frames written to the [`ChanWrite`]
/// half pop out of the [`ChanRead`] half one per read.
pub(crate) fn chan_pipe() -> (ChanWrite, ChanRead) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChanWrite(tx), ChanRead(rx))
}

impl FrameWrite for ChanWrite {
    async fn write(&mut self, buf: &[u8]) -> BridgeResult<usize> {
        self.0
            .send(buf.to_vec())
            .map_err(|_| BridgeError::ConnectionClosed)?;
        Ok(buf.len())
    }
}

impl FrameRead for ChanRead {
    async fn read(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        match self.0.recv().await {
            Some(frame) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            }
            None => Err(BridgeError::ConnectionClosed),
        }
    }
}
