//! CAN message tracer
//!
//! [`CanTracer`] wraps any [`CanDevice`] and logs every non-status frame
//! crossing it as one formatted line: direction arrow, zero-padded hex
//! identifier (8 digits for extended frames, 3 for standard), and the
//! payload as hex bytes. Status frames log their bus state names instead.
//!
//! Tracing is purely observational: frame content, ordering and results
//! pass through unchanged. The enabled flag and the output sink live
//! behind one mutex so tracing can be toggled while I/O is in flight.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::can::{hex, CanDevice, CanMsg};
use crate::error::BridgeResult;

struct TracerState {
    enabled: bool,
    out: Box<dyn Write + Send>,
}

/// Logging decorator around a CAN device.
pub struct CanTracer<D> {
    dev: D,
    state: Mutex<TracerState>,
}

impl<D: CanDevice> CanTracer<D> {
    /// Wrap `dev`, logging to stderr. Starts disabled.
    pub fn new(dev: D) -> Self {
        Self::with_sink(dev, Box::new(std::io::stderr()))
    }

    /// Wrap `dev` with an explicit output sink. Starts disabled.
    pub fn with_sink(dev: D, out: Box<dyn Write + Send>) -> Self {
        Self {
            dev,
            state: Mutex::new(TracerState {
                enabled: false,
                out,
            }),
        }
    }

    /// Toggle tracing. Safe to call concurrently with I/O.
    pub fn set_enabled(&self, enabled: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.enabled = enabled;
        }
    }

    fn log(&self, dir: &str, msg: &CanMsg) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if !state.enabled {
            return;
        }
        let line = if msg.is_status() {
            format!("{dir} CAN {}\n", msg.status_names())
        } else {
            let digits = if msg.ext_frame() { 8 } else { 3 };
            format!(
                "{dir} CAN {id:0digits$X}\t{data}\n",
                id = msg.id,
                data = hex(msg.payload())
            )
        };
        let _ = state.out.write_all(line.as_bytes());
    }
}

#[async_trait]
impl<D: CanDevice> CanDevice for CanTracer<D> {
    async fn read_msgs(&self, buf: &mut [CanMsg]) -> BridgeResult<usize> {
        let n = self.dev.read_msgs(buf).await?;
        for msg in &buf[..n] {
            self.log("->", msg);
        }
        Ok(n)
    }

    async fn write_msg(&self, msg: &CanMsg) -> BridgeResult<()> {
        if !msg.is_status() {
            self.log("<-", msg);
        }
        self.dev.write_msg(msg).await
    }

    async fn close(&self) -> BridgeResult<()> {
        self.dev.close().await
    }

    fn name(&self) -> String {
        self.dev.name()
    }
}
