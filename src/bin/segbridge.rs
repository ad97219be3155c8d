//! segbridge - Modbus RTU to SEG/CAN bridge
//!
//! Runs an RTU-speaking program as a subprocess (or, with the `serial`
//! feature, opens a serial port) and bridges its framed traffic to a CAN
//! device speaking the SEG segmentation protocol. Without `--can` the
//! SEG side runs over this process's own stdio, which is useful for
//! testing against a peer on a pipe.

use std::process::Stdio;

use clap::{ArgAction, Parser};
use tokio::process::{Child, Command};
use tracing::error;
use tracing_subscriber::EnvFilter;

use voltage_segbridge::transport::{ByteReader, ByteWriter};
use voltage_segbridge::{
    bridge, BridgeConfig, BridgeError, BridgeResult, CanConfig, CanId, SegReader, SegWriter,
};

type BoxRead = Box<dyn tokio::io::AsyncRead + Unpin + Send>;
type BoxWrite = Box<dyn tokio::io::AsyncWrite + Unpin + Send>;

#[derive(Parser, Debug)]
#[command(
    name = "segbridge",
    version,
    about = "Bridge Modbus RTU framed I/O to a SEG/CAN device"
)]
struct Args {
    /// Trace SEG frames to stderr
    #[arg(short = 'D', long)]
    trace_seg: bool,

    /// Trace raw CAN messages to stderr
    #[arg(short = 'C', long)]
    trace_can: bool,

    /// Emulate repeated ACKs for the catch command
    #[arg(long)]
    multi_acks: bool,

    /// SEG frame size in bytes
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(2..=8))]
    frame_size: u8,

    /// Response command byte that triggers duplicate ACKs
    #[arg(long, default_value_t = 0x01)]
    catch_command: u8,

    /// CAN device for the SEG side (default: this process's stdio)
    #[arg(long)]
    can: Option<String>,

    /// CAN transmit identifier (bridge to device)
    #[arg(long, default_value = "0x12345678", value_parser = parse_can_id)]
    can_txid: u32,

    /// CAN receive identifier (device to bridge)
    #[arg(long, default_value = "0x18FA1900", value_parser = parse_can_id)]
    can_rxid: u32,

    /// Use extended (29-bit) CAN identifiers
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    can_ext: bool,

    /// Serial port carrying the RTU side instead of a subprocess
    #[cfg(feature = "serial")]
    #[arg(long)]
    serial: Option<String>,

    /// Serial baud rate
    #[cfg(feature = "serial")]
    #[arg(long, default_value_t = 19200)]
    baud: u32,

    /// Command whose stdio carries the RTU side
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn parse_can_id(s: &str) -> Result<u32, String> {
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| e.to_string())
}

fn init_tracing(args: &Args) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.trace_seg {
        if let Ok(directive) = "seg=trace".parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args);

    if let Err(e) = run(args).await {
        error!("bridge terminated: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> BridgeResult<()> {
    let cfg = BridgeConfig {
        frame_size: args.frame_size as usize,
        multi_acks: args.multi_acks,
        catch_command: args.catch_command,
        ..BridgeConfig::default()
    };

    let (rtu_r, rtu_w, child) = open_rtu(&args).await?;

    let result = match &args.can {
        Some(device) => {
            let can_cfg = CanConfig {
                device: device.clone(),
                options: Vec::new(),
                txid: CanId::new(args.can_txid, args.can_ext),
                rxid: CanId::new(args.can_rxid, args.can_ext),
            };
            run_can(args.trace_can, cfg, can_cfg, rtu_r, rtu_w).await
        }
        None => {
            let seg_tx = SegWriter::new(
                ByteWriter::new(tokio::io::stdout()),
                cfg.frame_size,
                "stdio",
            );
            let seg_rx = SegReader::new(
                ByteReader::new(tokio::io::stdin()),
                cfg.frame_size,
                "stdio",
            );
            bridge::run(rtu_r, rtu_w, seg_tx, seg_rx, cfg).await
        }
    };

    // The subprocess ends with the bridge.
    drop(child);
    result
}

/// Open the RTU side: a serial port when requested, otherwise the stdio
/// of a spawned subprocess.
async fn open_rtu(args: &Args) -> BridgeResult<(BoxRead, BoxWrite, Option<Child>)> {
    #[cfg(feature = "serial")]
    if let Some(path) = &args.serial {
        use tokio_serial::SerialPortBuilderExt;

        let port = tokio_serial::new(path, args.baud)
            .open_native_async()
            .map_err(|e| BridgeError::DeviceOpen {
                device: path.clone(),
                message: e.to_string(),
            })?;
        let (r, w) = tokio::io::split(port);
        return Ok((Box::new(r), Box::new(w), None));
    }

    let (prog, rest) = args
        .command
        .split_first()
        .ok_or_else(|| BridgeError::Config {
            message: "no RTU command given".to_string(),
        })?;
    let mut child = Command::new(prog)
        .args(rest)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;
    let stdin = child.stdin.take().ok_or_else(|| BridgeError::Internal {
        message: "subprocess stdin not captured".to_string(),
    })?;
    let stdout = child.stdout.take().ok_or_else(|| BridgeError::Internal {
        message: "subprocess stdout not captured".to_string(),
    })?;
    Ok((Box::new(stdout), Box::new(stdin), Some(child)))
}

#[cfg(feature = "socketcan")]
async fn run_can(
    trace_can: bool,
    cfg: BridgeConfig,
    can_cfg: CanConfig,
    rtu_r: BoxRead,
    rtu_w: BoxWrite,
) -> BridgeResult<()> {
    use std::sync::Arc;

    use voltage_segbridge::{transport, CanDevice, CanTracer};

    let dev = transport::dial(&can_cfg, None)?;
    let tracer = Arc::new(CanTracer::new(dev));
    tracer.set_enabled(trace_can);
    let dev: Arc<dyn CanDevice> = tracer;

    let (can_tx, can_rx) = transport::split(dev.clone(), &can_cfg);
    let seg_tx = SegWriter::new(can_tx, cfg.frame_size, "can");
    let seg_rx = SegReader::new(can_rx, cfg.frame_size, "can");
    let result = bridge::run(rtu_r, rtu_w, seg_tx, seg_rx, cfg).await;
    let _ = dev.close().await;
    result
}

#[cfg(not(feature = "socketcan"))]
async fn run_can(
    _trace_can: bool,
    _cfg: BridgeConfig,
    can_cfg: CanConfig,
    _rtu_r: BoxRead,
    _rtu_w: BoxWrite,
) -> BridgeResult<()> {
    Err(BridgeError::Unsupported {
        message: format!(
            "CAN device {} requested but built without the socketcan feature",
            can_cfg.device
        ),
    })
}
