//! Real serial port, bridged onto async pipes.
//!
//! `serialport` is blocking, so two pump threads shuttle bytes between the
//! port and a pair of `tokio::io::duplex` pipes, one pipe per direction. Each
//! pump owns its pipe end outright: when the inbound pump stops the transport
//! reads EOF, when the outbound pump stops the next write fails with a broken
//! pipe. Both are fatal to the transport.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::runtime::Handle;
use tracing::{debug, error, info};

use super::TransportError;

/// How long a blocking read waits before the pump checks for work again.
const READ_POLL_TIMEOUT: Duration = Duration::from_millis(100);

const BRIDGE_BUFFER: usize = 1024;

/// Open `port` at `baud` (8N1, no flow control) and return the
/// `(reader, writer)` pair for [`super::Transport::spawn`].
///
/// Must be called from within a Tokio runtime.
pub fn open(port: &str, baud: u32) -> Result<(DuplexStream, DuplexStream), TransportError> {
    let open_error = |source| TransportError::Open {
        port: port.to_string(),
        source,
    };

    let rx_port = serialport::new(port, baud)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .flow_control(FlowControl::None)
        .timeout(READ_POLL_TIMEOUT)
        .open()
        .map_err(open_error)?;
    let tx_port = rx_port.try_clone().map_err(open_error)?;

    info!("Opened serial port {} at {} baud", port, baud);
    bridge(rx_port, tx_port)
}

/// Start the pump threads between a blocking byte source/sink and async pipes.
pub fn bridge<R, W>(source: R, sink: W) -> Result<(DuplexStream, DuplexStream), TransportError>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let (app_reader, inbound) = tokio::io::duplex(BRIDGE_BUFFER);
    let (app_writer, outbound) = tokio::io::duplex(BRIDGE_BUFFER);
    let runtime = Handle::current();

    let inbound_runtime = runtime.clone();
    thread::Builder::new()
        .name("serial-rx".into())
        .spawn(move || pump_inbound(source, inbound, inbound_runtime))
        .map_err(TransportError::Read)?;
    thread::Builder::new()
        .name("serial-tx".into())
        .spawn(move || pump_outbound(outbound, sink, runtime))
        .map_err(TransportError::Write)?;

    Ok((app_reader, app_writer))
}

/// Port → pipe. Read timeouts are idle polls, not errors.
fn pump_inbound<R: Read>(mut port: R, mut pipe: DuplexStream, runtime: Handle) {
    let mut buf = [0u8; 256];
    loop {
        let n = match port.read(&mut buf) {
            Ok(0) => {
                error!("Serial port closed");
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Serial read failed: {}", e);
                break;
            }
        };
        if runtime.block_on(pipe.write_all(&buf[..n])).is_err() {
            debug!("Serial bridge: transport side closed (rx)");
            break;
        }
    }
}

/// Pipe → port.
fn pump_outbound<W: Write>(mut pipe: DuplexStream, mut port: W, runtime: Handle) {
    let mut buf = [0u8; 256];
    loop {
        let n = match runtime.block_on(pipe.read(&mut buf)) {
            Ok(0) | Err(_) => {
                debug!("Serial bridge: transport side closed (tx)");
                break;
            }
            Ok(n) => n,
        };
        if let Err(e) = port.write_all(&buf[..n]).and_then(|_| port.flush()) {
            error!("Serial write failed: {}", e);
            break;
        }
    }
}

/// Names of the serial ports present on this machine.
pub fn list_ports() -> Result<Vec<String>, serialport::Error> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}
