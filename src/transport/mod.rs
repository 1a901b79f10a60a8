//! Serial transport: one read loop and one write loop bridging raw lines to
//! typed message/command queues.
//!
//! The loops are generic over `AsyncRead`/`AsyncWrite`; [`serial`] provides the
//! real port, tests use in-memory pipes.

pub mod serial;

use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::protocol::{self, Command, DeviceMessage, ProtocolError};

/// Default line speed of the panel firmware.
pub const DEFAULT_BAUD: u32 = 19_200;

/// Capacity of both the inbound message and the outbound command queue.
pub const QUEUE_CAPACITY: usize = 8;

/// Longest line accepted from the device, excluding the newline.
pub const MAX_LINE_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial read failed: {0}")]
    Read(#[source] io::Error),
    #[error("serial write failed: {0}")]
    Write(#[source] io::Error),
    #[error("serial link closed by device")]
    Closed,
    #[error("line from device exceeds {MAX_LINE_LEN} bytes")]
    LineTooLong,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Handles to a running transport.
pub struct Transport {
    /// Messages parsed from the device, in arrival order.
    pub messages: mpsc::Receiver<DeviceMessage>,
    /// Commands to write to the device, in send order.
    pub commands: mpsc::Sender<Command>,
    /// Completes with `Err` as soon as either loop fails.
    pub task: JoinHandle<Result<(), TransportError>>,
}

impl Transport {
    /// Start the read and write loops over an open link.
    ///
    /// A `Reset` goes out before anything else. Cancelling `shutdown` stops the
    /// read loop and lets the write loop drain commands already queued.
    pub fn spawn<R, W>(reader: R, writer: W, shutdown: CancellationToken) -> Transport
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (message_tx, message_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(QUEUE_CAPACITY);

        let task = tokio::spawn(async move {
            let result = tokio::try_join!(
                read_loop(reader, message_tx, shutdown.clone()),
                write_loop(writer, command_rx, shutdown),
            );
            match result {
                Ok(_) => {
                    info!("Transport stopped");
                    Ok(())
                }
                Err(e) => {
                    error!("Transport failed: {}", e);
                    Err(e)
                }
            }
        });

        Transport {
            messages: message_rx,
            commands: command_tx,
            task,
        }
    }
}

async fn read_loop<R>(
    reader: R,
    messages: mpsc::Sender<DeviceMessage>,
    shutdown: CancellationToken,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Read loop: shutdown");
                return Ok(());
            }
            read = read_line(&mut reader, &mut line) => read?,
        };

        if read == 0 {
            return Err(TransportError::Closed);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let msg = protocol::parse_message(trimmed)?;
        debug!("<- {}", msg);

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            sent = messages.send(msg) => {
                if sent.is_err() {
                    debug!("Read loop: message receiver dropped");
                    return Ok(());
                }
            }
        }
    }
}

/// Read one newline-terminated line, refusing to buffer more than
/// `MAX_LINE_LEN` bytes of it. Returns 0 at EOF.
async fn read_line<R>(reader: &mut BufReader<R>, line: &mut String) -> Result<usize, TransportError>
where
    R: AsyncRead + Unpin,
{
    // +2 leaves room for a CRLF terminator
    let limit = (MAX_LINE_LEN + 2) as u64;
    let read = (&mut *reader)
        .take(limit)
        .read_line(line)
        .await
        .map_err(TransportError::Read)?;

    if read as u64 == limit && !line.ends_with('\n') {
        return Err(TransportError::LineTooLong);
    }
    if line.trim_end_matches(['\r', '\n']).len() > MAX_LINE_LEN {
        return Err(TransportError::LineTooLong);
    }
    Ok(read)
}

async fn write_loop<W>(
    mut writer: W,
    mut commands: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    info!("Resetting panel");
    write_command(&mut writer, &Command::Reset).await?;

    loop {
        tokio::select! {
            biased;
            cmd = commands.recv() => match cmd {
                Some(cmd) => write_command(&mut writer, &cmd).await?,
                None => {
                    debug!("Write loop: all command senders dropped");
                    return Ok(());
                }
            },
            _ = shutdown.cancelled() => break,
        }
    }

    // Flush out whatever was queued before shutdown (exit animation)
    commands.close();
    while let Some(cmd) = commands.recv().await {
        write_command(&mut writer, &cmd).await?;
    }
    debug!("Write loop: drained");
    Ok(())
}

async fn write_command<W>(writer: &mut W, cmd: &Command) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = protocol::serialize(cmd);
    line.push('\n');
    debug!("-> {}", cmd);
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(TransportError::Write)?;
    writer.flush().await.map_err(TransportError::Write)
}
