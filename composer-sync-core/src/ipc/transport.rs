//! Frame transports
//!
//! Both ends of the channel exchange whole frames over unbounded mpsc
//! channels. [`in_process_pair`] connects a client and a server directly;
//! `from_stream` bridges either end onto newline-delimited JSON over any
//! async byte stream, such as the gateway process's stdio.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::message::{ClientFrame, Reply};

/// Client end: sends frames, receives replies
#[derive(Debug)]
pub struct ClientTransport {
    /// Outgoing frames
    pub tx: mpsc::UnboundedSender<ClientFrame>,
    /// Incoming replies
    pub rx: mpsc::UnboundedReceiver<Reply>,
}

/// Server end: receives frames, sends replies
#[derive(Debug)]
pub struct ServerTransport {
    /// Incoming frames
    pub rx: mpsc::UnboundedReceiver<ClientFrame>,
    /// Outgoing replies
    pub tx: mpsc::UnboundedSender<Reply>,
}

/// Creates a connected client/server pair in one process
#[must_use]
pub fn in_process_pair() -> (ClientTransport, ServerTransport) {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    (
        ClientTransport {
            tx: frame_tx,
            rx: reply_rx,
        },
        ServerTransport {
            rx: frame_rx,
            tx: reply_tx,
        },
    )
}

impl ClientTransport {
    /// Bridges the client end onto a JSON-lines byte stream
    pub fn from_stream<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (rx, tx, _) = bridge(reader, writer);
        Self { tx, rx }
    }
}

impl ServerTransport {
    /// Bridges the server end onto a JSON-lines byte stream
    pub fn from_stream<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::from_stream_with_writer(reader, writer).0
    }

    /// Like [`Self::from_stream`], also returning the writer task
    ///
    /// The task finishes once every reply sender is dropped and all queued
    /// replies are written, so awaiting it drains the connection.
    pub fn from_stream_with_writer<R, W>(reader: R, writer: W) -> (Self, JoinHandle<()>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (rx, tx, writer) = bridge(reader, writer);
        (Self { rx, tx }, writer)
    }
}

fn bridge<In, Out, R, W>(
    reader: R,
    mut writer: W,
) -> (
    mpsc::UnboundedReceiver<In>,
    mpsc::UnboundedSender<Out>,
    JoinHandle<()>,
)
where
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (in_tx, in_rx) = mpsc::unbounded_channel::<In>();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Out>();

    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read frame");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(frame) => {
                    if in_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Skipping undecodable frame"),
            }
        }
        debug!("Frame reader finished");
    });

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let mut line = match serde_json::to_vec(&frame) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Failed to encode frame");
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(e) = writer.write_all(&line).await {
                warn!(error = %e, "Failed to write frame");
                break;
            }
            if let Err(e) = writer.flush().await {
                warn!(error = %e, "Failed to flush frame");
                break;
            }
        }
        debug!("Frame writer finished");
    });

    (in_rx, out_tx, writer)
}
