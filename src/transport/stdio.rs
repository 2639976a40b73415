//! Line-delimited stdio transport.
//!
//! - Messages are UTF-8 encoded JSON, one object per line
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from the client
//! - stdout: sends responses to the client
//! - stderr: may be used for logging (never protocol messages)
//!
//! A line whose object carries a `jsonrpc` member is handled as MCP JSON-RPC
//! by one stdio-wide [`ProtocolHandler`]; any other line is a request
//! envelope for the [`Dispatcher`]. Unparseable lines get an error envelope
//! with `request_id = "unknown"`.
//!
//! Every line is handled in its own task, so responses may be written out of
//! order; clients correlate by `request_id` / `id`. A single writer task owns
//! the output stream.

use std::io;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::mcp::protocol::is_json_rpc;
use crate::mcp::{Dispatcher, ProtocolHandler, ResponseEnvelope};

/// A stdio-based transport adapter.
pub struct StdioTransport {
    dispatcher: Arc<Dispatcher>,
    protocol: Arc<ProtocolHandler>,
}

impl StdioTransport {
    /// Creates a transport bound to `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let protocol = Arc::new(ProtocolHandler::new(Arc::clone(&dispatcher)));
        Self {
            dispatcher,
            protocol,
        }
    }

    /// Serves the process's stdin/stdout until EOF or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from stdin fails.
    pub async fn run(&self) -> io::Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();

        tokio::select! {
            result = self.serve(reader, writer) => result.map(|_| ()),
            () = super::shutdown_signal() => Ok(()),
        }
    }

    /// Serves `reader` until EOF, writing responses to `writer`.
    ///
    /// Lines are read as raw bytes, so a line that is not UTF-8 is answered
    /// like any other unparseable line and reading continues. Waits for
    /// in-flight requests to finish and returns the writer once every
    /// response has been written.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the writer task panics.
    pub async fn serve<R, W>(&self, mut reader: R, writer: W) -> io::Result<W>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_lines(writer, rx));

        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = trim_line(&buf);
            if line.is_empty() {
                continue;
            }
            self.handle_line(line, &tx);
        }

        tracing::info!("stdin closed, waiting for in-flight requests");
        drop(tx);

        writer_task.await.map_err(io::Error::other)
    }

    /// Decodes one line and spawns its handling.
    fn handle_line(&self, line: &[u8], tx: &mpsc::UnboundedSender<String>) {
        let value: Value = match serde_json::from_slice(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable input line");
                send_line(tx, ResponseEnvelope::parse_error(e).to_json_line());
                return;
            }
        };

        let fallback = super::panic_reply(&value);
        let fallback_tx = tx.clone();
        let on_panic = move |line: String| send_line(&fallback_tx, line);
        let tx = tx.clone();

        if is_json_rpc(&value) {
            let protocol = Arc::clone(&self.protocol);
            let task = async move {
                if let Some(reply) = protocol.handle_value(value).await {
                    send_line(&tx, reply.to_json_line());
                }
            };
            super::spawn_request(task, fallback, on_panic);
        } else {
            let dispatcher = Arc::clone(&self.dispatcher);
            let task = async move {
                let response = dispatcher.dispatch_value(value).await;
                send_line(&tx, response.to_json_line());
            };
            super::spawn_request(task, fallback, on_panic);
        }
    }
}

/// Strips surrounding ASCII whitespace, including a trailing `\r\n`.
fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}

fn send_line(tx: &mpsc::UnboundedSender<String>, line: String) {
    if tx.send(line).is_err() {
        tracing::warn!("Output stream closed, dropping response");
    }
}

/// Writes queued lines until every sender is gone or a write fails.
async fn write_lines<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>) -> W
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        if let Err(e) = write_raw(&mut writer, &line).await {
            tracing::error!(error = %e, "Failed to write to output stream");
            break;
        }
    }
    writer
}

/// Writes a raw JSON string with newline termination.
async fn write_raw<W>(writer: &mut W, json: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    debug_assert!(
        !json.contains('\n'),
        "JSON message must not contain embedded newlines"
    );

    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    Ok(())
}
