//! Protocol writer task.
//!
//! Commands are fire-and-forget: the dispatcher offers each one to a bounded
//! channel with [`CommandSink::offer`], and the writer task serialises it as
//! one compact JSON line on the process's stdin. A full channel, a closed
//! channel, or a failed write all mean "not writable" and the command is
//! dropped. Delivery is confirmed by the process's `sent` events, not here.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::command::ProtocolCommand;
use crate::{AppError, Result};

/// Serialise `command` to a `\n`-terminated ndjson line.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] if serialisation fails.
pub fn encode_command(command: &ProtocolCommand) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(command)
        .map_err(|e| AppError::Protocol(format!("failed to serialise command: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Dispatcher-side handle on the writer task's input.
#[derive(Debug, Clone)]
pub struct CommandSink {
    tx: mpsc::Sender<ProtocolCommand>,
}

impl CommandSink {
    /// Wrap the sending half of the writer channel.
    #[must_use]
    pub fn new(tx: mpsc::Sender<ProtocolCommand>) -> Self {
        Self { tx }
    }

    /// Whether the stream still accepts commands.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Hand `command` to the writer without waiting.
    ///
    /// Returns `false` when the command was dropped because the stream is not
    /// writable at this moment.
    pub fn offer(&self, command: ProtocolCommand) -> bool {
        let kind = command.kind();
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(err) => {
                debug!(kind, error = %err, "protocol writer: stream not writable, dropping command");
                false
            }
        }
    }
}

/// Writer task. Drains `cmd_rx` into `stdin` until cancelled, the channel
/// closes, or a write fails.
///
/// On a failed write the task returns, which closes the channel and makes
/// every later [`CommandSink::offer`] a silent drop.
pub async fn run_writer<W>(
    generation: u64,
    mut stdin: W,
    mut cmd_rx: mpsc::Receiver<ProtocolCommand>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(generation, "protocol writer: cancellation received, stopping");
                break;
            }

            command = cmd_rx.recv() => {
                let Some(command) = command else {
                    debug!(generation, "protocol writer: command channel closed, stopping");
                    break;
                };

                let bytes = match encode_command(&command) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        debug!(generation, error = %e, "protocol writer: dropping unencodable command");
                        continue;
                    }
                };

                let written = async {
                    stdin.write_all(&bytes).await?;
                    stdin.flush().await
                }
                .await;

                if let Err(e) = written {
                    debug!(generation, error = %e, kind = command.kind(), "protocol writer: write failed, stream closed");
                    break;
                }
            }
        }
    }
}
