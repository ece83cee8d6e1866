//! Bounded tail of the messaging process's stderr.

use std::collections::VecDeque;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::codec::{Frame, LineCodec};
use crate::supervisor::SupervisorEvent;

/// Number of stderr lines retained per process.
pub const DIAGNOSTIC_CAPACITY: usize = 50;

/// FIFO ring of the most recent stderr lines; oldest evicted first.
#[derive(Debug, Clone)]
pub struct DiagnosticBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticBuffer {
    /// Empty buffer holding at most [`DIAGNOSTIC_CAPACITY`] lines.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DIAGNOSTIC_CAPACITY)
    }

    /// Empty buffer holding at most `capacity` lines (minimum one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// Retained lines in arrival order.
    #[must_use]
    pub fn tail(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Number of retained lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether nothing has been retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for DiagnosticBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward every stderr line to the dispatcher as
/// [`SupervisorEvent::Diagnostic`] until EOF or cancellation.
///
/// Non-UTF-8 lines are forwarded in lossy form; oversized lines are skipped.
pub async fn run_diagnostics_reader<R>(
    generation: u64,
    stderr: R,
    event_tx: mpsc::Sender<SupervisorEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stderr, LineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            item = framed.next() => {
                match item {
                    None => break,
                    Some(Ok(Frame::Oversized)) => {
                        debug!(generation, "stderr reader: skipping oversized line");
                    }
                    Some(Ok(Frame::Line(line) | Frame::Invalid(line))) => {
                        debug!(generation, line = line.as_str(), "messaging cli stderr");
                        let tagged = SupervisorEvent::Diagnostic { generation, line };
                        if event_tx.send(tagged).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(generation, error = %e, "stderr reader: read failed, stopping");
                        break;
                    }
                }
            }
        }
    }
}
