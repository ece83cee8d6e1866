//! Messaging process supervision.
//!
//! The supervisor owns at most one live child process. Its background tasks
//! (stdout reader, stderr reader, stdin writer, exit monitor) never touch
//! controller state directly; they only send generation-tagged
//! [`SupervisorEvent`]s to the dispatcher, which feeds them back through
//! [`ProcessSupervisor::on_event`](process::ProcessSupervisor::on_event).

pub mod diagnostics;
pub mod process;
pub mod spawner;

use serde::{Deserialize, Serialize};

use crate::models::event::{ProtocolEvent, ReadyEvent};

/// Raw output of a supervised process, tagged with its generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A recognised stdout event.
    Protocol {
        /// Process generation that produced the event.
        generation: u64,
        /// Parsed event.
        event: ProtocolEvent,
    },
    /// One stderr line.
    Diagnostic {
        /// Process generation that produced the line.
        generation: u64,
        /// Line content without the terminator.
        line: String,
    },
    /// The child exited and its streams have drained.
    Exited {
        /// Process generation that exited.
        generation: u64,
        /// Exit code; `None` when terminated by a signal.
        code: Option<i32>,
        /// Whether the grace timer killed the process.
        forced: bool,
    },
}

/// Lifecycle state reported by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// No process has been started yet.
    Stopped,
    /// Spawned, waiting for the first `ready`.
    Starting,
    /// `ready` received; commands are accepted.
    Ready,
    /// `stop` requested; waiting for exit or the grace timer.
    Stopping,
    /// The last process exited; a new one may be started.
    Exited,
}

/// What the dispatcher should act on after feeding an event to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Supervised {
    /// An event from the live process, including its final
    /// [`ProtocolEvent::Exit`]. A `ready` arrives here only once per process.
    Event(ProtocolEvent),
    /// A `ready` after the first one from the same process.
    RepeatedReady(ReadyEvent),
    /// The process exited with a failure code before reaching readiness.
    StartupFailure {
        /// Exit code; `None` when terminated by a signal.
        code: Option<i32>,
        /// Last stderr lines, oldest first.
        diagnostics: Vec<String>,
    },
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    /// Nothing was running.
    NotRunning,
    /// A stop was already in progress.
    AlreadyStopping,
    /// `stop` sent (when writable) and the grace timer armed.
    Requested,
}
