//! The bridge controller and the handle the host uses to drive it.
//!
//! [`controller::BridgeController`] is a single dispatcher task that owns the
//! session, the process supervisor and the state store. Everything else
//! reaches it through messages: background process tasks via the supervisor
//! event channel, the host via [`handle::BridgeHandle`].

pub mod controller;
pub mod handle;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::mode::RouteMode;
use crate::models::command::ProtocolCommand;
use crate::models::event::ExitEvent;
use crate::models::session::Watermark;
use crate::supervisor::{ProcessState, StopRequest};
use crate::Result;

pub use controller::BridgeController;
pub use handle::BridgeHandle;

/// Point-in-time view of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    /// Supervisor lifecycle state.
    pub state: ProcessState,
    /// Generation of the live process.
    pub generation: Option<u64>,
    /// OS pid of the live process.
    pub pid: Option<u32>,
    /// Current conversation.
    pub conversation_id: Option<String>,
    /// Invite link for the current conversation.
    pub invite_url: Option<String>,
    /// QR code image for the invite link.
    pub qr_code_path: Option<String>,
    /// Newest accounted-for send time.
    pub last_seen_watermark: Option<Watermark>,
    /// Route of the most recent turn trigger.
    pub mode: RouteMode,
    /// How the previous process ended.
    pub last_exit: Option<ExitEvent>,
}

/// Requests from [`BridgeHandle`] to the dispatcher.
#[derive(Debug)]
pub(crate) enum ControlRequest {
    /// Forward a command to the live process.
    Command {
        command: ProtocolCommand,
        reply: oneshot::Sender<Result<bool>>,
    },
    /// Spawn a new process if none is live.
    Start { reply: oneshot::Sender<Result<u64>> },
    /// Ask the live process to exit.
    Stop { reply: oneshot::Sender<StopRequest> },
    /// Snapshot the bridge state.
    Status { reply: oneshot::Sender<BridgeStatus> },
    /// Stop the process, persist, and end the dispatcher.
    Shutdown { reply: oneshot::Sender<()> },
}
