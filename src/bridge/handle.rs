//! Cloneable host-side handle to a running [`BridgeController`](super::BridgeController).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::bridge::{BridgeStatus, ControlRequest};
use crate::mode::{ModeRouter, TurnDirective};
use crate::models::command::{ProtocolCommand, ReactionAction, RemoteAttachment};
use crate::supervisor::StopRequest;
use crate::{AppError, Result};

/// Host-side entry point: tool invocations, lifecycle requests and turn
/// preparation.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    requests: mpsc::Sender<ControlRequest>,
    router: Arc<ModeRouter>,
}

impl BridgeHandle {
    pub(crate) fn new(requests: mpsc::Sender<ControlRequest>, router: Arc<ModeRouter>) -> Self {
        Self { requests, router }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| AppError::Closed("bridge dispatcher has stopped".into()))?;
        rx.await
            .map_err(|_| AppError::Closed("bridge dispatcher dropped the request".into()))
    }

    /// Forward `command` to the live process.
    ///
    /// Returns whether the command was handed to the writer; `false` means
    /// the stream was unwritable and the command was dropped.
    ///
    /// # Errors
    ///
    /// [`AppError::NotReady`] before the process is ready, or
    /// [`AppError::Closed`] after shutdown.
    pub async fn command(&self, command: ProtocolCommand) -> Result<bool> {
        self.request(|reply| ControlRequest::Command { command, reply })
            .await?
    }

    /// Send a text message, optionally as a reply.
    ///
    /// # Errors
    ///
    /// See [`BridgeHandle::command`].
    pub async fn send_text(&self, text: impl Into<String>, reply_to: Option<String>) -> Result<bool> {
        self.command(ProtocolCommand::Send {
            text: text.into(),
            reply_to,
        })
        .await
    }

    /// Add or remove a reaction.
    ///
    /// # Errors
    ///
    /// See [`BridgeHandle::command`].
    pub async fn react(
        &self,
        message_id: impl Into<String>,
        emoji: impl Into<String>,
        action: ReactionAction,
    ) -> Result<bool> {
        self.command(ProtocolCommand::React {
            message_id: message_id.into(),
            emoji: emoji.into(),
            action,
        })
        .await
    }

    /// Send a local file as an attachment.
    ///
    /// # Errors
    ///
    /// See [`BridgeHandle::command`].
    pub async fn attach(
        &self,
        file: PathBuf,
        mime_type: Option<String>,
        reply_to: Option<String>,
    ) -> Result<bool> {
        self.command(ProtocolCommand::Attach {
            file,
            mime_type,
            reply_to,
        })
        .await
    }

    /// Send an already-uploaded encrypted attachment.
    ///
    /// # Errors
    ///
    /// See [`BridgeHandle::command`].
    pub async fn remote_attach(&self, attachment: RemoteAttachment) -> Result<bool> {
        self.command(ProtocolCommand::RemoteAttach(attachment)).await
    }

    /// Start a new process after the previous one exited.
    ///
    /// # Errors
    ///
    /// [`AppError::AlreadyRunning`] while a process is live,
    /// [`AppError::CollaboratorUnavailable`] when the CLI cannot be spawned.
    pub async fn start(&self) -> Result<u64> {
        self.request(|reply| ControlRequest::Start { reply }).await?
    }

    /// Ask the live process to exit.
    ///
    /// # Errors
    ///
    /// [`AppError::Closed`] after shutdown.
    pub async fn stop(&self) -> Result<StopRequest> {
        self.request(|reply| ControlRequest::Stop { reply }).await
    }

    /// Snapshot the bridge state.
    ///
    /// # Errors
    ///
    /// [`AppError::Closed`] after shutdown.
    pub async fn status(&self) -> Result<BridgeStatus> {
        self.request(|reply| ControlRequest::Status { reply }).await
    }

    /// Record that the operator triggered the next turn locally.
    pub fn observe_local_input(&self) {
        debug!("local input observed");
        self.router.mark_local();
    }

    /// Routing directive for the next reasoning turn.
    #[must_use]
    pub fn prepare_turn(&self, base_instructions: &str) -> TurnDirective {
        self.router.prepare_turn(base_instructions)
    }

    /// Shared mode router.
    #[must_use]
    pub fn router(&self) -> &Arc<ModeRouter> {
        &self.router
    }

    /// Stop the process (forcing it after the grace period), persist the
    /// session and wait for the dispatcher to finish.
    ///
    /// Calling this on an already stopped bridge is a no-op.
    pub async fn shutdown(&self) {
        if self
            .request(|reply| ControlRequest::Shutdown { reply })
            .await
            .is_err()
        {
            debug!("bridge already shut down");
        }
    }
}
