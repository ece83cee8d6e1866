//! Single-dispatcher bridge controller.
//!
//! All session and process state is mutated here and nowhere else. The
//! dispatcher reacts to two inputs: [`SupervisorEvent`]s from the live
//! process's background tasks, and [`ControlRequest`]s from the host. Every
//! session mutation is persisted before the next input is handled.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::attachment::AttachmentResolver;
use crate::bridge::handle::BridgeHandle;
use crate::bridge::{BridgeStatus, ControlRequest};
use crate::collaborator::Collaborator;
use crate::config::BridgeConfig;
use crate::host::{BridgeNotice, HostBus, HostMessage};
use crate::mode::ModeRouter;
use crate::models::event::{InboundMessage, ProtocolEvent, ReadyEvent};
use crate::models::session::{Session, Watermark};
use crate::orchestrator::catch_up::{CatchUpReconciler, CatchUpSettings};
use crate::persistence::state_store::StateStore;
use crate::supervisor::process::{ProcessSupervisor, SupervisorSettings};
use crate::supervisor::spawner::launch_args;
use crate::supervisor::{Supervised, SupervisorEvent};
use crate::{AppError, Result};

/// Owner of the session, the supervisor and the state store.
pub struct BridgeController {
    config: BridgeConfig,
    supervisor: ProcessSupervisor,
    events: mpsc::Receiver<SupervisorEvent>,
    requests: mpsc::Receiver<ControlRequest>,
    requests_open: bool,
    session: Session,
    store: StateStore,
    host: Arc<dyn HostBus>,
    router: Arc<ModeRouter>,
    catch_up: CatchUpReconciler,
    attachments: AttachmentResolver,
    catch_up_pending: bool,
    shutting_down: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl std::fmt::Debug for BridgeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeController")
            .field("state", &self.supervisor.state())
            .field("session", &self.session)
            .field("store", &self.store)
            .field("shutting_down", &self.shutting_down)
            .finish_non_exhaustive()
    }
}

impl BridgeController {
    /// Probe the messaging CLI, load the persisted session, start the
    /// process and spawn the dispatcher.
    ///
    /// # Errors
    ///
    /// - [`AppError::CollaboratorUnavailable`] when the CLI cannot be
    ///   invoked; a [`BridgeNotice::CollaboratorUnavailable`] is emitted and
    ///   nothing is spawned.
    /// - [`AppError::Io`] when the process cannot be spawned for another
    ///   reason.
    pub async fn init(
        config: BridgeConfig,
        host: Arc<dyn HostBus>,
        collaborator: Arc<dyn Collaborator>,
    ) -> Result<BridgeHandle> {
        if let Err(err) = collaborator.check_available().await {
            warn!(%err, "messaging cli unavailable, bridge not started");
            host.notify(BridgeNotice::CollaboratorUnavailable {
                reason: err.to_string(),
            });
            return Err(err);
        }

        let store = StateStore::new(config.state_path());
        let session = store.load();
        info!(
            path = %store.path().display(),
            conversation_id = session.conversation_id.as_deref().unwrap_or(""),
            "bridge initialising"
        );

        let (event_tx, event_rx) = mpsc::channel(config.process.event_buffer.max(1));
        let (request_tx, request_rx) = mpsc::channel(config.process.command_buffer.max(1));
        let router = Arc::new(ModeRouter::new());

        let mut controller = Self {
            supervisor: ProcessSupervisor::new(SupervisorSettings::from_config(&config), event_tx),
            events: event_rx,
            requests: request_rx,
            requests_open: true,
            session,
            store,
            host,
            router: Arc::clone(&router),
            catch_up: CatchUpReconciler::new(
                Arc::clone(&collaborator),
                CatchUpSettings::from_config(&config),
            ),
            attachments: AttachmentResolver::from_config(collaborator, &config),
            catch_up_pending: false,
            shutting_down: false,
            shutdown_waiters: Vec::new(),
            config,
        };

        controller.start_process()?;
        tokio::spawn(controller.run());

        Ok(BridgeHandle::new(request_tx, router))
    }

    async fn run(mut self) {
        loop {
            if self.shutting_down && !self.supervisor.is_live() {
                break;
            }

            tokio::select! {
                biased;

                Some(event) = self.events.recv() => self.on_supervisor_event(event).await,
                request = self.requests.recv(), if self.requests_open => match request {
                    Some(request) => self.on_request(request),
                    None => {
                        debug!("all bridge handles dropped");
                        self.requests_open = false;
                        self.begin_shutdown();
                    }
                },
            }
        }

        self.persist().await;
        info!("bridge dispatcher stopped");
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn start_process(&mut self) -> Result<u64> {
        let args = launch_args(&self.config, &self.session);
        match self.supervisor.start(&args) {
            Ok(generation) => {
                self.catch_up_pending = true;
                Ok(generation)
            }
            Err(AppError::CollaboratorUnavailable(reason)) => {
                warn!(%reason, "messaging cli could not be spawned");
                self.host.notify(BridgeNotice::CollaboratorUnavailable {
                    reason: reason.clone(),
                });
                Err(AppError::CollaboratorUnavailable(reason))
            }
            Err(err) => Err(err),
        }
    }

    fn begin_shutdown(&mut self) {
        if !self.shutting_down {
            info!("bridge shutting down");
        }
        self.shutting_down = true;
        self.supervisor.stop();
    }

    fn on_request(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Command { command, reply } => {
                let kind = command.kind();
                let result = self.supervisor.send(command);
                if let Err(err) = &result {
                    debug!(command = kind, %err, "command rejected");
                }
                let _ = reply.send(result);
            }
            ControlRequest::Start { reply } => {
                let result = if self.shutting_down {
                    Err(AppError::Closed("bridge is shutting down".into()))
                } else {
                    self.start_process()
                };
                let _ = reply.send(result);
            }
            ControlRequest::Stop { reply } => {
                let _ = reply.send(self.supervisor.stop());
            }
            ControlRequest::Status { reply } => {
                let _ = reply.send(self.status());
            }
            ControlRequest::Shutdown { reply } => {
                self.shutdown_waiters.push(reply);
                self.begin_shutdown();
            }
        }
    }

    fn status(&self) -> BridgeStatus {
        BridgeStatus {
            state: self.supervisor.state(),
            generation: self.supervisor.generation(),
            pid: self.supervisor.pid(),
            conversation_id: self.session.conversation_id.clone(),
            invite_url: self.session.invite_url.clone(),
            qr_code_path: self.session.qr_code_path.clone(),
            last_seen_watermark: self.session.watermark(),
            mode: self.router.mode(),
            last_exit: self.supervisor.last_exit(),
        }
    }

    async fn on_supervisor_event(&mut self, event: SupervisorEvent) {
        match self.supervisor.on_event(event) {
            Some(Supervised::Event(event)) => self.on_protocol_event(event).await,
            Some(Supervised::RepeatedReady(ready)) => self.on_repeated_ready(ready).await,
            Some(Supervised::StartupFailure { code, diagnostics }) => {
                warn!(code, lines = diagnostics.len(), "messaging process failed to start");
                self.catch_up_pending = false;
                self.host
                    .notify(BridgeNotice::StartupFailure { code, diagnostics });
            }
            None => {}
        }
    }

    async fn on_protocol_event(&mut self, event: ProtocolEvent) {
        debug!(kind = event.kind(), "dispatching event");
        match event {
            ProtocolEvent::Ready(ready) => self.on_ready(ready).await,
            ProtocolEvent::Message(message) => self.on_message(message).await,
            ProtocolEvent::MemberJoined { inbox_id } => {
                info!(%inbox_id, "member joined");
                self.host.notify(BridgeNotice::MemberJoined { inbox_id });
            }
            ProtocolEvent::Sent(sent) => {
                if let Some(watermark) = sent.watermark() {
                    self.advance(watermark).await;
                }
                self.host.notify(BridgeNotice::Delivered { id: sent.id });
            }
            ProtocolEvent::Error { message } => {
                warn!(%message, "messaging process reported an error");
                self.host.notify(BridgeNotice::ProtocolError { message });
            }
            ProtocolEvent::Exit(exit) => {
                self.catch_up_pending = false;
                self.persist().await;
                self.host.notify(BridgeNotice::ProcessExited {
                    code: exit.code,
                    forced: exit.forced,
                });
            }
        }
    }

    async fn on_ready(&mut self, ready: ReadyEvent) {
        let resumed = self.session.attach(
            &ready.conversation_id,
            ready.invite_url.clone(),
            ready.qr_code_path.clone(),
        );
        self.persist().await;
        info!(
            conversation_id = %ready.conversation_id,
            resumed,
            "conversation ready"
        );
        self.host.notify(BridgeNotice::Ready {
            conversation_id: ready.conversation_id.clone(),
            invite_url: self.session.invite_url.clone(),
            qr_code_path: self.session.qr_code_path.clone(),
            resumed,
        });

        if !std::mem::take(&mut self.catch_up_pending) || !resumed {
            return;
        }
        let Some(after) = self.session.watermark() else {
            debug!("no stored watermark, nothing to catch up");
            return;
        };

        if let Some(plan) = self
            .catch_up
            .reconcile(&ready.conversation_id, after)
            .await
        {
            if let Some(summary) = plan.summary {
                self.router.mark_remote();
                self.host.publish(summary);
            }
            if let Some(watermark) = plan.max_watermark {
                self.advance(watermark).await;
            }
        }
    }

    /// The conversation is bound once per process; later `ready` events may
    /// only refresh the invite details of that same conversation.
    async fn on_repeated_ready(&mut self, ready: ReadyEvent) {
        if self.session.conversation_id.as_deref() != Some(ready.conversation_id.as_str()) {
            warn!(
                conversation_id = %ready.conversation_id,
                "ignoring ready for a different conversation"
            );
            return;
        }
        let mut changed = false;
        if ready.invite_url.is_some() && ready.invite_url != self.session.invite_url {
            self.session.invite_url = ready.invite_url;
            changed = true;
        }
        if ready.qr_code_path.is_some() {
            self.session.qr_code_path = ready.qr_code_path;
        }
        if changed {
            self.persist().await;
        }
    }

    async fn on_message(&mut self, message: InboundMessage) {
        if let Some(watermark) = message.watermark() {
            self.advance(watermark).await;
        } else {
            debug!(id = %message.id, "message carries no usable send time");
        }

        let publish = match self.attachments.resolve(&message).await {
            Some(resolved) => resolved,
            None => HostMessage::remote_text(&message),
        };
        self.router.mark_remote();
        self.host.publish(publish);
    }

    async fn advance(&mut self, watermark: Watermark) {
        if self.session.advance_watermark(watermark) {
            self.persist().await;
        }
    }

    async fn persist(&mut self) {
        self.store.save(&self.session).await;
    }
}
