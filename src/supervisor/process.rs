//! Process lifecycle state machine.
//!
//! `Stopped → Starting → Ready → Exited`, with `Stopping` entered on a stop
//! request. The stop grace timer and the child's exit race; the race is
//! resolved with a [`CancellationToken`] (cancelled as soon as the exit is
//! observed) and a single-use `oneshot` kill switch owned by the exit
//! monitor, so a forced kill can never reach an exited child and is sent at
//! most once per process.

use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::models::command::ProtocolCommand;
use crate::models::event::{ExitEvent, ProtocolEvent};
use crate::protocol::reader::run_reader;
use crate::protocol::writer::{run_writer, CommandSink};
use crate::supervisor::diagnostics::{run_diagnostics_reader, DiagnosticBuffer};
use crate::supervisor::spawner::{spawn_process, SpawnConfig};
use crate::supervisor::{ProcessState, StopRequest, Supervised, SupervisorEvent};
use crate::{AppError, Result};

/// Tunables for [`ProcessSupervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// What to launch.
    pub spawn: SpawnConfig,
    /// Delay between `stop` and a forced kill.
    pub stop_grace: Duration,
    /// Capacity of each process's command channel.
    pub command_buffer: usize,
    /// How long the exit monitor waits for the output streams to drain.
    pub drain_timeout: Duration,
}

impl SupervisorSettings {
    /// Derive settings from the bridge configuration.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            spawn: SpawnConfig::from_config(config),
            stop_grace: config.stop_grace(),
            command_buffer: config.process.command_buffer,
            drain_timeout: Duration::from_millis(config.process.drain_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Ready,
    Stopping,
}

/// The live process as seen by the dispatcher.
#[derive(Debug)]
struct ProcessHandle {
    generation: u64,
    pid: Option<u32>,
    phase: Phase,
    ready: bool,
    commands: CommandSink,
    kill: Option<oneshot::Sender<()>>,
    grace: Option<CancellationToken>,
    diagnostics: DiagnosticBuffer,
    cancel: CancellationToken,
}

/// Owner of the single live messaging process.
///
/// All methods are called from the dispatcher; background tasks only talk
/// back through the event channel supplied at construction.
#[derive(Debug)]
pub struct ProcessSupervisor {
    settings: SupervisorSettings,
    events: mpsc::Sender<SupervisorEvent>,
    next_generation: u64,
    handle: Option<ProcessHandle>,
    last_exit: Option<ExitEvent>,
}

impl ProcessSupervisor {
    /// Create an idle supervisor reporting into `events`.
    #[must_use]
    pub fn new(settings: SupervisorSettings, events: mpsc::Sender<SupervisorEvent>) -> Self {
        Self {
            settings,
            events,
            next_generation: 1,
            handle: None,
            last_exit: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        match &self.handle {
            Some(handle) => match handle.phase {
                Phase::Starting => ProcessState::Starting,
                Phase::Ready => ProcessState::Ready,
                Phase::Stopping => ProcessState::Stopping,
            },
            None if self.last_exit.is_some() => ProcessState::Exited,
            None => ProcessState::Stopped,
        }
    }

    /// Whether a process is started and not yet exited.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether the live process has reported readiness.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.ready)
    }

    /// Generation of the live process.
    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        self.handle.as_ref().map(|h| h.generation)
    }

    /// OS pid of the live process.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(|h| h.pid)
    }

    /// How the previous process ended, if one has.
    #[must_use]
    pub fn last_exit(&self) -> Option<ExitEvent> {
        self.last_exit
    }

    /// Current stderr tail of the live process.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<String> {
        self.handle
            .as_ref()
            .map(|h| h.diagnostics.tail())
            .unwrap_or_default()
    }

    /// Spawn the messaging process and its stream tasks.
    ///
    /// Returns the new process generation.
    ///
    /// # Errors
    ///
    /// - [`AppError::AlreadyRunning`] when a process is still live.
    /// - [`AppError::CollaboratorUnavailable`] / [`AppError::Io`] when the
    ///   spawn fails; nothing is left running in that case.
    pub fn start(&mut self, args: &[String]) -> Result<u64> {
        if let Some(handle) = &self.handle {
            return Err(AppError::AlreadyRunning(format!(
                "messaging process generation {} is still live",
                handle.generation
            )));
        }

        let spawned = spawn_process(&self.settings.spawn, args)?;
        let generation = self.next_generation;
        self.next_generation += 1;

        let cancel = CancellationToken::new();
        let (cmd_tx, cmd_rx) = mpsc::channel(self.settings.command_buffer.max(1));
        let (kill_tx, kill_rx) = oneshot::channel();

        let stdout_task = tokio::spawn(run_reader(
            generation,
            spawned.stdout,
            self.events.clone(),
            cancel.clone(),
        ));
        let stderr_task = tokio::spawn(run_diagnostics_reader(
            generation,
            spawned.stderr,
            self.events.clone(),
            cancel.clone(),
        ));
        tokio::spawn(run_writer(generation, spawned.stdin, cmd_rx, cancel.clone()));
        tokio::spawn(monitor_exit(ExitMonitor {
            generation,
            child: spawned.child,
            kill_rx,
            streams: vec![stdout_task, stderr_task],
            drain_timeout: self.settings.drain_timeout,
            events: self.events.clone(),
            cancel: cancel.clone(),
        }));

        self.handle = Some(ProcessHandle {
            generation,
            pid: spawned.pid,
            phase: Phase::Starting,
            ready: false,
            commands: CommandSink::new(cmd_tx),
            kill: Some(kill_tx),
            grace: None,
            diagnostics: DiagnosticBuffer::new(),
            cancel,
        });

        info!(generation, "messaging process starting");
        Ok(generation)
    }

    /// Offer `command` to the live, ready process.
    ///
    /// Returns whether the writer accepted it; an unwritable stream drops the
    /// command silently.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotReady`] when no process has reached readiness.
    pub fn send(&self, command: ProtocolCommand) -> Result<bool> {
        match &self.handle {
            Some(handle) if handle.phase == Phase::Ready => Ok(handle.commands.offer(command)),
            Some(handle) if handle.phase == Phase::Stopping => Err(AppError::NotReady(
                "messaging process is stopping".into(),
            )),
            Some(_) => Err(AppError::NotReady(
                "messaging process has not reported ready".into(),
            )),
            None => Err(AppError::NotReady("messaging process is not running".into())),
        }
    }

    /// Ask the live process to exit, forcing it after the grace period.
    pub fn stop(&mut self) -> StopRequest {
        let grace = self.settings.stop_grace;
        let Some(handle) = self.handle.as_mut() else {
            debug!("stop requested with no live process");
            return StopRequest::NotRunning;
        };
        if handle.phase == Phase::Stopping {
            return StopRequest::AlreadyStopping;
        }

        handle.phase = Phase::Stopping;
        if handle.commands.is_writable() {
            handle.commands.offer(ProtocolCommand::Stop);
        }

        let token = CancellationToken::new();
        if let Some(kill) = handle.kill.take() {
            tokio::spawn(grace_timer(handle.generation, grace, kill, token.clone()));
        }
        handle.grace = Some(token);

        info!(generation = handle.generation, grace_ms = grace.as_millis(), "messaging process stopping");
        StopRequest::Requested
    }

    /// Fold a background event into the supervisor state.
    ///
    /// Returns what the dispatcher should act on, or `None` for diagnostics
    /// and for events from a process that is no longer supervised.
    pub fn on_event(&mut self, event: SupervisorEvent) -> Option<Supervised> {
        match event {
            SupervisorEvent::Diagnostic { generation, line } => {
                if let Some(handle) = self.live_mut(generation) {
                    handle.diagnostics.push(line);
                }
                None
            }
            SupervisorEvent::Protocol { generation, event } => {
                let handle = self.live_mut(generation)?;
                if let ProtocolEvent::Ready(ready) = event {
                    if handle.ready {
                        return Some(Supervised::RepeatedReady(ready));
                    }
                    handle.ready = true;
                    if handle.phase == Phase::Starting {
                        handle.phase = Phase::Ready;
                    }
                    info!(generation, "messaging process ready");
                    return Some(Supervised::Event(ProtocolEvent::Ready(ready)));
                }
                Some(Supervised::Event(event))
            }
            SupervisorEvent::Exited {
                generation,
                code,
                forced,
            } => {
                self.live_mut(generation)?;
                let handle = self.handle.take()?;
                Some(self.finish(handle, code, forced))
            }
        }
    }

    fn live_mut(&mut self, generation: u64) -> Option<&mut ProcessHandle> {
        match self.handle.as_mut() {
            Some(handle) if handle.generation == generation => Some(handle),
            _ => {
                debug!(generation, "discarding event from unsupervised process");
                None
            }
        }
    }

    fn finish(&mut self, handle: ProcessHandle, code: Option<i32>, forced: bool) -> Supervised {
        if let Some(grace) = &handle.grace {
            grace.cancel();
        }
        handle.cancel.cancel();

        let exit = ExitEvent {
            code,
            forced,
            was_ready: handle.ready,
        };
        self.last_exit = Some(exit);

        if handle.phase == Phase::Starting && code != Some(0) {
            warn!(
                generation = handle.generation,
                code,
                "messaging process exited before ready"
            );
            return Supervised::StartupFailure {
                code,
                diagnostics: handle.diagnostics.tail(),
            };
        }

        info!(generation = handle.generation, code, forced, "messaging process exited");
        Supervised::Event(ProtocolEvent::Exit(exit))
    }
}

async fn grace_timer(
    generation: u64,
    grace: Duration,
    kill: oneshot::Sender<()>,
    token: CancellationToken,
) {
    tokio::select! {
        biased;

        () = token.cancelled() => {
            debug!(generation, "grace timer cancelled by exit");
        }
        () = tokio::time::sleep(grace) => {
            if kill.send(()).is_ok() {
                warn!(generation, "messaging process ignored stop, forcing termination");
            }
        }
    }
}

struct ExitMonitor {
    generation: u64,
    child: Child,
    kill_rx: oneshot::Receiver<()>,
    streams: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
    events: mpsc::Sender<SupervisorEvent>,
    cancel: CancellationToken,
}

/// Await the child's exit (killing it if the grace timer fires first), let
/// the output streams drain, then report [`SupervisorEvent::Exited`].
async fn monitor_exit(monitor: ExitMonitor) {
    let ExitMonitor {
        generation,
        mut child,
        mut kill_rx,
        streams,
        drain_timeout,
        events,
        cancel,
    } = monitor;

    let (status, forced) = tokio::select! {
        biased;

        status = child.wait() => (status, false),
        Ok(()) = &mut kill_rx => {
            if let Err(err) = child.start_kill() {
                warn!(generation, %err, "failed to kill messaging process");
            }
            (child.wait().await, true)
        }
    };
    drop(kill_rx);

    let code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            warn!(generation, %err, "error waiting for messaging process");
            None
        }
    };

    for stream in streams {
        if tokio::time::timeout(drain_timeout, stream).await.is_err() {
            debug!(generation, "output stream did not drain in time");
        }
    }
    cancel.cancel();

    let exited = SupervisorEvent::Exited {
        generation,
        code,
        forced,
    };
    if events.send(exited).await.is_err() {
        debug!(generation, "dispatcher gone before exit could be reported");
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Some(kill) = self.handle.as_mut().and_then(|h| h.kill.take()) {
            let _ = kill.send(());
        }
    }
}
