//! Messaging process spawner.
//!
//! Launches the messaging CLI with all three standard streams piped and
//! `kill_on_drop(true)` so the child never outlives its supervisor.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::info;

use crate::config::BridgeConfig;
use crate::models::session::Session;
use crate::{AppError, Result};

/// What to launch and where.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Messaging CLI binary.
    pub cli_path: String,
    /// Working directory for the child.
    pub workspace_root: PathBuf,
}

impl SpawnConfig {
    /// Derive the spawn target from the bridge configuration.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            cli_path: config.cli_path.clone(),
            workspace_root: config.workspace_root.clone(),
        }
    }
}

/// A freshly spawned process with its streams detached from the [`Child`].
#[derive(Debug)]
pub struct SpawnedProcess {
    /// Child handle; owned by the exit monitor.
    pub child: Child,
    /// Command stream.
    pub stdin: ChildStdin,
    /// Event stream.
    pub stdout: ChildStdout,
    /// Diagnostic stream.
    pub stderr: ChildStderr,
    /// OS process id, when still known.
    pub pid: Option<u32>,
}

/// Build the long-running invocation for the current session.
///
/// The configured `cli_args` come first, then the identity flags, then
/// `--conversation <id>` when a persisted conversation should be resumed.
#[must_use]
pub fn launch_args(config: &BridgeConfig, session: &Session) -> Vec<String> {
    let mut args = config.cli_args.clone();
    args.push("--name".into());
    args.push(config.display_name.clone());
    if let Some(profile) = &config.profile_name {
        args.push("--profile-name".into());
        args.push(profile.clone());
    }
    if let Some(conversation_id) = &session.conversation_id {
        args.push("--conversation".into());
        args.push(conversation_id.clone());
    }
    args
}

/// Spawn the messaging CLI with `args`.
///
/// # Errors
///
/// - [`AppError::CollaboratorUnavailable`] when the binary cannot be found
///   or executed.
/// - [`AppError::Io`] for any other spawn failure or a missing pipe.
pub fn spawn_process(config: &SpawnConfig, args: &[String]) -> Result<SpawnedProcess> {
    let mut cmd = Command::new(&config.cli_path);
    cmd.args(args)
        .current_dir(&config.workspace_root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            AppError::CollaboratorUnavailable(format!("cannot run {}: {err}", config.cli_path))
        }
        _ => AppError::Io(format!("failed to spawn {}: {err}", config.cli_path)),
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Io("failed to capture messaging cli stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Io("failed to capture messaging cli stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Io("failed to capture messaging cli stderr".into()))?;
    let pid = child.id();

    info!(
        pid = pid.unwrap_or(0),
        cli = config.cli_path,
        "messaging process spawned"
    );

    Ok(SpawnedProcess {
        child,
        stdin,
        stdout,
        stderr,
        pid,
    })
}
