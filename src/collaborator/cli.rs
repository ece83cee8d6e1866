//! [`Collaborator`] backed by one-shot invocations of the messaging CLI.
//!
//! | Call             | Invocation                                                                 |
//! |------------------|----------------------------------------------------------------------------|
//! | availability     | `<cli> --version`                                                          |
//! | history          | `<cli> messages --conversation <id> --after-ns <ns> --limit <n> --order asc --content-type text --json` |
//! | own inbox id     | `<cli> whoami --json` → `{"inboxId": "…"}`                                 |
//! | download         | `<cli> download --url <url> --output <path>`                               |

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::collaborator::{BoxFuture, Collaborator, HistoryQuery};
use crate::config::BridgeConfig;
use crate::models::event::InboundMessage;
use crate::{AppError, Result};

/// Runs the messaging CLI for request/response calls.
#[derive(Debug, Clone)]
pub struct CliCollaborator {
    cli_path: String,
    workspace_root: PathBuf,
    call_timeout: Duration,
    history_timeout: Duration,
    download_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryOutput {
    List(Vec<Value>),
    Wrapped { messages: Vec<Value> },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhoAmI {
    inbox_id: String,
}

impl CliCollaborator {
    /// Collaborator for the CLI and timeouts named in `config`.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            cli_path: config.cli_path.clone(),
            workspace_root: config.workspace_root.clone(),
            call_timeout: config.collaborator_timeout(),
            history_timeout: Duration::from_secs(config.catch_up.timeout_seconds),
            download_timeout: Duration::from_secs(config.attachments.download_timeout_seconds),
        }
    }

    async fn run(&self, args: &[String], timeout: Duration) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.cli_path);
        cmd.args(args)
            .current_dir(&self.workspace_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                AppError::Collaborator(format!(
                    "`{}` timed out after {timeout:?}",
                    args.first().map_or("", String::as_str)
                ))
            })?
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    AppError::CollaboratorUnavailable(format!("cannot run {}: {err}", self.cli_path))
                }
                _ => AppError::Collaborator(format!("failed to run {}: {err}", self.cli_path)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Collaborator(format!(
                "`{}` exited with {}: {}",
                args.first().map_or("", String::as_str),
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

impl Collaborator for CliCollaborator {
    fn check_available(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match self.run(&["--version".to_owned()], self.call_timeout).await {
                Ok(_) => Ok(()),
                Err(AppError::CollaboratorUnavailable(msg)) => {
                    Err(AppError::CollaboratorUnavailable(msg))
                }
                // The binary ran; a non-zero `--version` still proves it is invocable.
                Err(err) => {
                    debug!(%err, "availability probe returned an error");
                    Ok(())
                }
            }
        })
    }

    fn messages_after(&self, query: HistoryQuery) -> BoxFuture<'_, Result<Vec<InboundMessage>>> {
        Box::pin(async move {
            let args = history_args(&query);
            let stdout = self.run(&args, self.history_timeout).await?;
            parse_history(&stdout)
        })
    }

    fn own_inbox_id(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let args = vec!["whoami".to_owned(), "--json".to_owned()];
            let stdout = self.run(&args, self.call_timeout).await?;
            let who: WhoAmI = serde_json::from_slice(&stdout)
                .map_err(|e| AppError::Collaborator(format!("invalid whoami output: {e}")))?;
            Ok(who.inbox_id)
        })
    }

    fn download<'a>(&'a self, url: &'a str, dest: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let args = vec![
                "download".to_owned(),
                "--url".to_owned(),
                url.to_owned(),
                "--output".to_owned(),
                dest.to_string_lossy().into_owned(),
            ];
            self.run(&args, self.download_timeout).await.map(|_| ())
        })
    }
}

/// Arguments for a history query.
#[must_use]
pub fn history_args(query: &HistoryQuery) -> Vec<String> {
    vec![
        "messages".to_owned(),
        "--conversation".to_owned(),
        query.conversation_id.clone(),
        "--after-ns".to_owned(),
        query.after.to_string(),
        "--limit".to_owned(),
        query.limit.to_string(),
        "--order".to_owned(),
        "asc".to_owned(),
        "--content-type".to_owned(),
        query.content_type.clone(),
        "--json".to_owned(),
    ]
}

/// Parse history output, skipping entries that are not complete messages.
///
/// # Errors
///
/// Returns [`AppError::Collaborator`] when the output is not a JSON array
/// (or an object with a `messages` array).
pub fn parse_history(stdout: &[u8]) -> Result<Vec<InboundMessage>> {
    let output: HistoryOutput = serde_json::from_slice(stdout)
        .map_err(|e| AppError::Collaborator(format!("invalid history output: {e}")))?;
    let entries = match output {
        HistoryOutput::List(entries) | HistoryOutput::Wrapped { messages: entries } => entries,
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<InboundMessage>(entry) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "skipping incomplete history entry");
                None
            }
        })
        .collect())
}
