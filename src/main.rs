#![forbid(unsafe_code)]

//! `inbox-bridge`: headless host for the bridge controller.
//!
//! Reads host input as ndjson on stdin (`tool`, `local` and `turn` lines),
//! writes published messages, notices, tool results and turn directives as
//! ndjson on stdout, and logs to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use inbox_bridge::bridge::{BridgeController, BridgeHandle};
use inbox_bridge::collaborator::cli::CliCollaborator;
use inbox_bridge::config::BridgeConfig;
use inbox_bridge::host::ChannelHost;
use inbox_bridge::protocol::codec::{Frame, LineCodec};
use inbox_bridge::{tools, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "inbox-bridge", about = "Bridge a messaging CLI into an agent host", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the workspace root.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Override where session state is persisted.
    #[arg(long)]
    state_path: Option<PathBuf>,
}

/// One line of host input.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HostInput {
    /// Invoke a remote-callable action.
    Tool {
        #[serde(default)]
        id: Option<Value>,
        name: String,
        #[serde(default)]
        args: Value,
    },
    /// The operator typed something locally.
    Local,
    /// A reasoning turn is about to start.
    Turn {
        #[serde(default)]
        instructions: String,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("inbox-bridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = BridgeConfig::load_from_path(&args.config)?;
    if let Some(ws) = args.workspace {
        config.workspace_root = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
    }
    if let Some(path) = args.state_path {
        config.state_path = Some(path);
    }
    info!(cli = %config.cli_path, "configuration loaded");

    let (host, mut host_rx) = ChannelHost::new();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let collaborator = Arc::new(CliCollaborator::from_config(&config));

    // Forward notices emitted during a failed init before bailing out.
    let handle = match BridgeController::init(config, Arc::new(host), collaborator).await {
        Ok(handle) => handle,
        Err(err) => {
            while let Ok(output) = host_rx.try_recv() {
                write_line(&serde_json::to_value(output).unwrap_or(Value::Null)).await;
            }
            return Err(err);
        }
    };

    let mut stdin = FramedRead::new(tokio::io::stdin(), LineCodec::new());
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            Some(output) = host_rx.recv() => match serde_json::to_value(output) {
                Ok(value) => write_line(&value).await,
                Err(err) => warn!(%err, "failed to encode host output"),
            },
            Some(value) = out_rx.recv() => write_line(&value).await,
            line = stdin.next() => match line {
                Some(Ok(Frame::Line(line))) => on_host_line(&handle, &line, &out_tx),
                Some(Ok(frame)) => debug!(?frame, "dropping unreadable host input"),
                Some(Err(err)) => {
                    warn!(%err, "host input failed");
                    break;
                }
                None => {
                    info!("host input closed");
                    break;
                }
            },
        }
    }

    handle.shutdown().await;
    while let Ok(output) = host_rx.try_recv() {
        if let Ok(value) = serde_json::to_value(output) {
            write_line(&value).await;
        }
    }
    info!("inbox-bridge stopped");
    Ok(())
}

fn on_host_line(handle: &BridgeHandle, line: &str, out: &mpsc::UnboundedSender<Value>) {
    if line.trim().is_empty() {
        return;
    }
    let input: HostInput = match serde_json::from_str(line) {
        Ok(input) => input,
        Err(err) => {
            debug!(%err, "ignoring malformed host input");
            return;
        }
    };

    match input {
        HostInput::Tool { id, name, args } => {
            let handle = handle.clone();
            let out = out.clone();
            tokio::spawn(async move {
                let body = match tools::invoke(&handle, &name, args).await {
                    Ok(result) => json!({ "id": id, "ok": true, "result": result }),
                    Err(err) => json!({ "id": id, "ok": false, "error": err.to_string() }),
                };
                let _ = out.send(json!({ "kind": "tool_result", "body": body }));
            });
        }
        HostInput::Local => handle.observe_local_input(),
        HostInput::Turn { instructions } => {
            let directive = handle.prepare_turn(&instructions);
            let offered: Vec<&str> = tools::offered(&directive)
                .into_iter()
                .map(|tool| tool.name)
                .collect();
            let _ = out.send(json!({
                "kind": "turn",
                "body": { "directive": directive, "tools": offered },
            }));
        }
    }
}

async fn write_line(value: &Value) {
    let mut stdout = tokio::io::stdout();
    let mut line = value.to_string();
    line.push('\n');
    if let Err(err) = stdout.write_all(line.as_bytes()).await {
        warn!(%err, "failed to write host output");
        return;
    }
    let _ = stdout.flush().await;
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
