//! Bridge configuration parsing and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::{AppError, Result};

/// Environment variable that overrides the derived session state path.
pub const STATE_PATH_ENV: &str = "INBOX_BRIDGE_STATE_PATH";

/// Directory (relative to the workspace root) holding the default state file.
const STATE_DIR: &str = ".inbox-bridge";

/// File name of the persisted session record.
const STATE_FILE: &str = "session.json";

/// Supervision settings for the long-running messaging process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessConfig {
    /// Grace period between the `stop` command and a forced kill.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Capacity of the reader → dispatcher event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Capacity of the dispatcher → writer command channel.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    /// How long the exit monitor waits for stdout/stderr to drain.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_stop_grace_ms() -> u64 {
    2000
}

fn default_event_buffer() -> usize {
    256
}

fn default_command_buffer() -> usize {
    64
}

fn default_drain_timeout_ms() -> u64 {
    1000
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: default_stop_grace_ms(),
            event_buffer: default_event_buffer(),
            command_buffer: default_command_buffer(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

/// Missed-message reconciliation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CatchUpConfig {
    /// Whether reconciliation runs on session resume.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of messages fetched per reconciliation.
    #[serde(default = "default_catch_up_limit")]
    pub limit: u32,
    /// Upper bound for each collaborator query.
    #[serde(default = "default_catch_up_timeout")]
    pub timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_catch_up_limit() -> u32 {
    50
}

fn default_catch_up_timeout() -> u64 {
    10
}

impl Default for CatchUpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: default_catch_up_limit(),
            timeout_seconds: default_catch_up_timeout(),
        }
    }
}

/// Inline attachment resolution settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AttachmentConfig {
    /// Scratch directory for downloads; defaults to the system temp dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Largest image accepted for inline delivery.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Upper bound for a single download.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,
}

fn default_max_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_download_timeout() -> u64 {
    30
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_bytes: default_max_bytes(),
            download_timeout_seconds: default_download_timeout(),
        }
    }
}

fn default_display_name() -> String {
    "Agent".into()
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_collaborator_timeout() -> u64 {
    10
}

/// Top-level configuration parsed from `bridge.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Messaging CLI binary.
    pub cli_path: String,
    /// Arguments placed before the bridge-managed flags.
    #[serde(default)]
    pub cli_args: Vec<String>,
    /// Project/workspace directory; the child process runs here.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Explicit location for the persisted session record.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    /// Display name announced by the session identity.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Optional profile name for the session identity.
    #[serde(default)]
    pub profile_name: Option<String>,
    /// Upper bound for identity lookups and availability checks.
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_seconds: u64,
    /// Process supervision settings.
    #[serde(default)]
    pub process: ProcessConfig,
    /// Catch-up settings.
    #[serde(default)]
    pub catch_up: CatchUpConfig,
    /// Attachment settings.
    #[serde(default)]
    pub attachments: AttachmentConfig,
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal configuration for the given CLI binary with all defaults.
    #[must_use]
    pub fn for_cli(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            cli_args: Vec::new(),
            workspace_root: default_workspace_root(),
            state_path: None,
            display_name: default_display_name(),
            profile_name: None,
            collaborator_timeout_seconds: default_collaborator_timeout(),
            process: ProcessConfig::default(),
            catch_up: CatchUpConfig::default(),
            attachments: AttachmentConfig::default(),
        }
    }

    /// Resolve where the session record lives.
    ///
    /// Precedence: [`STATE_PATH_ENV`], then the explicit `state_path`, then
    /// `<workspace_root>/.inbox-bridge/session.json`.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        if let Ok(path) = env::var(STATE_PATH_ENV) {
            if !path.trim().is_empty() {
                debug!(%path, "state path taken from environment");
                return PathBuf::from(path);
            }
        }
        self.state_path
            .clone()
            .unwrap_or_else(|| self.workspace_root.join(STATE_DIR).join(STATE_FILE))
    }

    /// Directory for downloaded attachments.
    #[must_use]
    pub fn attachments_dir(&self) -> PathBuf {
        self.attachments
            .dir
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("inbox-bridge-attachments"))
    }

    /// Grace period applied by `stop()`.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.process.stop_grace_ms)
    }

    /// Timeout for one-shot identity and availability calls.
    #[must_use]
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.cli_path.trim().is_empty() {
            return Err(AppError::Config("cli_path must not be empty".into()));
        }

        if self.display_name.trim().is_empty() {
            return Err(AppError::Config("display_name must not be empty".into()));
        }

        if self.process.event_buffer == 0 || self.process.command_buffer == 0 {
            return Err(AppError::Config(
                "process channel buffers must be greater than zero".into(),
            ));
        }

        if self.catch_up.limit == 0 {
            return Err(AppError::Config(
                "catch_up.limit must be greater than zero".into(),
            ));
        }

        if self.attachments.max_bytes == 0 {
            return Err(AppError::Config(
                "attachments.max_bytes must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
