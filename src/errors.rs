//! Error types shared across the bridge.

use std::fmt::{Display, Formatter};

/// Shared bridge result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Bridge error enumeration covering all controller failure modes.
///
/// None of these are fatal to the host: every path ends in a discarded line,
/// a structured [`BridgeNotice`](crate::host::BridgeNotice), or an aborted
/// start.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// ndjson framing, parse, or serialisation failure.
    Protocol(String),
    /// A start was requested while a process is still live.
    AlreadyRunning(String),
    /// A command was issued before the process reported readiness.
    NotReady(String),
    /// The messaging CLI could not be located or invoked.
    CollaboratorUnavailable(String),
    /// A one-shot collaborator call failed or timed out.
    Collaborator(String),
    /// Attachment download, read, or encoding failure.
    Attachment(String),
    /// The dispatcher or a channel it owns has shut down.
    Closed(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::AlreadyRunning(msg) => write!(f, "already running: {msg}"),
            Self::NotReady(msg) => write!(f, "not ready: {msg}"),
            Self::CollaboratorUnavailable(msg) => write!(f, "collaborator unavailable: {msg}"),
            Self::Collaborator(msg) => write!(f, "collaborator: {msg}"),
            Self::Attachment(msg) => write!(f, "attachment: {msg}"),
            Self::Closed(msg) => write!(f, "closed: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
