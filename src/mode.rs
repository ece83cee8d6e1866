//! Routing mode: whether the next reasoning turn answers a remote
//! conversation or the local operator.
//!
//! The router holds a single flag, "last trigger originated remotely". It is
//! recomputed into a directive at the start of every turn, so the agent's
//! instructions can never drift from where the latest input came from.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::tools::SEND_TOOL;

/// Where the most recent turn trigger came from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    /// A conversation message (or catch-up summary, or attachment).
    Remote,
    /// The interactive operator.
    Local,
}

/// Instructions and tool availability for one reasoning turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnDirective {
    /// Route the directive was computed from.
    pub mode: RouteMode,
    /// Base instructions with the routing directive appended.
    pub instructions: String,
    /// Whether the remote-conversation tools should be offered.
    pub remote_tools_enabled: bool,
}

/// Single-flag mode router shared between the dispatcher and the host.
#[derive(Debug, Default)]
pub struct ModeRouter {
    remote: AtomicBool,
}

impl ModeRouter {
    /// Router starting in [`RouteMode::Local`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a remote turn trigger.
    pub fn mark_remote(&self) {
        self.remote.store(true, Ordering::SeqCst);
    }

    /// Record a local turn trigger.
    pub fn mark_local(&self) {
        self.remote.store(false, Ordering::SeqCst);
    }

    /// Current route.
    #[must_use]
    pub fn mode(&self) -> RouteMode {
        if self.remote.load(Ordering::SeqCst) {
            RouteMode::Remote
        } else {
            RouteMode::Local
        }
    }

    /// Whether the last trigger was remote.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.mode() == RouteMode::Remote
    }

    /// Append the routing directive to `base` for the coming turn.
    #[must_use]
    pub fn prepare_turn(&self, base: &str) -> TurnDirective {
        let mode = self.mode();
        let directive = directive_for(mode);
        let instructions = if base.trim().is_empty() {
            directive
        } else {
            format!("{}\n\n{directive}", base.trim_end())
        };
        TurnDirective {
            mode,
            instructions,
            remote_tools_enabled: mode == RouteMode::Remote,
        }
    }
}

/// Directive text for `mode`.
#[must_use]
pub fn directive_for(mode: RouteMode) -> String {
    match mode {
        RouteMode::Remote => format!(
            "The latest message arrived from the remote conversation. Reply by calling \
             the `{SEND_TOOL}` tool; the recipient sees plain text only, so do not use \
             markdown or other formatting."
        ),
        RouteMode::Local => format!(
            "The latest message came from the local operator. Answer here with normal \
             formatting and do not call `{SEND_TOOL}` or other remote conversation tools."
        ),
    }
}
