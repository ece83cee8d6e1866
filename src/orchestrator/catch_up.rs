//! Missed-message reconciliation on session resume.
//!
//! When the process reconnects to the conversation recorded on disk, the
//! reconciler asks the collaborator for everything sent after the stored
//! watermark, drops the bridge's own messages, and folds the rest into a
//! single steer message. The watermark moves to the newest fetched message
//! whether or not it was self-authored, so the same history is never
//! summarised twice.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::collaborator::{Collaborator, HistoryQuery};
use crate::config::BridgeConfig;
use crate::host::{HostMessage, MessageContent, Priority};
use crate::models::event::InboundMessage;
use crate::models::session::Watermark;

/// Closing instruction appended to every catch-up summary.
pub const REVIEW_INSTRUCTION: &str =
    "Review these messages and reply in the conversation before continuing other work.";

/// Reconciler tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUpSettings {
    /// Whether reconciliation runs at all.
    pub enabled: bool,
    /// Maximum messages fetched per run.
    pub limit: u32,
    /// Bound on each collaborator call.
    pub timeout: Duration,
}

impl CatchUpSettings {
    /// Settings from the `[catch_up]` table.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            enabled: config.catch_up.enabled,
            limit: config.catch_up.limit,
            timeout: Duration::from_secs(config.catch_up.timeout_seconds),
        }
    }
}

/// What a reconciliation run decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchUpPlan {
    /// Steer message to publish, when any message survived filtering.
    pub summary: Option<HostMessage>,
    /// Number of messages included in the summary.
    pub delivered: usize,
    /// Number of messages fetched, self-authored included.
    pub fetched: usize,
    /// Newest send-time across all fetched messages.
    pub max_watermark: Option<Watermark>,
}

/// Build the plan for `messages` fetched after the stored watermark.
///
/// Messages from `self_inbox_id` are left out of the summary but still
/// count towards the new watermark.
#[must_use]
pub fn plan(messages: &[InboundMessage], self_inbox_id: Option<&str>) -> CatchUpPlan {
    let max_watermark = messages.iter().filter_map(InboundMessage::watermark).max();

    let remaining: Vec<&InboundMessage> = messages
        .iter()
        .filter(|m| self_inbox_id != Some(m.sender_inbox_id.as_str()))
        .collect();

    let summary = if remaining.is_empty() {
        None
    } else {
        let mut text = format!(
            "While you were away, {} new message{} arrived in the conversation:\n",
            remaining.len(),
            if remaining.len() == 1 { "" } else { "s" }
        );
        for message in &remaining {
            let _ = writeln!(
                text,
                "[{} at {}] {}",
                message.sender_inbox_id, message.sent_at, message.content
            );
        }
        text.push('\n');
        text.push_str(REVIEW_INSTRUCTION);

        Some(HostMessage {
            priority: Priority::Steer,
            trigger_turn: true,
            content: vec![MessageContent::text(text)],
            meta: None,
        })
    };

    CatchUpPlan {
        summary,
        delivered: remaining.len(),
        fetched: messages.len(),
        max_watermark,
    }
}

/// Runs reconciliation against a [`Collaborator`], caching the bridge's own
/// inbox id across runs.
pub struct CatchUpReconciler {
    collaborator: Arc<dyn Collaborator>,
    settings: CatchUpSettings,
    own_inbox_id: Option<String>,
}

impl std::fmt::Debug for CatchUpReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatchUpReconciler")
            .field("settings", &self.settings)
            .field("own_inbox_id", &self.own_inbox_id)
            .finish_non_exhaustive()
    }
}

impl CatchUpReconciler {
    /// Create a reconciler with an empty identity cache.
    #[must_use]
    pub fn new(collaborator: Arc<dyn Collaborator>, settings: CatchUpSettings) -> Self {
        Self {
            collaborator,
            settings,
            own_inbox_id: None,
        }
    }

    /// Whether reconciliation is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Fetch and plan messages in `conversation_id` sent after `after`.
    ///
    /// Returns `None` when there is nothing to do: disabled, the query
    /// failed or timed out, or it returned no messages.
    pub async fn reconcile(&mut self, conversation_id: &str, after: Watermark) -> Option<CatchUpPlan> {
        if !self.settings.enabled {
            return None;
        }

        let span = info_span!(
            "catch_up",
            conversation_id = %conversation_id,
            after = %after,
        );

        async move {
            let query = HistoryQuery::text_after(conversation_id, after, self.settings.limit);
            let messages = match tokio::time::timeout(
                self.settings.timeout,
                self.collaborator.messages_after(query),
            )
            .await
            {
                Ok(Ok(messages)) => messages,
                Ok(Err(err)) => {
                    warn!(%err, "history query failed, skipping catch-up");
                    return None;
                }
                Err(_) => {
                    warn!(timeout = ?self.settings.timeout, "history query timed out, skipping catch-up");
                    return None;
                }
            };

            if messages.is_empty() {
                debug!("no missed messages");
                return None;
            }

            let self_id = self.own_inbox_id().await;
            let plan = plan(&messages, self_id.as_deref());
            info!(
                fetched = plan.fetched,
                delivered = plan.delivered,
                "catch-up planned"
            );
            Some(plan)
        }
        .instrument(span)
        .await
    }

    async fn own_inbox_id(&mut self) -> Option<String> {
        if let Some(id) = &self.own_inbox_id {
            return Some(id.clone());
        }
        match tokio::time::timeout(self.settings.timeout, self.collaborator.own_inbox_id()).await {
            Ok(Ok(id)) => {
                self.own_inbox_id = Some(id.clone());
                Some(id)
            }
            Ok(Err(err)) => {
                warn!(%err, "own inbox id unavailable, self-authored messages will not be filtered");
                None
            }
            Err(_) => {
                warn!("own inbox id lookup timed out, self-authored messages will not be filtered");
                None
            }
        }
    }
}
