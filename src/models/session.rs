//! Session model, watermark arithmetic, and the persisted record shape.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Send-time of the most recently accounted-for message, in nanoseconds
/// since the Unix epoch.
///
/// Serialised as a decimal string so JSON consumers with 53-bit numbers do
/// not lose precision. Deserialisation accepts both strings and integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(u64);

impl Watermark {
    /// Wrap a raw nanosecond value.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Raw nanosecond value.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Parse a decimal nanosecond string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u64>().ok().map(Self)
    }

    /// Derive a watermark from an RFC 3339 timestamp or a millisecond epoch.
    #[must_use]
    pub fn from_sent_at(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return ts
                .with_timezone(&Utc)
                .timestamp_nanos_opt()
                .and_then(|n| u64::try_from(n).ok())
                .map(Self);
        }
        raw.parse::<u64>()
            .ok()
            .and_then(|millis| millis.checked_mul(1_000_000))
            .map(Self)
    }

    /// Watermark for the current wall-clock instant.
    #[must_use]
    pub fn now() -> Self {
        Utc::now()
            .timestamp_nanos_opt()
            .and_then(|n| u64::try_from(n).ok())
            .map_or(Self(0), Self)
    }
}

impl Display for Watermark {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Watermark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Watermark {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = super::string_or_number(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid watermark: {raw}")))
    }
}

/// Durable serialisation of a [`Session`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Conversation the bridge is attached to.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Invite link for the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_url: Option<String>,
    /// Last accounted-for send-time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_watermark: Option<Watermark>,
}

/// In-memory session identity and watermark, owned by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Conversation id reported by the most recent `ready` event.
    pub conversation_id: Option<String>,
    /// Invite link reported alongside the conversation id.
    pub invite_url: Option<String>,
    /// QR code image path; valid only for the current process.
    pub qr_code_path: Option<String>,
    last_seen_watermark: Option<Watermark>,
}

impl Session {
    /// Current watermark, if any message has been accounted for.
    #[must_use]
    pub fn watermark(&self) -> Option<Watermark> {
        self.last_seen_watermark
    }

    /// Move the watermark forward to `candidate`.
    ///
    /// Returns `true` when the stored value changed. A candidate at or below
    /// the current watermark is ignored.
    pub fn advance_watermark(&mut self, candidate: Watermark) -> bool {
        match self.last_seen_watermark {
            Some(current) if current >= candidate => false,
            _ => {
                self.last_seen_watermark = Some(candidate);
                true
            }
        }
    }

    /// Attach to the conversation named by a `ready` event.
    ///
    /// Switching to a different conversation discards the previous
    /// watermark, which belonged to the old conversation. Returns `true` when
    /// the conversation id is the one the session was already attached to.
    pub fn attach(
        &mut self,
        conversation_id: &str,
        invite_url: Option<String>,
        qr_code_path: Option<String>,
    ) -> bool {
        let resumed = self.conversation_id.as_deref() == Some(conversation_id);
        if !resumed {
            self.conversation_id = Some(conversation_id.to_owned());
            self.invite_url = None;
            self.last_seen_watermark = None;
        }
        if invite_url.is_some() {
            self.invite_url = invite_url;
        }
        self.qr_code_path = qr_code_path;
        resumed
    }

    /// Snapshot the durable fields.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            conversation_id: self.conversation_id.clone(),
            invite_url: self.invite_url.clone(),
            last_seen_watermark: self.last_seen_watermark,
        }
    }
}

impl From<PersistedState> for Session {
    fn from(state: PersistedState) -> Self {
        Self {
            conversation_id: state.conversation_id,
            invite_url: state.invite_url,
            qr_code_path: None,
            last_seen_watermark: state.last_seen_watermark,
        }
    }
}
