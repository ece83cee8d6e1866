//! Domain model module declarations.

use serde::{Deserialize, Deserializer};

pub mod command;
pub mod event;
pub mod session;

/// Accept either a JSON string or a JSON number and keep it as a string.
///
/// The messaging CLI is not consistent about timestamp encoding; both
/// `"2024-05-01T10:00:00Z"` and `1714557600000` occur in the wild.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}
