//! Bidirectional ndjson protocol with the messaging process.
//!
//! - `codec`: line framing with a 1 MiB cap.
//! - `reader`: stdout → [`ProtocolEvent`](crate::models::event::ProtocolEvent).
//! - `writer`: [`ProtocolCommand`](crate::models::command::ProtocolCommand) → stdin.

pub mod codec;
pub mod reader;
pub mod writer;
