#![forbid(unsafe_code)]

//! Bridge between an agent host and a long-running messaging CLI.
//!
//! The [`bridge::BridgeController`] supervises the CLI process, speaks its
//! ndjson protocol, persists the conversation and watermark across restarts,
//! reconciles missed messages on resume, and routes inbound messages to the
//! host bus.

pub mod attachment;
pub mod bridge;
pub mod collaborator;
pub mod config;
pub mod errors;
pub mod host;
pub mod mode;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod protocol;
pub mod supervisor;
pub mod tools;

pub use config::BridgeConfig;
pub use errors::{AppError, Result};
