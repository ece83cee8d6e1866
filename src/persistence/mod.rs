//! Persistence layer modules.

pub mod state_store;
