//! Session orchestration.
//!
//! Covers reconciliation of messages missed while the bridge was offline.

pub mod catch_up;
