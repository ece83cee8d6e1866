//! One-shot calls into the messaging CLI.
//!
//! The long-running process is driven over ndjson; everything the bridge
//! needs synchronously (history for catch-up, its own inbox id, attachment
//! downloads, an availability probe) goes through the [`Collaborator`]
//! trait instead. [`cli::CliCollaborator`] runs the real binary; tests use
//! in-memory fakes.

pub mod cli;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::models::event::InboundMessage;
use crate::models::session::Watermark;
use crate::Result;

/// Boxed future returned by [`Collaborator`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Content type requested by the catch-up history query.
pub const TEXT_CONTENT_TYPE: &str = "text";

/// Parameters for a history query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Conversation to query.
    pub conversation_id: String,
    /// Only messages sent strictly after this instant.
    pub after: Watermark,
    /// Maximum number of messages, oldest first.
    pub limit: u32,
    /// Content type filter.
    pub content_type: String,
}

impl HistoryQuery {
    /// Text-only query for the catch-up reconciler.
    #[must_use]
    pub fn text_after(conversation_id: &str, after: Watermark, limit: u32) -> Self {
        Self {
            conversation_id: conversation_id.to_owned(),
            after,
            limit,
            content_type: TEXT_CONTENT_TYPE.to_owned(),
        }
    }
}

/// Synchronous (request/response) surface of the messaging CLI.
///
/// Every call is bounded by a timeout chosen by the implementation; a
/// timeout is reported as [`AppError::Collaborator`](crate::AppError::Collaborator).
pub trait Collaborator: Send + Sync {
    /// Verify the CLI can be located and invoked.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::CollaboratorUnavailable`](crate::AppError::CollaboratorUnavailable)
    /// when the binary cannot be run.
    fn check_available(&self) -> BoxFuture<'_, Result<()>>;

    /// Messages matching `query`, in ascending send order.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Collaborator`](crate::AppError::Collaborator) on
    /// failure, timeout, or unparseable output.
    fn messages_after(&self, query: HistoryQuery) -> BoxFuture<'_, Result<Vec<InboundMessage>>>;

    /// Inbox identifier of the bridge's own identity.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Collaborator`](crate::AppError::Collaborator) on
    /// failure or timeout.
    fn own_inbox_id(&self) -> BoxFuture<'_, Result<String>>;

    /// Download a remote attachment to `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Collaborator`](crate::AppError::Collaborator) on
    /// failure or timeout.
    fn download<'a>(&'a self, url: &'a str, dest: &'a Path) -> BoxFuture<'a, Result<()>>;
}
