//! Synchronization between the contract's message log and the local list.

mod outbox;
mod responder;
mod synchronizer;

pub use outbox::Outbox;
pub use responder::AutoResponder;
pub use synchronizer::{ChatSynchronizer, EventSink};

/// Errors surfaced by chat actions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("failed to fetch messages: {0}")]
    Fetch(String),
    #[error("failed to {action}: {reason}")]
    Send { action: &'static str, reason: String },
    #[error("wallet is not connected")]
    NotConnected,
    #[error("a transaction is already pending")]
    InProgress,
    #[error("waiting for the simulated AI reply")]
    ReplyPending,
    #[error("username must be at most {max} characters")]
    UsernameTooLong { max: usize },
}

pub type Result<T> = std::result::Result<T, ChatError>;
