//! Boundary to the external chat contract.

mod subscriptions;

pub use subscriptions::{Subscription, SubscriptionHandle, SubscriptionRegistry};

use async_trait::async_trait;
use chainchat_messaging::{Address, MessageSent, OnChainMessage, UsernameSet};
use serde::Serialize;
use std::fmt;

pub type ContractResult<T> = Result<T, ContractError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("contract call failed: {0}")]
    Call(String),
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("transaction rejected by signer")]
    Rejected,
}

/// Hash of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A contract handle bound to one signer.
///
/// Mutating calls return once the transaction is submitted; use
/// [`ChatContract::wait_for`] to block until the network confirms it.
#[async_trait]
pub trait ChatContract: Send + Sync {
    fn address(&self) -> &Address;

    /// Every stored message, in contract order.
    async fn get_messages(&self) -> ContractResult<Vec<OnChainMessage>>;

    /// Registered display name, or an empty string when none is set.
    async fn get_username(&self, account: &Address) -> ContractResult<String>;

    async fn send_message(&self, content: &str) -> ContractResult<TxHash>;

    async fn set_username(&self, username: &str) -> ContractResult<TxHash>;

    async fn wait_for(&self, tx: &TxHash) -> ContractResult<()>;

    fn on_message_sent(&self) -> Subscription<MessageSent>;

    fn on_username_set(&self) -> Subscription<UsernameSet>;
}
