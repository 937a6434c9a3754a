//! Wallet provider boundary and the session built on top of it.

mod session;

pub use session::SessionManager;

use crate::contract::{ChatContract, Subscription};
use async_trait::async_trait;
use chainchat_messaging::Address;
use std::fmt;
use std::sync::Arc;

pub type WalletResult<T> = Result<T, WalletError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("no Ethereum wallet provider is available; install one to use this app")]
    ProviderUnavailable,
    #[error("failed to connect wallet: {0}")]
    UserRejected(String),
    #[error("failed to connect wallet: {0}")]
    Connection(String),
}

/// Notifications pushed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// Capability to authorize state-mutating calls for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    account: Address,
}

impl Signer {
    pub fn new(account: Address) -> Self {
        Self { account }
    }

    pub fn account(&self) -> &Address {
        &self.account
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the user for account access. The first account is the active one.
    async fn request_accounts(&self) -> WalletResult<Vec<Address>>;

    /// Signer for `account`, or for the provider's selected account.
    async fn signer(&self, account: Option<&Address>) -> WalletResult<Signer>;

    /// Contract handle at `address` that signs with `signer`.
    fn bind_contract(&self, address: &Address, signer: Signer) -> Arc<dyn ChatContract>;

    /// Listen for `accountsChanged` / `chainChanged`.
    fn subscribe(&self) -> Subscription<ProviderEvent>;
}

/// An established wallet connection.
#[derive(Clone)]
pub struct Session {
    pub account: Address,
    pub signer: Signer,
    pub contract: Arc<dyn ChatContract>,
    pub connected: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("account", &self.account)
            .field("contract", self.contract.address())
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}
