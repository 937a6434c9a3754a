//! In-memory chain implementing both external boundaries.
//!
//! `LocalChain` plays the wallet provider and `LocalContract` the chat
//! contract. Transactions are mined as soon as they are submitted. Fault
//! switches let callers rehearse rejected connections, failing reads,
//! reverted writes and replayed events.

use crate::contract::{
    ChatContract, ContractError, ContractResult, Subscription, SubscriptionRegistry, TxHash,
};
use crate::wallet::{ProviderEvent, Signer, WalletError, WalletProvider, WalletResult};
use async_trait::async_trait;
use chainchat_messaging::{Address, MessageSent, OnChainMessage, UsernameSet, MAX_USERNAME_LEN};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

pub const DEVNET_CHAIN_ID: u64 = 31337;

const DEV_ACCOUNTS: [&str; 3] = [
    "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
    "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
    "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
];

/// The well-known development accounts the devnet starts with.
pub fn dev_accounts() -> Vec<Address> {
    DEV_ACCOUNTS
        .iter()
        .map(|raw| Address::new_unchecked(*raw))
        .collect()
}

#[derive(Default)]
struct Ledger {
    messages: Vec<OnChainMessage>,
    /// Keyed by lowercased address.
    usernames: HashMap<String, String>,
    receipts: HashMap<TxHash, Result<(), String>>,
    last_timestamp: u64,
    tx_count: u64,
}

impl Ledger {
    fn next_tx(&mut self) -> TxHash {
        self.tx_count += 1;
        TxHash(format!("0x{:064x}", self.tx_count))
    }

    /// Block timestamps strictly increase, so message identities never collide.
    fn next_timestamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }
}

#[derive(Default, Clone, Copy)]
struct Faults {
    reject_connections: bool,
    fail_reads: bool,
    revert_writes: bool,
    drop_confirmations: bool,
}

struct ChainInner {
    chain_id: Mutex<u64>,
    accounts: Mutex<Vec<Address>>,
    ledger: Mutex<Ledger>,
    faults: Mutex<Faults>,
    provider_events: Arc<SubscriptionRegistry<ProviderEvent>>,
    message_events: Arc<SubscriptionRegistry<MessageSent>>,
    username_events: Arc<SubscriptionRegistry<UsernameSet>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct LocalChain {
    inner: Arc<ChainInner>,
}

impl LocalChain {
    pub fn new(chain_id: u64, accounts: Vec<Address>) -> Self {
        Self {
            inner: Arc::new(ChainInner {
                chain_id: Mutex::new(chain_id),
                accounts: Mutex::new(accounts),
                ledger: Mutex::new(Ledger::default()),
                faults: Mutex::new(Faults::default()),
                provider_events: SubscriptionRegistry::new(),
                message_events: SubscriptionRegistry::new(),
                username_events: SubscriptionRegistry::new(),
            }),
        }
    }

    pub fn with_dev_accounts() -> Self {
        Self::new(DEVNET_CHAIN_ID, dev_accounts())
    }

    pub fn chain_id(&self) -> u64 {
        *lock(&self.inner.chain_id)
    }

    /// Simulate the user switching (or revoking) accounts in the wallet.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        *lock(&self.inner.accounts) = accounts.clone();
        self.inner
            .provider_events
            .notify(ProviderEvent::AccountsChanged(accounts));
    }

    /// Simulate a network switch.
    pub fn switch_chain(&self, chain_id: u64) {
        *lock(&self.inner.chain_id) = chain_id;
        self.inner
            .provider_events
            .notify(ProviderEvent::ChainChanged(chain_id));
    }

    pub fn reject_connections(&self, reject: bool) {
        lock(&self.inner.faults).reject_connections = reject;
    }

    pub fn fail_reads(&self, fail: bool) {
        lock(&self.inner.faults).fail_reads = fail;
    }

    /// Make submissions revert immediately.
    pub fn revert_writes(&self, revert: bool) {
        lock(&self.inner.faults).revert_writes = revert;
    }

    /// Accept submissions but revert them during confirmation.
    pub fn drop_confirmations(&self, drop: bool) {
        lock(&self.inner.faults).drop_confirmations = drop;
    }

    /// Post a message as `sender`, bypassing any wallet.
    pub fn post_as(&self, sender: &Address, content: &str) -> OnChainMessage {
        self.inner.append_message(sender, content)
    }

    pub fn register_username_as(&self, account: &Address, username: &str) {
        self.inner.store_username(account, username);
    }

    /// Deliver the `MessageSent` event for the `index`-th stored message again.
    pub fn replay_message(&self, index: usize) -> Option<OnChainMessage> {
        let record = lock(&self.inner.ledger).messages.get(index).cloned()?;
        self.inner.message_events.notify(record.clone());
        Some(record)
    }

    pub fn messages(&self) -> Vec<OnChainMessage> {
        lock(&self.inner.ledger).messages.clone()
    }

    pub fn message_listener_count(&self) -> usize {
        self.inner.message_events.len()
    }

    pub fn username_listener_count(&self) -> usize {
        self.inner.username_events.len()
    }

    pub fn provider_listener_count(&self) -> usize {
        self.inner.provider_events.len()
    }
}

impl ChainInner {
    fn faults(&self) -> Faults {
        *lock(&self.faults)
    }

    fn append_message(&self, sender: &Address, content: &str) -> OnChainMessage {
        let record = {
            let mut ledger = lock(&self.ledger);
            let record = OnChainMessage {
                sender: sender.clone(),
                content: content.to_string(),
                timestamp: ledger.next_timestamp(),
            };
            ledger.messages.push(record.clone());
            record
        };
        let delivered = self.message_events.notify(record.clone());
        debug!(sender = %record.sender, timestamp = record.timestamp, delivered, "MessageSent");
        record
    }

    fn store_username(&self, account: &Address, username: &str) {
        lock(&self.ledger)
            .usernames
            .insert(account.as_str().to_ascii_lowercase(), username.to_string());
        let delivered = self.username_events.notify(UsernameSet {
            account: account.clone(),
            username: username.to_string(),
        });
        debug!(%account, username, delivered, "UsernameSet");
    }

    /// Record a transaction. Unless confirmations are dropped, `apply` runs
    /// immediately, as if the next block had been mined.
    fn submit(&self, apply: impl FnOnce(&Self)) -> ContractResult<TxHash> {
        let faults = self.faults();
        if faults.revert_writes {
            return Err(ContractError::Reverted("execution reverted".into()));
        }

        let outcome = if faults.drop_confirmations {
            Err("transaction dropped".to_string())
        } else {
            Ok(())
        };
        let tx = {
            let mut ledger = lock(&self.ledger);
            let tx = ledger.next_tx();
            ledger.receipts.insert(tx.clone(), outcome.clone());
            tx
        };
        if outcome.is_ok() {
            apply(self);
        }
        Ok(tx)
    }
}

#[async_trait]
impl WalletProvider for LocalChain {
    async fn request_accounts(&self) -> WalletResult<Vec<Address>> {
        if self.inner.faults().reject_connections {
            return Err(WalletError::UserRejected(
                "user rejected the request".to_string(),
            ));
        }
        Ok(lock(&self.inner.accounts).clone())
    }

    async fn signer(&self, account: Option<&Address>) -> WalletResult<Signer> {
        let accounts = lock(&self.inner.accounts);
        let selected = match account {
            Some(wanted) => accounts.iter().find(|known| known.matches(wanted)),
            None => accounts.first(),
        };
        selected
            .cloned()
            .map(Signer::new)
            .ok_or_else(|| WalletError::Connection("account is not available in the wallet".into()))
    }

    fn bind_contract(&self, address: &Address, signer: Signer) -> Arc<dyn ChatContract> {
        Arc::new(LocalContract {
            chain: Arc::clone(&self.inner),
            address: address.clone(),
            signer,
        })
    }

    fn subscribe(&self) -> Subscription<ProviderEvent> {
        self.inner.provider_events.register()
    }
}

/// Chat contract handle on a [`LocalChain`], bound to one signer.
pub struct LocalContract {
    chain: Arc<ChainInner>,
    address: Address,
    signer: Signer,
}

impl LocalContract {
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    fn check_reads(&self) -> ContractResult<()> {
        if self.chain.faults().fail_reads {
            return Err(ContractError::Call("network request failed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatContract for LocalContract {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn get_messages(&self) -> ContractResult<Vec<OnChainMessage>> {
        self.check_reads()?;
        Ok(lock(&self.chain.ledger).messages.clone())
    }

    async fn get_username(&self, account: &Address) -> ContractResult<String> {
        self.check_reads()?;
        Ok(lock(&self.chain.ledger)
            .usernames
            .get(&account.as_str().to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, content: &str) -> ContractResult<TxHash> {
        if content.is_empty() {
            return Err(ContractError::Reverted("message cannot be empty".into()));
        }
        let sender = self.signer.account().clone();
        let content = content.to_string();
        self.chain
            .submit(move |chain| {
                chain.append_message(&sender, &content);
            })
    }

    async fn set_username(&self, username: &str) -> ContractResult<TxHash> {
        if username.is_empty() {
            return Err(ContractError::Reverted("username cannot be empty".into()));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(ContractError::Reverted("username too long".into()));
        }
        let account = self.signer.account().clone();
        let username = username.to_string();
        self.chain.submit(move |chain| {
            chain.store_username(&account, &username);
        })
    }

    async fn wait_for(&self, tx: &TxHash) -> ContractResult<()> {
        let receipt = lock(&self.chain.ledger).receipts.get(tx).cloned();
        match receipt {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(ContractError::Reverted(reason)),
            None => Err(ContractError::Call(format!("unknown transaction {tx}"))),
        }
    }

    fn on_message_sent(&self) -> Subscription<MessageSent> {
        self.chain.message_events.register()
    }

    fn on_username_set(&self) -> Subscription<UsernameSet> {
        self.chain.username_events.register()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONTRACT_ADDRESS;

    fn contract_for(chain: &LocalChain, account: &Address) -> Arc<dyn ChatContract> {
        chain.bind_contract(
            &Address::new_unchecked(DEFAULT_CONTRACT_ADDRESS),
            Signer::new(account.clone()),
        )
    }

    #[tokio::test]
    async fn test_send_and_confirm() {
        let chain = LocalChain::with_dev_accounts();
        let alice = dev_accounts()[0].clone();
        let contract = contract_for(&chain, &alice);
        let mut events = contract.on_message_sent();

        let tx = contract.send_message("gm").await.unwrap();
        contract.wait_for(&tx).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.sender, alice);
        assert_eq!(event.content, "gm");
        assert_eq!(contract.get_messages().await.unwrap(), vec![event]);
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let chain = LocalChain::with_dev_accounts();
        let alice = dev_accounts()[0].clone();
        let first = chain.post_as(&alice, "one");
        let second = chain.post_as(&alice, "two");
        assert!(second.timestamp > first.timestamp);
    }

    #[tokio::test]
    async fn test_username_registry_is_case_insensitive() {
        let chain = LocalChain::with_dev_accounts();
        let alice = dev_accounts()[0].clone();
        let contract = contract_for(&chain, &alice);

        let tx = contract.set_username("alice").await.unwrap();
        contract.wait_for(&tx).await.unwrap();

        let lower = Address::new_unchecked(alice.as_str().to_ascii_lowercase());
        assert_eq!(contract.get_username(&lower).await.unwrap(), "alice");
        assert_eq!(
            contract.get_username(&dev_accounts()[1]).await.unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn test_contract_rules() {
        let chain = LocalChain::with_dev_accounts();
        let contract = contract_for(&chain, &dev_accounts()[0]);

        assert!(matches!(
            contract.send_message("").await,
            Err(ContractError::Reverted(_))
        ));
        assert!(matches!(
            contract.set_username(&"x".repeat(MAX_USERNAME_LEN + 1)).await,
            Err(ContractError::Reverted(_))
        ));
        assert!(contract.set_username(&"x".repeat(MAX_USERNAME_LEN)).await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_confirmation_is_not_applied() {
        let chain = LocalChain::with_dev_accounts();
        let contract = contract_for(&chain, &dev_accounts()[0]);
        chain.drop_confirmations(true);

        let tx = contract.send_message("lost").await.unwrap();
        assert!(matches!(
            contract.wait_for(&tx).await,
            Err(ContractError::Reverted(_))
        ));
        assert!(chain.messages().is_empty());
    }

    #[tokio::test]
    async fn test_fault_switches() {
        let chain = LocalChain::with_dev_accounts();
        let contract = contract_for(&chain, &dev_accounts()[0]);

        chain.fail_reads(true);
        assert!(contract.get_messages().await.is_err());
        chain.fail_reads(false);

        chain.revert_writes(true);
        assert!(contract.send_message("nope").await.is_err());

        chain.reject_connections(true);
        assert!(chain.request_accounts().await.is_err());
    }

    #[tokio::test]
    async fn test_provider_events() {
        let chain = LocalChain::with_dev_accounts();
        let mut events = chain.subscribe();

        chain.set_accounts(vec![dev_accounts()[2].clone()]);
        chain.switch_chain(1);

        assert_eq!(
            events.recv().await,
            Some(ProviderEvent::AccountsChanged(vec![dev_accounts()[2].clone()]))
        );
        assert_eq!(events.recv().await, Some(ProviderEvent::ChainChanged(1)));
        assert_eq!(chain.chain_id(), 1);
    }

    #[tokio::test]
    async fn test_replay_redelivers_event() {
        let chain = LocalChain::with_dev_accounts();
        let contract = contract_for(&chain, &dev_accounts()[0]);
        let mut events = contract.on_message_sent();

        let posted = chain.post_as(&dev_accounts()[1], "hello");
        chain.replay_message(0);

        assert_eq!(events.recv().await, Some(posted.clone()));
        assert_eq!(events.recv().await, Some(posted));
        assert!(chain.replay_message(5).is_none());
    }
}
