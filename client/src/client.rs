//! Top-level coordinator: one wallet session, one synchronized chat room.

use crate::contract::{SubscriptionHandle, TxHash};
use crate::messaging::{AutoResponder, ChatError, ChatSynchronizer, Outbox};
use crate::state::{AppState, StateChange};
use crate::wallet::{ProviderEvent, Session, SessionManager, WalletError, WalletProvider};
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

struct ProviderWatch {
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

pub struct ChatClient {
    state: Arc<AppState>,
    sessions: SessionManager,
    synchronizer: ChatSynchronizer,
    outbox: Outbox,
    watcher: Mutex<Option<ProviderWatch>>,
}

impl ChatClient {
    pub fn new(state: Arc<AppState>, provider: Option<Arc<dyn WalletProvider>>) -> Arc<Self> {
        let sessions = SessionManager::new(
            provider,
            state.config().contract_address.clone(),
            Arc::clone(&state),
        );
        let responder = AutoResponder::from_config(Arc::clone(&state));
        Arc::new(Self {
            synchronizer: ChatSynchronizer::new(Arc::clone(&state), responder),
            outbox: Outbox::new(Arc::clone(&state)),
            sessions,
            state,
            watcher: Mutex::new(None),
        })
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub async fn session(&self) -> Option<Session> {
        self.sessions.session().await
    }

    /// Connect the wallet, start watching provider events and attach the
    /// chat room. A failed history load is reported through the view's
    /// banner but does not undo the connection. A failed connection tears
    /// down whatever an earlier one left attached.
    pub async fn connect(self: &Arc<Self>) -> ClientResult<Session> {
        let session = match self.sessions.connect().await {
            Ok(session) => session,
            Err(err) => {
                self.stop_watch();
                self.synchronizer.detach();
                self.state
                    .update(StateChange::Reset, |view| view.clear_chat())
                    .await;
                return Err(err.into());
            }
        };
        self.watch_provider();
        if let Err(err) = self
            .synchronizer
            .attach(Arc::clone(&session.contract), &session.account)
            .await
        {
            warn!(%err, "chat room attached without history");
        }
        Ok(session)
    }

    pub async fn disconnect(&self) {
        self.stop_watch();
        self.synchronizer.detach();
        self.sessions.disconnect().await;
        self.state
            .update(StateChange::Reset, |view| view.clear_chat())
            .await;
    }

    pub async fn handle_provider_event(&self, event: ProviderEvent) -> ClientResult<()> {
        match event {
            ProviderEvent::AccountsChanged(accounts) if accounts.is_empty() => {
                info!("wallet revoked all accounts");
                self.disconnect().await;
            }
            ProviderEvent::AccountsChanged(accounts) => {
                if let Some(session) = self.sessions.handle_accounts_changed(accounts).await? {
                    // Replies owed to the previous account are dropped with its room.
                    self.synchronizer.detach();
                    self.state
                        .update(StateChange::Reset, |view| view.clear_chat())
                        .await;
                    if let Err(err) = self
                        .synchronizer
                        .attach(Arc::clone(&session.contract), &session.account)
                        .await
                    {
                        warn!(%err, account = %session.account, "reattach after account change failed");
                    }
                }
            }
            ProviderEvent::ChainChanged(chain_id) => self.handle_chain_changed(chain_id).await,
        }
        Ok(())
    }

    /// Drop every piece of session and chat state, as a page reload would.
    /// The wallet is not reconnected automatically.
    pub async fn handle_chain_changed(&self, chain_id: u64) {
        info!(chain_id, "network changed, reloading");
        self.stop_watch();
        self.synchronizer.detach();
        self.sessions.disconnect().await;
        self.state.reset().await;
    }

    pub async fn send_message(&self, text: &str) -> ClientResult<Option<TxHash>> {
        let draft = text.to_string();
        self.state
            .update(StateChange::Composer, |view| view.draft = draft)
            .await;
        let session = self.sessions.session().await.ok_or(ChatError::NotConnected)?;
        Ok(self
            .outbox
            .send_message(session.contract.as_ref(), text)
            .await?)
    }

    pub async fn set_username(&self, name: &str) -> ClientResult<Option<TxHash>> {
        let draft = name.to_string();
        self.state
            .update(StateChange::Composer, |view| view.nickname_draft = draft)
            .await;
        let session = self.sessions.session().await.ok_or(ChatError::NotConnected)?;
        Ok(self
            .outbox
            .set_username(session.contract.as_ref(), name)
            .await?)
    }

    /// Contract listeners currently registered by the synchronizer.
    pub fn listener_count(&self) -> usize {
        self.synchronizer.listener_count()
    }

    pub fn is_watching(&self) -> bool {
        self.lock_watcher().is_some()
    }

    fn watch_provider(self: &Arc<Self>) {
        let Some(provider) = self.sessions.provider() else {
            return;
        };
        self.stop_watch();

        let (handle, mut events) = provider.subscribe().into_parts();
        let client: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(client) = client.upgrade() else {
                    break;
                };
                debug!(?event, "provider event");
                if let Err(err) = client.handle_provider_event(event).await {
                    warn!(%err, "failed to handle provider event");
                }
            }
        });
        *self.lock_watcher() = Some(ProviderWatch { handle, task });
    }

    /// Remove the provider listener. The watcher task may be the caller, so
    /// it is left to drain rather than aborted.
    fn stop_watch(&self) {
        if let Some(watch) = self.lock_watcher().take() {
            watch.handle.unsubscribe();
            drop(watch.task);
        }
    }

    fn lock_watcher(&self) -> std::sync::MutexGuard<'_, Option<ProviderWatch>> {
        self.watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(watch) = self.lock_watcher().take() {
            watch.handle.unsubscribe();
            watch.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::devnet::{dev_accounts, LocalChain};
    use crate::state::{ChatView, TxState};
    use std::time::Duration;

    fn quick_config() -> AppConfig {
        AppConfig {
            reply_delay_min: Duration::from_millis(5),
            reply_delay_max: Duration::from_millis(10),
            ..AppConfig::default()
        }
    }

    fn client_on(chain: &LocalChain) -> Arc<ChatClient> {
        let state = AppState::new(quick_config());
        ChatClient::new(state, Some(Arc::new(chain.clone())))
    }

    async fn settle(state: &AppState, done: impl Fn(&ChatView) -> bool) -> ChatView {
        for _ in 0..200 {
            let view = state.snapshot().await;
            if done(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("view never settled: {:?}", state.snapshot().await);
    }

    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never held");
    }

    #[tokio::test]
    async fn test_connect_without_provider_reports_banner() {
        let client = ChatClient::new(AppState::new(quick_config()), None);

        let err = client.connect().await.unwrap_err();

        assert!(matches!(err, ClientError::Wallet(WalletError::ProviderUnavailable)));
        assert!(!client.is_watching());
        assert!(client.state().snapshot().await.error.is_some());
    }

    #[tokio::test]
    async fn test_connect_loads_history_and_listens() {
        let chain = LocalChain::with_dev_accounts();
        chain.post_as(&dev_accounts()[1], "before");
        let client = client_on(&chain);

        client.connect().await.unwrap();
        assert_eq!(client.state().snapshot().await.messages.len(), 1);
        assert_eq!(client.listener_count(), 2);
        assert_eq!(chain.provider_listener_count(), 1);

        chain.post_as(&dev_accounts()[2], "after");
        let view = settle(client.state(), |view| view.messages.len() == 2).await;
        assert_eq!(view.messages[1].content, "after");
    }

    #[tokio::test]
    async fn test_replayed_event_is_listed_once() {
        let chain = LocalChain::with_dev_accounts();
        let client = client_on(&chain);
        client.connect().await.unwrap();

        chain.post_as(&dev_accounts()[1], "once");
        chain.replay_message(0);
        chain.post_as(&dev_accounts()[1], "twice");

        let view = settle(client.state(), |view| {
            view.messages.iter().any(|m| m.content == "twice")
        })
        .await;
        let contents: Vec<&str> = view.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["once", "twice"]);
    }

    #[tokio::test]
    async fn test_send_round_trip() {
        let chain = LocalChain::with_dev_accounts();
        let client = client_on(&chain);
        client.connect().await.unwrap();

        client.set_username("alice").await.unwrap();
        client.send_message("gm").await.unwrap();

        let view = settle(client.state(), |view| {
            view.messages.len() == 1 && view.nickname == "alice"
        })
        .await;
        assert_eq!(view.messages[0].sender_display, "alice");
        assert_eq!(view.send_state, TxState::Confirmed);
        assert!(view.draft.is_empty());
    }

    #[tokio::test]
    async fn test_mention_gets_simulated_reply() {
        let chain = LocalChain::with_dev_accounts();
        let client = client_on(&chain);
        client.connect().await.unwrap();

        client.send_message("@AI hello").await.unwrap();

        let view = settle(client.state(), |view| {
            view.messages.len() == 2 && !view.ai_thinking()
        })
        .await;
        assert!(!view.messages[0].is_simulated());
        assert!(view.messages[1].is_simulated());
    }

    #[tokio::test]
    async fn test_send_without_session_keeps_draft() {
        let chain = LocalChain::with_dev_accounts();
        let client = client_on(&chain);

        let err = client.send_message("hello?").await.unwrap_err();

        assert!(matches!(err, ClientError::Chat(ChatError::NotConnected)));
        assert_eq!(client.state().snapshot().await.draft, "hello?");
        assert!(chain.messages().is_empty());
    }

    #[tokio::test]
    async fn test_account_switch_rebinds() {
        let chain = LocalChain::with_dev_accounts();
        let bob = dev_accounts()[1].clone();
        chain.register_username_as(&bob, "bob");
        let client = client_on(&chain);
        client.connect().await.unwrap();

        chain.set_accounts(vec![bob.clone()]);
        let view = settle(client.state(), |view| view.nickname == "bob").await;

        assert_eq!(view.account, Some(bob.clone()));
        assert_eq!(client.session().await.unwrap().account, bob);
        eventually(|| client.listener_count() == 2).await;
        assert_eq!(chain.message_listener_count(), 1);
        assert_eq!(chain.username_listener_count(), 1);

        client.send_message("from bob").await.unwrap();
        assert_eq!(chain.messages()[0].sender, bob);
    }

    #[tokio::test]
    async fn test_revoked_accounts_disconnect() {
        let chain = LocalChain::with_dev_accounts();
        let client = client_on(&chain);
        client.connect().await.unwrap();

        chain.set_accounts(Vec::new());
        settle(client.state(), |view| !view.connected).await;

        assert!(client.session().await.is_none());
        assert_eq!(client.listener_count(), 0);
        assert_eq!(chain.message_listener_count(), 0);
        assert_eq!(chain.provider_listener_count(), 0);
    }

    #[tokio::test]
    async fn test_chain_change_reloads() {
        let chain = LocalChain::with_dev_accounts();
        chain.post_as(&dev_accounts()[1], "old network");
        let client = client_on(&chain);
        client.connect().await.unwrap();

        chain.switch_chain(1);
        let view = settle(client.state(), |view| view.reloads == 1).await;

        assert!(!view.connected);
        assert!(view.messages.is_empty());
        assert!(!client.is_watching());
        assert_eq!(chain.message_listener_count(), 0);
        assert_eq!(chain.username_listener_count(), 0);
        assert_eq!(chain.provider_listener_count(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_cycles_do_not_leak_listeners() {
        let chain = LocalChain::with_dev_accounts();
        let client = client_on(&chain);

        for _ in 0..3 {
            client.connect().await.unwrap();
            client.disconnect().await;
        }
        client.connect().await.unwrap();

        assert_eq!(chain.message_listener_count(), 1);
        assert_eq!(chain.username_listener_count(), 1);
        assert_eq!(chain.provider_listener_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_reconnect_detaches_previous_room() {
        let chain = LocalChain::with_dev_accounts();
        let client = client_on(&chain);
        client.connect().await.unwrap();
        chain.post_as(&dev_accounts()[1], "before");
        settle(client.state(), |view| view.messages.len() == 1).await;

        chain.reject_connections(true);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Wallet(WalletError::UserRejected(_))));

        assert!(!client.is_watching());
        assert_eq!(client.listener_count(), 0);
        assert_eq!(chain.message_listener_count(), 0);
        assert_eq!(chain.username_listener_count(), 0);
        assert_eq!(chain.provider_listener_count(), 0);

        chain.post_as(&dev_accounts()[1], "while disconnected");
        tokio::time::sleep(Duration::from_millis(20)).await;
        let view = client.state().snapshot().await;
        assert!(!view.connected);
        assert!(view.messages.is_empty());
        assert!(view.error.is_some());
    }

    #[tokio::test]
    async fn test_account_switch_cancels_pending_reply() {
        let chain = LocalChain::with_dev_accounts();
        let state = AppState::new(AppConfig {
            reply_delay_min: Duration::from_millis(300),
            reply_delay_max: Duration::from_millis(400),
            ..AppConfig::default()
        });
        let client = ChatClient::new(state, Some(Arc::new(chain.clone())));
        client.connect().await.unwrap();

        client.send_message("@AI hello").await.unwrap();
        settle(client.state(), |view| view.ai_thinking()).await;

        let bob = dev_accounts()[1].clone();
        chain.set_accounts(vec![bob.clone()]);
        settle(client.state(), |view| view.account.as_ref() == Some(&bob)).await;
        eventually(|| client.listener_count() == 2).await;

        tokio::time::sleep(Duration::from_millis(600)).await;
        let view = client.state().snapshot().await;
        assert!(!view.ai_thinking());
        assert!(view.messages.iter().all(|m| !m.is_simulated()));
        assert_eq!(view.messages.len(), 1);
    }
}
