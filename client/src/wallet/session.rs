use super::{Session, WalletError, WalletProvider, WalletResult};
use crate::state::{AppState, StateChange};
use chainchat_messaging::Address;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Owns the wallet session and mirrors it into [`AppState`].
pub struct SessionManager {
    provider: Option<Arc<dyn WalletProvider>>,
    contract_address: Address,
    state: Arc<AppState>,
    session: RwLock<Option<Session>>,
}

impl SessionManager {
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        contract_address: Address,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            provider,
            contract_address,
            state,
            session: RwLock::new(None),
        }
    }

    pub fn provider(&self) -> Option<&Arc<dyn WalletProvider>> {
        self.provider.as_ref()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Request account access and bind the contract to the first account.
    pub async fn connect(&self) -> WalletResult<Session> {
        self.state
            .update(StateChange::Session, |view| {
                view.error = None;
                view.connecting = true;
            })
            .await;

        match self.establish().await {
            Ok(session) => {
                *self.session.write().await = Some(session.clone());
                let account = session.account.clone();
                self.state
                    .update(StateChange::Session, |view| {
                        view.account = Some(account);
                        view.connected = true;
                        view.connecting = false;
                    })
                    .await;
                info!(account = %session.account, "wallet connected");
                Ok(session)
            }
            Err(err) => {
                *self.session.write().await = None;
                let banner = err.to_string();
                self.state
                    .update(StateChange::Session, |view| {
                        view.account = None;
                        view.connected = false;
                        view.connecting = false;
                        view.error = Some(banner);
                    })
                    .await;
                warn!(%err, "wallet connection failed");
                Err(err)
            }
        }
    }

    async fn establish(&self) -> WalletResult<Session> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(WalletError::ProviderUnavailable)?;

        let accounts = provider.request_accounts().await?;
        let account = accounts
            .into_iter()
            .next()
            .ok_or_else(|| WalletError::Connection("provider returned no accounts".into()))?;

        let signer = provider.signer(Some(&account)).await?;
        let contract = provider.bind_contract(&self.contract_address, signer.clone());

        Ok(Session {
            account,
            signer,
            contract,
            connected: true,
        })
    }

    /// Forget the session. Provider-side permissions are left alone.
    pub async fn disconnect(&self) {
        let previous = self.session.write().await.take();
        self.state
            .update(StateChange::Session, |view| {
                view.account = None;
                view.connected = false;
                view.connecting = false;
                view.error = None;
            })
            .await;
        if let Some(session) = previous {
            info!(account = %session.account, "wallet disconnected");
        }
    }

    /// React to `accountsChanged`.
    ///
    /// An empty list disconnects. Otherwise signer and contract are rebound
    /// to the first account and the rebound session is returned.
    pub async fn handle_accounts_changed(
        &self,
        accounts: Vec<Address>,
    ) -> WalletResult<Option<Session>> {
        let Some(account) = accounts.into_iter().next() else {
            self.disconnect().await;
            return Ok(None);
        };
        let provider = self
            .provider
            .as_ref()
            .ok_or(WalletError::ProviderUnavailable)?;

        if self.session.read().await.is_none() {
            debug!(%account, "account change without an active session");
            return Ok(None);
        }

        let signer = match provider.signer(Some(&account)).await {
            Ok(signer) => signer,
            Err(err) => {
                let banner = err.to_string();
                self.state
                    .update(StateChange::Session, |view| view.error = Some(banner))
                    .await;
                warn!(%err, %account, "failed to rebind signer");
                return Err(err);
            }
        };
        let contract = provider.bind_contract(&self.contract_address, signer.clone());

        let rebound = {
            let mut guard = self.session.write().await;
            let Some(session) = guard.as_mut() else {
                debug!(%account, "session closed while rebinding");
                return Ok(None);
            };
            session.contract = contract;
            session.signer = signer;
            session.account = account.clone();
            session.clone()
        };

        self.state
            .update(StateChange::Session, |view| view.account = Some(account))
            .await;
        info!(account = %rebound.account, "active account changed");
        Ok(Some(rebound))
    }
}
