//! State-mutating contract calls: sending messages and registering names.
//!
//! Each call walks `idle -> submitted -> confirmed`, or
//! `idle -> submitted -> failed -> idle` with the input restored.

use super::{ChatError, Result};
use crate::contract::{ChatContract, TxHash};
use crate::state::{AppState, ChatView, StateChange, TxState};
use chainchat_messaging::MAX_USERNAME_LEN;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Message,
    Username,
}

impl Mutation {
    fn action(self) -> &'static str {
        match self {
            Mutation::Message => "send message",
            Mutation::Username => "set username",
        }
    }

    fn tx_state(self, view: &mut ChatView) -> &mut TxState {
        match self {
            Mutation::Message => &mut view.send_state,
            Mutation::Username => &mut view.username_state,
        }
    }

    fn input(self, view: &mut ChatView) -> &mut String {
        match self {
            Mutation::Message => &mut view.draft,
            Mutation::Username => &mut view.nickname_draft,
        }
    }
}

pub struct Outbox {
    state: Arc<AppState>,
}

impl Outbox {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Append `text` to the contract's log and wait for confirmation.
    ///
    /// Blank text is a no-op and returns `Ok(None)` without touching the
    /// contract.
    pub async fn send_message(
        &self,
        contract: &dyn ChatContract,
        text: &str,
    ) -> Result<Option<TxHash>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        self.run(Mutation::Message, contract, text).await.map(Some)
    }

    /// Register `text` as the signer's display name.
    pub async fn set_username(
        &self,
        contract: &dyn ChatContract,
        text: &str,
    ) -> Result<Option<TxHash>> {
        let username = text.trim();
        if username.is_empty() {
            return Ok(None);
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            let err = ChatError::UsernameTooLong {
                max: MAX_USERNAME_LEN,
            };
            let banner = err.to_string();
            self.state
                .update(StateChange::Composer, |view| view.error = Some(banner))
                .await;
            return Err(err);
        }
        self.run(Mutation::Username, contract, text).await.map(Some)
    }

    async fn run(&self, kind: Mutation, contract: &dyn ChatContract, input: &str) -> Result<TxHash> {
        self.state
            .update(StateChange::Transaction, |view| {
                if *kind.tx_state(view) == TxState::Submitted {
                    return Err(ChatError::InProgress);
                }
                if kind == Mutation::Message && view.ai_thinking() {
                    return Err(ChatError::ReplyPending);
                }
                view.error = None;
                *kind.tx_state(view) = TxState::Submitted;
                Ok(())
            })
            .await?;

        let payload = input.trim();
        let submitted = match kind {
            Mutation::Message => contract.send_message(payload).await,
            Mutation::Username => contract.set_username(payload).await,
        };
        let tx = match submitted {
            Ok(tx) => tx,
            Err(err) => return Err(self.fail(kind, input, err.to_string()).await),
        };
        debug!(%tx, action = kind.action(), "transaction submitted");
        self.state
            .update(StateChange::Composer, |view| kind.input(view).clear())
            .await;

        if let Err(err) = contract.wait_for(&tx).await {
            return Err(self.fail(kind, input, err.to_string()).await);
        }
        self.state
            .update(StateChange::Transaction, |view| {
                *kind.tx_state(view) = TxState::Confirmed
            })
            .await;
        info!(%tx, action = kind.action(), "transaction confirmed");
        Ok(tx)
    }

    async fn fail(&self, kind: Mutation, input: &str, reason: String) -> ChatError {
        let err = ChatError::Send {
            action: kind.action(),
            reason,
        };
        warn!(%err, "transaction failed");
        let banner = err.to_string();
        let restored = input.to_string();
        self.state
            .update(StateChange::Transaction, |view| {
                *kind.tx_state(view) = TxState::Failed;
                *kind.input(view) = restored;
                view.error = Some(banner);
            })
            .await;
        self.state
            .update(StateChange::Transaction, |view| *kind.tx_state(view) = TxState::Idle)
            .await;
        err
    }
}
