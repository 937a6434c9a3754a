//! Application state shared by the session manager, the synchronizer and
//! the HTTP surface.

use crate::config::AppConfig;
use chainchat_messaging::{Address, ChatMessage, MessageId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Lifecycle of one state-mutating contract call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    #[default]
    Idle,
    Submitted,
    Confirmed,
    Failed,
}

/// Which part of the view an update touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Session,
    Messages,
    Nickname,
    Composer,
    Transaction,
    Reset,
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatView {
    pub account: Option<Address>,
    pub connected: bool,
    pub connecting: bool,
    /// Registered name of the session account, empty when unset.
    pub nickname: String,
    pub messages: Vec<ChatMessage>,
    pub loading_messages: bool,
    pub send_state: TxState,
    pub username_state: TxState,
    /// Simulated replies scheduled but not yet delivered.
    pub ai_pending: usize,
    pub draft: String,
    pub nickname_draft: String,
    /// Transient error banner, cleared when the next action starts.
    pub error: Option<String>,
    /// Number of full reloads triggered by network changes.
    pub reloads: u64,
}

impl ChatView {
    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|msg| &msg.id == id)
    }

    pub fn ai_thinking(&self) -> bool {
        self.ai_pending > 0
    }

    /// Submit guard for the message composer.
    pub fn can_send(&self) -> bool {
        self.connected
            && !self.draft.trim().is_empty()
            && self.send_state != TxState::Submitted
            && !self.ai_thinking()
    }

    /// Submit guard for the nickname form.
    pub fn can_set_username(&self) -> bool {
        self.connected
            && !self.nickname_draft.trim().is_empty()
            && self.username_state != TxState::Submitted
    }

    /// Drop everything tied to the chat room, keeping session fields.
    pub fn clear_chat(&mut self) {
        self.nickname.clear();
        self.messages.clear();
        self.loading_messages = false;
        self.send_state = TxState::Idle;
        self.username_state = TxState::Idle;
        self.ai_pending = 0;
        self.draft.clear();
        self.nickname_draft.clear();
    }
}

#[derive(Debug)]
pub struct AppState {
    config: AppConfig,
    view: RwLock<ChatView>,
    changes: broadcast::Sender<StateChange>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let (changes, _rx) = broadcast::channel(64);
        Arc::new(Self {
            config,
            view: RwLock::new(ChatView::default()),
            changes,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_id(&self) -> &str {
        &self.config.build_id
    }

    pub async fn snapshot(&self) -> ChatView {
        self.view.read().await.clone()
    }

    /// Read from the view without cloning it.
    pub async fn read<R>(&self, inspect: impl FnOnce(&ChatView) -> R) -> R {
        inspect(&*self.view.read().await)
    }

    /// Apply `apply` to the view and notify subscribers of `change`.
    pub async fn update<R>(&self, change: StateChange, apply: impl FnOnce(&mut ChatView) -> R) -> R {
        let result = apply(&mut *self.view.write().await);
        let _ = self.changes.send(change);
        result
    }

    /// Return to the initial view, as a fresh application start would.
    pub async fn reset(&self) {
        self.update(StateChange::Reset, |view| {
            let reloads = view.reloads + 1;
            *view = ChatView {
                reloads,
                ..ChatView::default()
            };
        })
        .await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}
