//! Keeps the local message list in step with the chat contract.

use super::{AutoResponder, ChatError, Result};
use crate::contract::{ChatContract, ContractError, SubscriptionHandle};
use crate::state::{AppState, StateChange};
use chainchat_messaging::autoreply::mentions_ai;
use chainchat_messaging::{
    resolve_display_name, Address, ChatMessage, MessageId, MessageSent, UsernameSet,
};
use futures::future::try_join_all;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Listener {
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

impl Listener {
    fn unsubscribe(self) {
        self.handle.unsubscribe();
        self.task.abort();
    }
}

/// Applies contract events to [`AppState`]. Cheap to clone into listener tasks.
#[derive(Clone)]
pub struct EventSink {
    state: Arc<AppState>,
    responder: AutoResponder,
}

impl EventSink {
    /// Append a `MessageSent` event unless its identity is already listed.
    /// Returns whether the message was appended.
    pub async fn on_message_sent(&self, contract: &dyn ChatContract, event: MessageSent) -> bool {
        let id = MessageId::on_chain(&event.sender, event.timestamp);
        if self.state.read(|view| view.contains(&id)).await {
            debug!(%id, "duplicate message event ignored");
            return false;
        }

        let registered = match contract.get_username(&event.sender).await {
            Ok(name) => name,
            Err(err) => {
                warn!(%err, sender = %event.sender, "username lookup failed for event");
                String::new()
            }
        };
        let message = ChatMessage::from_chain(&event, resolve_display_name(&registered, &event.sender));
        let trigger = mentions_ai(&message.content).then(|| message.content.clone());

        // The lookup above yields, so a replay may have landed meanwhile.
        let appended = self
            .state
            .update(StateChange::Messages, |view| {
                if view.contains(&message.id) {
                    false
                } else {
                    view.messages.push(message);
                    true
                }
            })
            .await;

        if !appended {
            debug!(%id, "duplicate message event ignored");
        } else if let Some(trigger) = trigger {
            self.responder.schedule(trigger).await;
        }
        appended
    }

    /// Rename every on-chain message from the event's account. Returns how
    /// many messages changed.
    pub async fn on_username_set(&self, event: UsernameSet) -> usize {
        let UsernameSet { account, username } = event;
        let renamed = self
            .state
            .update(StateChange::Messages, |view| {
                if view.account.as_ref().is_some_and(|own| own.matches(&account)) {
                    view.nickname = username.clone();
                }
                let mut renamed = 0;
                for message in view
                    .messages
                    .iter_mut()
                    .filter(|msg| !msg.is_simulated() && msg.sender.matches(&account))
                {
                    message.sender_display = username.clone();
                    renamed += 1;
                }
                renamed
            })
            .await;
        debug!(%account, %username, renamed, "username updated");
        renamed
    }
}

/// Loads history, keeps the contract listeners, and tears them down again.
pub struct ChatSynchronizer {
    state: Arc<AppState>,
    sink: EventSink,
    listeners: Mutex<Vec<Listener>>,
}

impl ChatSynchronizer {
    pub fn new(state: Arc<AppState>, responder: AutoResponder) -> Self {
        Self {
            sink: EventSink {
                state: Arc::clone(&state),
                responder,
            },
            state,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    /// Bind to a (new) contract handle: drop old listeners, load history and
    /// the owner's nickname, then listen for events.
    ///
    /// Events emitted between the history read and the subscription are not
    /// recovered.
    pub async fn attach(&self, contract: Arc<dyn ChatContract>, account: &Address) -> Result<usize> {
        self.unsubscribe_all();
        let history = self.load_history(contract.as_ref()).await;
        self.fetch_nickname(contract.as_ref(), account).await;
        self.subscribe_to_messages(Arc::clone(&contract));
        self.subscribe_to_username_changes(contract);
        history
    }

    /// Remove listeners and cancel replies still in flight.
    pub fn detach(&self) {
        self.unsubscribe_all();
        self.sink.responder.cancel_all();
    }

    /// Replace the local list with the contract's full history.
    pub async fn load_history(&self, contract: &dyn ChatContract) -> Result<usize> {
        self.state
            .update(StateChange::Messages, |view| {
                view.error = None;
                view.loading_messages = true;
            })
            .await;

        match fetch_history(contract).await {
            Ok(messages) => {
                let count = messages.len();
                self.state
                    .update(StateChange::Messages, |view| {
                        view.messages = messages;
                        view.loading_messages = false;
                    })
                    .await;
                info!(count, "message history loaded");
                Ok(count)
            }
            Err(err) => {
                let banner = err.to_string();
                self.state
                    .update(StateChange::Messages, |view| {
                        view.messages.clear();
                        view.loading_messages = false;
                        view.error = Some(banner);
                    })
                    .await;
                warn!(%err, "failed to load message history");
                Err(err)
            }
        }
    }

    pub async fn fetch_nickname(&self, contract: &dyn ChatContract, account: &Address) {
        match contract.get_username(account).await {
            Ok(nickname) => {
                self.state
                    .update(StateChange::Nickname, |view| view.nickname = nickname)
                    .await;
            }
            Err(err) => warn!(%err, %account, "failed to fetch nickname"),
        }
    }

    pub fn subscribe_to_messages(&self, contract: Arc<dyn ChatContract>) {
        let (handle, mut events) = contract.on_message_sent().into_parts();
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!(sender = %event.sender, timestamp = event.timestamp, "MessageSent received");
                sink.on_message_sent(contract.as_ref(), event).await;
            }
        });
        self.push_listener(Listener { handle, task });
    }

    pub fn subscribe_to_username_changes(&self, contract: Arc<dyn ChatContract>) {
        let (handle, mut events) = contract.on_username_set().into_parts();
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                sink.on_username_set(event).await;
            }
        });
        self.push_listener(Listener { handle, task });
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    fn push_listener(&self, listener: Listener) {
        self.lock_listeners().push(listener);
    }

    fn unsubscribe_all(&self) {
        let listeners: Vec<Listener> = self.lock_listeners().drain(..).collect();
        if !listeners.is_empty() {
            debug!(count = listeners.len(), "removing contract listeners");
        }
        for listener in listeners {
            listener.unsubscribe();
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<Listener>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ChatSynchronizer {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

async fn fetch_history(contract: &dyn ChatContract) -> Result<Vec<ChatMessage>> {
    let records = contract
        .get_messages()
        .await
        .map_err(|e| ChatError::Fetch(e.to_string()))?;

    try_join_all(records.iter().map(|record| async move {
        let registered = contract.get_username(&record.sender).await?;
        Ok::<_, ContractError>(ChatMessage::from_chain(
            record,
            resolve_display_name(&registered, &record.sender),
        ))
    }))
    .await
    .map_err(|e| ChatError::Fetch(e.to_string()))
}
