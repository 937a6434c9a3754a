//! Delayed delivery of simulated "@AI" replies.

use crate::state::{AppState, StateChange};
use chainchat_messaging::autoreply::simulated_reply;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

/// Schedules canned replies after a randomized delay, mimicking a backend call.
#[derive(Clone)]
pub struct AutoResponder {
    state: Arc<AppState>,
    min_delay: Duration,
    max_delay: Duration,
    pending: Arc<Mutex<Vec<AbortHandle>>>,
}

impl AutoResponder {
    pub fn new(state: Arc<AppState>, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state,
            min_delay,
            max_delay,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_config(state: Arc<AppState>) -> Self {
        let (min, max) = (state.config().reply_delay_min, state.config().reply_delay_max);
        Self::new(state, min, max)
    }

    /// Queue a reply to `trigger`. The "AI thinking" indicator is raised
    /// before this returns and lowered when the reply lands.
    pub async fn schedule(&self, trigger: String) -> JoinHandle<()> {
        let delay = self.pick_delay();
        self.state
            .update(StateChange::Transaction, |view| view.ai_pending += 1)
            .await;

        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let reply = simulated_reply(&trigger);
            debug!(id = %reply.id, delay_ms = delay.as_millis() as u64, "simulated reply delivered");
            state
                .update(StateChange::Messages, |view| {
                    view.messages.push(reply);
                    view.ai_pending = view.ai_pending.saturating_sub(1);
                })
                .await;
        });

        let mut pending = self.lock_pending();
        pending.retain(|task| !task.is_finished());
        pending.push(handle.abort_handle());
        handle
    }

    /// Abort every reply still waiting out its delay.
    pub fn cancel_all(&self) {
        let mut pending = self.lock_pending();
        for task in pending.drain(..) {
            task.abort();
        }
    }

    pub fn pending_count(&self) -> usize {
        let mut pending = self.lock_pending();
        pending.retain(|task| !task.is_finished());
        pending.len()
    }

    fn pick_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..self.max_delay)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<AbortHandle>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
