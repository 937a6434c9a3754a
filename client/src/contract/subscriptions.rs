//! Listener registry with explicit unsubscribe.
//!
//! Every registration hands out a [`Subscription`]; dropping it (or its
//! [`SubscriptionHandle`]) removes the listener, so handlers never pile up
//! across reconnect cycles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;

pub struct SubscriptionRegistry<E> {
    next_id: AtomicUsize,
    subscribers: Mutex<HashMap<usize, mpsc::UnboundedSender<E>>>,
}

impl<E: Clone + Send + 'static> SubscriptionRegistry<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicUsize::new(0),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    pub fn register(self: &Arc<Self>) -> Subscription<E> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers().insert(id, tx);

        let registry: Weak<Self> = Arc::downgrade(self);
        Subscription {
            events: rx,
            handle: SubscriptionHandle {
                id,
                unregister: Some(Box::new(move || {
                    if let Some(registry) = registry.upgrade() {
                        registry.subscribers().remove(&id);
                    }
                })),
            },
        }
    }

    /// Deliver `event` to every live listener. Returns how many received it.
    pub fn notify(&self, event: E) -> usize {
        let mut subs = self.subscribers();
        subs.retain(|_, tx| tx.send(event.clone()).is_ok());
        subs.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<usize, mpsc::UnboundedSender<E>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A registered listener: the event receiver plus its unsubscribe handle.
pub struct Subscription<E> {
    events: mpsc::UnboundedReceiver<E>,
    handle: SubscriptionHandle,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> usize {
        self.handle.id
    }

    pub async fn recv(&mut self) -> Option<E> {
        self.events.recv().await
    }

    /// Separate the handle from the receiver so the receiver can move into a
    /// task while the owner keeps the ability to unsubscribe.
    pub fn into_parts(self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<E>) {
        (self.handle, self.events)
    }

    pub fn unsubscribe(self) {
        self.handle.unsubscribe();
    }
}

/// Removes its listener from the registry when dropped. Once removed, the
/// paired receiver drains what is buffered and then yields `None`.
pub struct SubscriptionHandle {
    id: usize,
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("active", &self.unregister.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_reaches_every_listener() {
        let registry = SubscriptionRegistry::<u32>::new();
        let mut first = registry.register();
        let mut second = registry.register();
        assert_ne!(first.id(), second.id());

        assert_eq!(registry.notify(7), 2);
        assert_eq!(first.recv().await, Some(7));
        assert_eq!(second.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_listener() {
        let registry = SubscriptionRegistry::<u32>::new();
        let sub = registry.register();
        let _other = registry.register();
        assert_eq!(registry.len(), 2);

        sub.unsubscribe();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.notify(1), 1);
    }

    #[tokio::test]
    async fn test_dropping_handle_closes_receiver() {
        let registry = SubscriptionRegistry::<u32>::new();
        let (handle, mut events) = registry.register().into_parts();

        registry.notify(3);
        drop(handle);

        assert!(registry.is_empty());
        assert_eq!(events.recv().await, Some(3));
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_handle_outliving_registry_is_harmless() {
        let registry = SubscriptionRegistry::<u32>::new();
        let sub = registry.register();
        drop(registry);
        sub.unsubscribe();
    }
}
