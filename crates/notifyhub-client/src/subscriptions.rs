//! Event name → callback registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Callback invoked with the event payload.
pub type EventCallback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callbacks registered per event name.
#[derive(Default)]
pub struct Subscriptions {
    next_id: AtomicU64,
    by_event: DashMap<String, Vec<(SubscriptionId, EventCallback)>>,
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("events", &self.by_event.len())
            .finish()
    }
}

impl Subscriptions {
    /// Register `callback` for `event`.
    pub fn subscribe(&self, event: &str, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.by_event
            .entry(event.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove one callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        let removed = match self.by_event.get_mut(event) {
            Some(mut callbacks) => {
                let before = callbacks.len();
                callbacks.retain(|(existing, _)| *existing != id);
                callbacks.len() < before
            }
            None => false,
        };
        self.by_event.remove_if(event, |_, callbacks| callbacks.is_empty());
        removed
    }

    /// Invoke every callback of `event`. Returns how many ran.
    pub fn dispatch(&self, event: &str, payload: &serde_json::Value) -> usize {
        // Callbacks run outside the map lock so they may (un)subscribe.
        let callbacks: Vec<EventCallback> = match self.by_event.get(event) {
            Some(entry) => entry.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return 0,
        };
        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    /// Number of callbacks registered for `event`.
    pub fn count(&self, event: &str) -> usize {
        self.by_event.get(event).map(|e| e.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_dispatch_and_unsubscribe() {
        let subs = Subscriptions::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = subs.subscribe(
            "notification",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(subs.dispatch("notification", &serde_json::Value::Null), 1);
        assert_eq!(subs.dispatch("other", &serde_json::Value::Null), 0);
        assert!(subs.unsubscribe("notification", id));
        assert!(!subs.unsubscribe("notification", id));
        assert_eq!(subs.dispatch("notification", &serde_json::Value::Null), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(subs.count("notification"), 0);
    }
}
