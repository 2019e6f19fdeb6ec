//! Listener registry shared by the bundled store backends.
//!
//! Backends call into the hub while holding their own data lock, so the hub
//! lock is always taken second and never held across a send that can block
//! (channels are unbounded).

use super::{Query, SnapshotEvent};
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

struct Listener {
    collection: String,
    query: Query,
    sender: UnboundedSender<SnapshotEvent>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

#[derive(Default)]
pub(crate) struct ListenerHub {
    inner: Arc<Mutex<HubInner>>,
}

impl ListenerHub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and queues `initial` as its first event.
    pub(crate) fn register(
        &self,
        collection: &str,
        query: &Query,
        initial: SnapshotEvent,
    ) -> Subscription {
        let (sender, receiver) = unbounded_channel();
        // Receiver is alive, the send cannot fail.
        let _ = sender.send(initial);

        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.listeners.insert(
            id,
            Listener {
                collection: collection.to_string(),
                query: query.clone(),
                sender,
            },
        );
        debug!("event=store_subscribe module=store status=ok listener_id={id} collection={collection}");

        Subscription {
            receiver,
            guard: ListenerGuard {
                hub: Arc::downgrade(&self.inner),
                id,
            },
        }
    }

    /// Pushes a fresh snapshot to every listener whose result a mutation at
    /// `id` may have changed.
    pub(crate) fn notify<F>(
        &self,
        collection: &str,
        id: &str,
        before: Option<&serde_json::Value>,
        after: Option<&serde_json::Value>,
        mut snapshot: F,
    ) where
        F: FnMut(&Query) -> SnapshotEvent,
    {
        self.dispatch(|listener| {
            if listener.collection == collection && listener.query.touched_by(id, before, after) {
                Some(snapshot(&listener.query))
            } else {
                None
            }
        });
    }

    /// Sends one event to every listener, computed per listener.
    pub(crate) fn broadcast<F>(&self, mut event: F)
    where
        F: FnMut(&str, &Query) -> SnapshotEvent,
    {
        self.dispatch(|listener| Some(event(&listener.collection, &listener.query)));
    }

    pub(crate) fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    fn dispatch<F>(&self, mut select: F)
    where
        F: FnMut(&Listener) -> Option<SnapshotEvent>,
    {
        let mut inner = lock(&self.inner);
        let mut closed = Vec::new();
        for (listener_id, listener) in &inner.listeners {
            if let Some(event) = select(listener) {
                if listener.sender.send(event).is_err() {
                    closed.push(*listener_id);
                }
            }
        }
        for listener_id in closed {
            inner.listeners.remove(&listener_id);
        }
    }
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ListenerGuard {
    hub: Weak<Mutex<HubInner>>,
    id: u64,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            lock(&inner).listeners.remove(&self.id);
            debug!(
                "event=store_unsubscribe module=store status=ok listener_id={}",
                self.id
            );
        }
    }
}

/// Live listener handle. Dropping it (or calling [`Subscription::cancel`])
/// unregisters the listener from its store.
///
/// Events queue without bound until received: a handle that is kept but not
/// read holds one full snapshot per matching mutation. Holders that only need
/// the current state should read with [`Subscription::try_recv_latest`].
pub struct Subscription {
    receiver: UnboundedReceiver<SnapshotEvent>,
    guard: ListenerGuard,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        self.receiver.recv().await
    }

    /// Returns a queued event without waiting.
    pub fn try_recv(&mut self) -> Result<SnapshotEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drains the queue and returns only the newest event, if any.
    ///
    /// Every event is a complete snapshot, so older ones carry nothing the
    /// newest lacks.
    pub fn try_recv_latest(&mut self) -> Option<SnapshotEvent> {
        let mut latest = None;
        while let Ok(event) = self.receiver.try_recv() {
            latest = Some(event);
        }
        latest
    }

    /// Blocking variant of [`Subscription::recv`] for non-async callers.
    ///
    /// Must not be called from inside an async context.
    pub fn blocking_recv(&mut self) -> Option<SnapshotEvent> {
        self.receiver.blocking_recv()
    }

    /// Store-local listener id, stable for the handle lifetime.
    pub fn listener_id(&self) -> u64 {
        self.guard.id
    }

    /// Unregisters the listener now.
    pub fn cancel(self) {}
}

#[cfg(test)]
mod tests {
    use super::ListenerHub;
    use crate::store::{Query, StoreRecord};
    use serde_json::json;

    #[test]
    fn dropping_subscription_unregisters_listener() {
        let hub = ListenerHub::new();
        let first = hub.register("notes", &Query::record("a"), Ok(Vec::new()));
        let second = hub.register("notes", &Query::record("b"), Ok(Vec::new()));
        assert_eq!(hub.listener_count(), 2);

        drop(first);
        assert_eq!(hub.listener_count(), 1);
        second.cancel();
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn notify_only_reaches_touched_listeners() {
        let hub = ListenerHub::new();
        let mut owner = hub.register("notes", &Query::equals("userId", "u1"), Ok(Vec::new()));
        let mut other = hub.register("notes", &Query::equals("userId", "u2"), Ok(Vec::new()));
        owner.try_recv().unwrap().unwrap();
        other.try_recv().unwrap().unwrap();

        let body = json!({"userId": "u1"});
        hub.notify("notes", "n1", None, Some(&body), |_| {
            Ok(vec![StoreRecord {
                id: "n1".to_string(),
                body: body.clone(),
            }])
        });

        assert_eq!(owner.try_recv().unwrap().unwrap().len(), 1);
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn try_recv_latest_skips_stale_snapshots() {
        let hub = ListenerHub::new();
        let mut live = hub.register("notes", &Query::equals("userId", "u1"), Ok(Vec::new()));

        let mut snapshot = Vec::new();
        for id in ["n1", "n2", "n3"] {
            let body = json!({"userId": "u1"});
            snapshot.push(StoreRecord {
                id: id.to_string(),
                body: body.clone(),
            });
            hub.notify("notes", id, None, Some(&body), |_| Ok(snapshot.clone()));
        }

        let latest = live.try_recv_latest().unwrap().unwrap();
        assert_eq!(latest.len(), 3);
        assert!(live.try_recv().is_err());
        assert!(live.try_recv_latest().is_none());
    }
}
