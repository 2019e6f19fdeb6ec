//! In-process document store.
//!
//! # Responsibility
//! - Provide the full `RemoteStore` contract without any external service.
//! - Simulate connectivity loss so transport error paths can be exercised.
//!
//! # Invariants
//! - Every mutation and the notifications it triggers run under one lock.
//! - While unreachable, every operation fails with `StoreError::Transport`.

use super::hub::{ListenerHub, Subscription};
use super::{
    new_record_id, validate_request, validate_segment, Query, RemoteStore, SnapshotEvent,
    StoreError, StoreRecord, StoreResult,
};
use log::{info, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

type Collection = BTreeMap<String, Value>;

#[derive(Default)]
struct MemoryState {
    reachable: bool,
    collections: HashMap<String, Collection>,
}

impl MemoryState {
    fn evaluate(&self, collection: &str, query: &Query) -> Vec<StoreRecord> {
        let Some(records) = self.collections.get(collection) else {
            return Vec::new();
        };
        match query {
            Query::Record(id) => records
                .get(id)
                .map(|body| StoreRecord {
                    id: id.clone(),
                    body: body.clone(),
                })
                .into_iter()
                .collect(),
            Query::Equals { .. } => records
                .iter()
                .filter(|(id, body)| query.matches(id, body))
                .map(|(id, body)| StoreRecord {
                    id: id.clone(),
                    body: body.clone(),
                })
                .collect(),
        }
    }

    fn ensure_reachable(&self) -> StoreResult<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(offline_error())
        }
    }
}

/// Document store kept entirely in process memory.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    hub: ListenerHub,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                reachable: true,
                collections: HashMap::new(),
            }),
            hub: ListenerHub::new(),
        }
    }

    /// Switches simulated connectivity.
    ///
    /// Going offline sends one transport error to every listener; coming back
    /// sends each listener a fresh snapshot.
    pub fn set_reachable(&self, reachable: bool) -> StoreResult<()> {
        let mut state = self.lock()?;
        if state.reachable == reachable {
            return Ok(());
        }
        state.reachable = reachable;

        if reachable {
            info!("event=store_reconnect module=store status=ok backend=memory");
            self.hub
                .broadcast(|collection, query| Ok(state.evaluate(collection, query)));
        } else {
            warn!("event=store_disconnect module=store status=error backend=memory");
            self.hub.broadcast(|_, _| Err(offline_error()));
        }
        Ok(())
    }

    /// Number of live listeners currently registered.
    pub fn listener_count(&self) -> usize {
        self.hub.listener_count()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl RemoteStore for MemoryStore {
    fn generate_id(&self, collection: &str) -> StoreResult<String> {
        validate_segment(collection)?;
        self.lock()?.ensure_reachable()?;
        Ok(new_record_id())
    }

    fn write(&self, collection: &str, id: &str, body: Value) -> StoreResult<()> {
        validate_segment(collection)?;
        validate_segment(id)?;
        let mut state = self.lock()?;
        state.ensure_reachable()?;

        let previous = state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), body.clone());
        self.hub
            .notify(collection, id, previous.as_ref(), Some(&body), |query| {
                Ok(state.evaluate(collection, query))
            });
        Ok(())
    }

    fn remove(&self, collection: &str, id: &str) -> StoreResult<()> {
        validate_segment(collection)?;
        validate_segment(id)?;
        let mut state = self.lock()?;
        state.ensure_reachable()?;

        let previous = state
            .collections
            .get_mut(collection)
            .and_then(|records| records.remove(id));
        if previous.is_some() {
            self.hub.notify(collection, id, previous.as_ref(), None, |query| {
                Ok(state.evaluate(collection, query))
            });
        }
        Ok(())
    }

    fn read_once(&self, collection: &str, query: &Query) -> StoreResult<Vec<StoreRecord>> {
        validate_request(collection, query)?;
        let state = self.lock()?;
        state.ensure_reachable()?;
        Ok(state.evaluate(collection, query))
    }

    fn subscribe(&self, collection: &str, query: &Query) -> StoreResult<Subscription> {
        validate_request(collection, query)?;
        let state = self.lock()?;
        state.ensure_reachable()?;
        let initial: SnapshotEvent = Ok(state.evaluate(collection, query));
        Ok(self.hub.register(collection, query, initial))
    }
}

fn offline_error() -> StoreError {
    StoreError::Transport("memory store is marked unreachable".to_string())
}
