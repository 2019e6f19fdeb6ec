//! Shared live-query cache feeding watch channels.
//!
//! One pump task per cached key forwards repository results into a
//! `watch` channel. Receivers share the task; when the last receiver is
//! dropped the task exits and releases the store subscription.
//!
//! A key whose subscription cannot be opened is still cached: its pump
//! retries with capped exponential backoff until the open succeeds or
//! nobody observes the key any more.

use crate::repo::live::LiveQuery;
use crate::repo::{RepoError, RepoResult};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(50);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Observable state of one live query.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveValue<T> {
    /// No snapshot has arrived yet.
    Pending,
    /// Latest complete result.
    Ready(T),
    /// Latest event was an error; a later snapshot replaces it.
    Failed(RepoError),
}

impl<T> LiveValue<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl<T> From<RepoResult<T>> for LiveValue<T> {
    fn from(value: RepoResult<T>) -> Self {
        match value {
            Ok(value) => Self::Ready(value),
            Err(err) => Self::Failed(err),
        }
    }
}

/// Cache key: operation plus arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum LiveKey {
    AllNotes { user_id: String },
    NoteById { id: String },
    Search { query: Option<String>, user_id: String },
}

type Entries<T> = Arc<Mutex<EntryMap<T>>>;

pub(crate) struct LiveCache<T> {
    entries: Entries<T>,
}

impl<T> Default for LiveCache<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Send + Sync + 'static> LiveCache<T> {
    /// Returns a receiver for `key`, opening and pumping a new live query
    /// only when no pump for the key is running.
    ///
    /// `open` runs once here and again from the pump while it keeps failing.
    pub(crate) fn get_or_start<F>(
        &self,
        runtime: &Handle,
        key: LiveKey,
        open: F,
    ) -> watch::Receiver<LiveValue<T>>
    where
        F: Fn() -> RepoResult<LiveQuery<T>> + Send + Sync + 'static,
    {
        let mut entries = lock(&self.entries);
        if let Some(sender) = entries.get(&key) {
            return sender.subscribe();
        }

        let (initial, live) = match open() {
            Ok(mut live) => (
                live.try_recv().map_or(LiveValue::Pending, LiveValue::from),
                Some(live),
            ),
            Err(err) => {
                warn!("event=live_open module=viewmodel status=error retry=true error={err}");
                (LiveValue::Failed(err), None)
            }
        };
        let (sender, receiver) = watch::channel(initial);
        let sender = Arc::new(sender);
        entries.insert(key.clone(), sender.clone());
        debug!("event=live_start module=viewmodel status=ok active={}", entries.len());

        runtime.spawn(pump(key, live, Arc::new(open), sender, self.entries.clone()));
        receiver
    }

    pub(crate) fn active(&self) -> usize {
        lock(&self.entries).len()
    }
}

async fn pump<T, F>(
    key: LiveKey,
    live: Option<LiveQuery<T>>,
    open: Arc<F>,
    sender: Arc<watch::Sender<LiveValue<T>>>,
    entries: Entries<T>,
) where
    T: Send + Sync + 'static,
    F: Fn() -> RepoResult<LiveQuery<T>> + Send + Sync + 'static,
{
    let live = match live {
        Some(live) => Some(live),
        None => reopen(&key, open, &sender, &entries).await,
    };
    if let Some(live) = live {
        forward(&key, live, &sender, &entries).await;
    }
    debug!("event=live_stop module=viewmodel status=ok");
}

/// Retries `open` until it succeeds. `None` means the key lost its last
/// observer (or the retry task died) and has been released.
async fn reopen<T, F>(
    key: &LiveKey,
    open: Arc<F>,
    sender: &Arc<watch::Sender<LiveValue<T>>>,
    entries: &Entries<T>,
) -> Option<LiveQuery<T>>
where
    T: Send + Sync + 'static,
    F: Fn() -> RepoResult<LiveQuery<T>> + Send + Sync + 'static,
{
    let mut delay = RETRY_INITIAL_DELAY;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = sender.closed() => {
                if stop_if_unobserved(entries, key, sender) {
                    return None;
                }
                continue;
            }
        }

        let attempt = open.clone();
        let result = match tokio::task::spawn_blocking(move || (*attempt)()).await {
            Ok(result) => result,
            Err(err) => {
                warn!("event=live_open module=viewmodel status=error retry=false error={err}");
                release(entries, key, sender);
                return None;
            }
        };
        match result {
            Ok(mut live) => {
                if let Some(first) = live.try_recv() {
                    sender.send_replace(LiveValue::from(first));
                }
                debug!("event=live_open module=viewmodel status=ok retry=true");
                return Some(live);
            }
            Err(err) => {
                sender.send_if_modified(|value| {
                    if matches!(value, LiveValue::Failed(current) if *current == err) {
                        return false;
                    }
                    *value = LiveValue::Failed(err);
                    true
                });
                delay = (delay * 2).min(RETRY_MAX_DELAY);
            }
        }
    }
}

async fn forward<T: Send + Sync + 'static>(
    key: &LiveKey,
    mut live: LiveQuery<T>,
    sender: &Arc<watch::Sender<LiveValue<T>>>,
    entries: &Entries<T>,
) {
    loop {
        tokio::select! {
            event = live.recv() => match event {
                Some(result) => {
                    sender.send_replace(LiveValue::from(result));
                }
                None => {
                    release(entries, key, sender);
                    return;
                }
            },
            _ = sender.closed() => {
                if stop_if_unobserved(entries, key, sender) {
                    return;
                }
            }
        }
    }
}

// A caller may have subscribed between the wake-up and the lock.
fn stop_if_unobserved<T>(
    entries: &Entries<T>,
    key: &LiveKey,
    sender: &Arc<watch::Sender<LiveValue<T>>>,
) -> bool {
    let mut guard = lock(entries);
    if sender.receiver_count() > 0 {
        return false;
    }
    remove_if_same(&mut guard, key, sender);
    true
}

fn release<T>(entries: &Entries<T>, key: &LiveKey, sender: &Arc<watch::Sender<LiveValue<T>>>) {
    remove_if_same(&mut lock(entries), key, sender);
}

fn remove_if_same<T>(
    entries: &mut EntryMap<T>,
    key: &LiveKey,
    sender: &Arc<watch::Sender<LiveValue<T>>>,
) {
    if entries
        .get(key)
        .is_some_and(|current| Arc::ptr_eq(current, sender))
    {
        entries.remove(key);
    }
}

type EntryMap<T> = HashMap<LiveKey, Arc<watch::Sender<LiveValue<T>>>>;

fn lock<T>(entries: &Entries<T>) -> MutexGuard<'_, EntryMap<T>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}
