//! Typed live query over a store subscription.

use super::RepoResult;
use crate::store::{SnapshotEvent, StoreRecord, Subscription};

type Projection<T> = Box<dyn Fn(Vec<StoreRecord>) -> RepoResult<T> + Send + Sync>;

/// Live sequence of repository values.
///
/// Each item is the complete current result, recomputed from the store
/// snapshot; store errors arrive as `Err` items and the stream continues.
/// Dropping the query releases the underlying store listener.
pub struct LiveQuery<T> {
    subscription: Subscription,
    project: Projection<T>,
}

impl<T> LiveQuery<T> {
    pub(crate) fn new(
        subscription: Subscription,
        project: impl Fn(Vec<StoreRecord>) -> RepoResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            subscription,
            project: Box::new(project),
        }
    }

    /// Waits for the next result; `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<RepoResult<T>> {
        let event = self.subscription.recv().await?;
        Some(self.apply(event))
    }

    /// Returns the next queued result without waiting.
    pub fn try_recv(&mut self) -> Option<RepoResult<T>> {
        let event = self.subscription.try_recv().ok()?;
        Some(self.apply(event))
    }

    /// Newest queued result, skipping older snapshots.
    pub fn try_recv_latest(&mut self) -> Option<RepoResult<T>> {
        let event = self.subscription.try_recv_latest()?;
        Some(self.apply(event))
    }

    /// Blocking variant of [`LiveQuery::recv`]; not for async contexts.
    pub fn blocking_recv(&mut self) -> Option<RepoResult<T>> {
        let event = self.subscription.blocking_recv()?;
        Some(self.apply(event))
    }

    fn apply(&self, event: SnapshotEvent) -> RepoResult<T> {
        (self.project)(event?)
    }
}
