//! Session-scoped dataset cache with single-flight fetching.
//!
//! ```rust,ignore
//! let cache = SessionCache::new();
//! let hourly = cache
//!     .get_or_fetch("/stats/hourly-patterns", || async { source.fetch(&resource).await })
//!     .await?;
//! ```
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::FetchError;
use crate::types::StatDataset;

pub type FetchResult = Result<Arc<StatDataset>, FetchError>;

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

enum Slot {
    /// A fetch is in flight. `ticket` identifies it so that a late result
    /// cannot land in an entry that was invalidated meanwhile.
    Pending { ticket: u64, fetch: SharedFetch },
    Ready(Arc<StatDataset>),
    Failed(FetchError),
}

/// Observable state of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Missing,
    Pending,
    Ready,
    Failed(FetchError),
}

enum Lookup {
    Hit(Arc<StatDataset>),
    Wait(u64, SharedFetch),
}

/// Key to dataset store living for one session.
///
/// At most one fetch per key is in flight: concurrent callers for the same
/// uncached key all await the one pending fetch. A ready entry is only ever
/// replaced after an explicit [`invalidate`](SessionCache::invalidate) or
/// [`invalidate_all`](SessionCache::invalidate_all). A failed fetch is
/// remembered but does not stick; the next request fetches again.
#[derive(Default)]
pub struct SessionCache {
    slots: Mutex<HashMap<String, Slot>>,
    next_ticket: AtomicU64,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached dataset for `key`, fetching it with `fetcher` if
    /// there is neither a cached value nor a fetch in flight.
    ///
    /// `fetcher` is first called when the shared fetch is polled, after the
    /// entry is marked pending and the lock is released, so it may read the
    /// cache itself.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetcher: F) -> FetchResult
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<StatDataset, FetchError>> + Send + 'static,
    {
        // The guard must be gone before the first await.
        let lookup = {
            let mut slots = self.slots();
            let existing = match slots.get(key) {
                Some(Slot::Ready(dataset)) => Some(Lookup::Hit(dataset.clone())),
                Some(Slot::Pending { ticket, fetch }) => {
                    tracing::debug!("joining in-flight fetch for {key}");
                    Some(Lookup::Wait(*ticket, fetch.clone()))
                }
                Some(Slot::Failed(_)) | None => None,
            };
            match existing {
                Some(lookup) => lookup,
                None => {
                    tracing::debug!("cache miss for {key}");
                    let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                    let fetch = async move { fetcher().await.map(Arc::new) }
                        .boxed()
                        .shared();
                    slots.insert(
                        key.to_string(),
                        Slot::Pending {
                            ticket,
                            fetch: fetch.clone(),
                        },
                    );
                    Lookup::Wait(ticket, fetch)
                }
            }
        };

        match lookup {
            Lookup::Hit(dataset) => Ok(dataset),
            Lookup::Wait(ticket, fetch) => {
                let result = fetch.await;
                self.settle(key, ticket, &result);
                result
            }
        }
    }

    /// Move a pending entry to its final state, unless it was invalidated or
    /// replaced by a newer fetch while in flight.
    fn settle(&self, key: &str, ticket: u64, result: &FetchResult) {
        let mut slots = self.slots();
        let current = matches!(
            slots.get(key),
            Some(Slot::Pending { ticket: pending, .. }) if *pending == ticket
        );
        if !current {
            return;
        }
        let slot = match result {
            Ok(dataset) => Slot::Ready(dataset.clone()),
            Err(error) => Slot::Failed(error.clone()),
        };
        slots.insert(key.to_string(), slot);
    }

    pub fn state(&self, key: &str) -> EntryState {
        match self.slots().get(key) {
            None => EntryState::Missing,
            Some(Slot::Pending { .. }) => EntryState::Pending,
            Some(Slot::Ready(_)) => EntryState::Ready,
            Some(Slot::Failed(error)) => EntryState::Failed(error.clone()),
        }
    }

    pub fn invalidate(&self, key: &str) {
        if self.slots().remove(key).is_some() {
            tracing::debug!("invalidated {key}");
        }
    }

    pub fn invalidate_all(&self) {
        let mut slots = self.slots();
        tracing::debug!("clearing {} cached datasets", slots.len());
        slots.clear();
    }
}
