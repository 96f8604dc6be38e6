//! In-memory cache of task lists (keyed by filter) and single tasks (keyed
//! by id).
//!
//! Each entry moves through `Absent -> Loading -> Populated -> Stale ->
//! Loading -> ...`. At most one fetch per key is outstanding; concurrent
//! readers share it. Every issued fetch carries a sequence number and a
//! response is stored only if no newer request (or invalidation) was issued
//! for its key in the meantime.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::{Task, TaskId, TaskQuery};

type FetchFuture<V> = Shared<BoxFuture<'static, Result<Arc<V>, AppError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Absent,
    Loading,
    Populated,
    Stale,
}

/// Outcome of a cache read.
pub enum Read<V> {
    /// Populated entry, served without a network call.
    Ready(Arc<V>),
    /// A fetch is in flight; `previous` holds stale data, if any, for display
    /// while waiting.
    Pending(Pending<V>),
}

pub struct Pending<V> {
    fetch: FetchFuture<V>,
    pub previous: Option<Arc<V>>,
}

impl<V> Pending<V> {
    pub async fn wait(self) -> Result<Arc<V>, AppError> {
        self.fetch.await
    }
}

impl<V> Read<V> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Read::Pending(_))
    }

    pub async fn resolve(self) -> Result<Arc<V>, AppError> {
        match self {
            Read::Ready(value) => Ok(value),
            Read::Pending(pending) => pending.wait().await,
        }
    }
}

struct Slot<V> {
    value: Option<Arc<V>>,
    stale: bool,
    /// Sequence number of the newest request or invalidation for this key.
    issued: u64,
    in_flight: Option<FetchFuture<V>>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            value: None,
            stale: false,
            issued: 0,
            in_flight: None,
        }
    }
}

impl<V> Slot<V> {
    fn state(&self) -> EntryState {
        match (&self.in_flight, &self.value, self.stale) {
            (Some(_), _, _) => EntryState::Loading,
            (None, Some(_), false) => EntryState::Populated,
            (None, Some(_), true) => EntryState::Stale,
            (None, None, _) => EntryState::Absent,
        }
    }

    fn fresh(&self) -> Option<Arc<V>> {
        match (&self.value, self.stale) {
            (Some(value), false) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    fn invalidate(&mut self, fence: u64) {
        self.issued = fence;
        self.in_flight = None;
        if self.value.is_some() {
            self.stale = true;
        }
    }
}

#[derive(Default)]
struct CacheState {
    /// User the cached data belongs to.
    scope: Option<String>,
    lists: HashMap<TaskQuery, Slot<Vec<Task>>>,
    items: HashMap<TaskId, Slot<Task>>,
}

type Selector<K, V> = fn(&mut CacheState) -> &mut HashMap<K, Slot<V>>;

fn lists(state: &mut CacheState) -> &mut HashMap<TaskQuery, Slot<Vec<Task>>> {
    &mut state.lists
}

fn items(state: &mut CacheState) -> &mut HashMap<TaskId, Slot<Task>> {
    &mut state.items
}

struct CacheInner {
    state: Mutex<CacheState>,
    seq: AtomicU64,
    timeout: Duration,
}

impl CacheInner {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn settle<K, V>(&self, select: Selector<K, V>, key: &K, seq: u64, result: &Result<Arc<V>, AppError>)
    where
        K: Eq + Hash + Debug,
    {
        let mut state = self.state.lock();
        let Some(slot) = select(&mut *state).get_mut(key) else {
            debug!(?key, seq, "discarding response for cleared entry");
            return;
        };
        if slot.issued != seq {
            debug!(?key, seq, newest = slot.issued, "discarding superseded response");
            return;
        }
        slot.in_flight = None;
        match result {
            Ok(value) => {
                slot.value = Some(Arc::clone(value));
                slot.stale = false;
            }
            Err(AppError::NotFound) => {
                slot.value = None;
                slot.stale = false;
            }
            Err(e) => {
                warn!(?key, "fetch failed: {}", e);
                if slot.value.is_some() {
                    slot.stale = true;
                }
            }
        }
    }
}

/// Shared handle; clones see the same entries.
#[derive(Clone)]
pub struct TaskCache {
    inner: Arc<CacheInner>,
}

impl TaskCache {
    /// `timeout` bounds every fetch; an expired fetch settles as
    /// [`AppError::Timeout`].
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState::default()),
                seq: AtomicU64::new(0),
                timeout,
            }),
        }
    }

    /// Reads the list for `query`, calling `fetch` only if the entry is
    /// absent or stale and no fetch is already in flight.
    pub fn read_list<F, Fut>(&self, query: TaskQuery, fetch: F) -> Read<Vec<Task>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Task>, AppError>> + Send + 'static,
    {
        self.read_with(lists, query, fetch, false)
    }

    /// Issues a new fetch for `query` even if the entry is populated. Any
    /// older in-flight response for the key is discarded when it lands.
    pub fn refresh_list<F, Fut>(&self, query: TaskQuery, fetch: F) -> Read<Vec<Task>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Task>, AppError>> + Send + 'static,
    {
        self.read_with(lists, query, fetch, true)
    }

    pub fn read_task<F, Fut>(&self, id: &str, fetch: F) -> Read<Task>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Task, AppError>> + Send + 'static,
    {
        self.read_with(items, id.to_string(), fetch, false)
    }

    pub fn list_state(&self, query: &TaskQuery) -> EntryState {
        let state = self.inner.state.lock();
        state.lists.get(query).map_or(EntryState::Absent, Slot::state)
    }

    pub fn task_state(&self, id: &str) -> EntryState {
        let state = self.inner.state.lock();
        state.items.get(id).map_or(EntryState::Absent, Slot::state)
    }

    /// Marks every list entry and the entry for `id` stale, and fences off
    /// any fetch for them still in flight.
    pub fn invalidate_after_mutation(&self, id: &str) {
        self.invalidate(Some(id));
    }

    /// Marks every list entry stale, for a mutation whose target is unknown.
    pub fn invalidate_lists(&self) {
        self.invalidate(None);
    }

    fn invalidate(&self, id: Option<&str>) {
        let fence = self.inner.next_seq();
        let mut state = self.inner.state.lock();
        for slot in state.lists.values_mut() {
            slot.invalidate(fence);
        }
        if let Some(slot) = id.and_then(|id| state.items.get_mut(id)) {
            slot.invalidate(fence);
        }
        debug!(?id, lists = state.lists.len(), "invalidated after mutation");
    }

    /// Drops all entries if they belong to a different user than `user_id`.
    pub fn scope_to(&self, user_id: Option<&str>) {
        let mut state = self.inner.state.lock();
        if state.scope.as_deref() != user_id {
            debug!(?user_id, "cache scope changed, clearing");
            state.lists.clear();
            state.items.clear();
            state.scope = user_id.map(str::to_string);
        }
    }

    fn read_with<K, V, F, Fut>(&self, select: Selector<K, V>, key: K, fetch: F, force: bool) -> Read<V>
    where
        K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
        V: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, AppError>> + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let slot = select(&mut *state).entry(key.clone()).or_default();

        if !force {
            if let Some(value) = slot.fresh() {
                return Read::Ready(value);
            }
            if let Some(in_flight) = &slot.in_flight {
                return Read::Pending(Pending {
                    fetch: in_flight.clone(),
                    previous: slot.value.clone(),
                });
            }
        }

        let seq = self.inner.next_seq();
        let inner = Arc::clone(&self.inner);
        let timeout = self.inner.timeout;
        let request = fetch();
        let settle_key = key.clone();

        // Spawned so the request runs to completion (and settles the entry)
        // even if every reader stops waiting.
        let handle = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, request).await {
                Ok(result) => result.map(Arc::new),
                Err(_) => Err(AppError::Timeout(timeout)),
            };
            inner.settle(select, &settle_key, seq, &result);
            result
        });
        let fetch = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(AppError::Network(format!("fetch task failed: {}", e))))
        }
        .boxed()
        .shared();

        slot.issued = seq;
        slot.in_flight = Some(fetch.clone());
        debug!(?key, seq, "fetch issued");

        Read::Pending(Pending {
            fetch,
            previous: slot.value.clone(),
        })
    }
}
