use crate::error::StoreError;
use crate::rate_limit::{RateLimitKey, RateLimitResult, RateLimitState};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Read-modify-write callback run inside a key's critical section.
pub type StateOp<'a> = &'a mut (dyn FnMut(&mut RateLimitState) -> RateLimitResult + Send);

/// Predicate evaluated against a key's current state under its lock.
pub type StatePredicate<'a> = &'a (dyn Fn(&RateLimitState) -> bool + Send + Sync);

/// Abstract storage interface for per-key rate limit state.
///
/// This trait is designed to support both in-memory and shared backends.
/// Implementations must serialize [`update`](StateStore::update) calls for the same key
/// (no lost updates) and must not make unrelated keys wait on each other longer
/// than a single strategy evaluation.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Fetch the current state for a key.
    async fn get(&self, key: &RateLimitKey) -> Result<Option<RateLimitState>, StoreError>;

    /// Fetch the state for a key, inserting `init` first if absent.
    async fn get_or_create(
        &self,
        key: &RateLimitKey,
        init: RateLimitState,
    ) -> Result<RateLimitState, StoreError>;

    /// Atomically mutate a key's state.
    ///
    /// * `init`: state to start from when the key is absent.
    /// * `op`: runs exactly once with exclusive access to the state.
    async fn update(
        &self,
        key: &RateLimitKey,
        init: RateLimitState,
        op: StateOp<'_>,
    ) -> Result<RateLimitResult, StoreError>;

    /// Remove a key. Returns `true` if it existed.
    async fn delete(&self, key: &RateLimitKey) -> Result<bool, StoreError>;

    /// Remove a key only if `predicate` holds for its state at removal time.
    ///
    /// The predicate is re-checked under the key's lock, so an entry refreshed
    /// by a concurrent evaluation after a snapshot is never dropped.
    async fn delete_if(
        &self,
        key: &RateLimitKey,
        predicate: StatePredicate<'_>,
    ) -> Result<bool, StoreError>;

    /// Point-in-time copy of every entry.
    async fn snapshot(&self) -> Result<Vec<(RateLimitKey, RateLimitState)>, StoreError>;

    /// Number of tracked keys.
    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}

/// In-process store on a sharded concurrent map.
///
/// An update holds the write lock of the key's shard for the duration of the
/// strategy arithmetic only. Keys in different shards never contend.
/// Clones share the same map.
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    entries: Arc<DashMap<RateLimitKey, RateLimitState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the map.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Arc::new(DashMap::with_capacity(capacity)) }
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get(&self, key: &RateLimitKey) -> Result<Option<RateLimitState>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn get_or_create(
        &self,
        key: &RateLimitKey,
        init: RateLimitState,
    ) -> Result<RateLimitState, StoreError> {
        Ok(self.entries.entry(key.clone()).or_insert(init).value().clone())
    }

    async fn update(
        &self,
        key: &RateLimitKey,
        init: RateLimitState,
        op: StateOp<'_>,
    ) -> Result<RateLimitResult, StoreError> {
        // Hot path: existing key, no allocation for the key clone.
        if let Some(mut entry) = self.entries.get_mut(key) {
            return Ok(op(entry.value_mut()));
        }
        let mut entry = self.entries.entry(key.clone()).or_insert(init);
        Ok(op(entry.value_mut()))
    }

    async fn delete(&self, key: &RateLimitKey) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_if(
        &self,
        key: &RateLimitKey,
        predicate: StatePredicate<'_>,
    ) -> Result<bool, StoreError> {
        Ok(self.entries.remove_if(key, |_, state| predicate(state)).is_some())
    }

    async fn snapshot(&self) -> Result<Vec<(RateLimitKey, RateLimitState)>, StoreError> {
        Ok(self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.len())
    }
}
