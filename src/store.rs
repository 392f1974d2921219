// Copyright 2021-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! The KV Adapter: the two storage namespaces the queue engine is built against.
//!
//! `ActorStore` is the transactional, per-instance "actor state" namespace: callers
//! stage any number of `set`/`remove` calls and then `commit` once at the end of an
//! invocation. `BulkStore` is the shared, non-transactional namespace used for
//! offloaded segments, where every write commits immediately and independently.
//!
//! Production hosts supply their own implementations of both traits against their
//! real transactional store. This crate ships only in-memory reference
//! implementations, grounded on the runtime's `MemoryBlockstore`, for tests.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::QueueError;

/// The transactional, per-instance namespace.
pub trait ActorStore {
    /// Reads a value staged or previously committed under `key`.
    fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError>;

    /// Stages a write under `key`, visible to subsequent reads in this invocation
    /// even before `commit`.
    fn set(&mut self, key: &str, value: Vec<u8>);

    /// Stages a deletion of `key`.
    fn remove(&mut self, key: &str);

    /// Atomically persists all writes/removals staged since the last commit.
    fn commit(&mut self) -> Result<(), QueueError>;
}

/// The shared, non-transactional namespace used for offloaded segments.
pub trait BulkStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError>;
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), QueueError>;
    fn delete(&self, key: &str) -> Result<(), QueueError>;
}

/// Read/write instrumentation, mirroring the grounding codebase's `BSStats`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: usize,
    pub writes: usize,
    pub removes: usize,
    pub commits: usize,
}

/// In-memory reference implementation of [`ActorStore`], for tests.
///
/// Staged writes/removals are visible immediately (read-your-writes within an
/// invocation) but are only reflected in `committed` -- the durable view a fresh
/// load would observe -- once `commit` runs. A `fail_next_commit` knob lets tests
/// exercise the "commit fails, in-memory view is discarded" path from §4.1.
#[derive(Debug, Default)]
pub struct MemoryActorStore {
    committed: HashMap<String, Vec<u8>>,
    staged: HashMap<String, Option<Vec<u8>>>,
    pub stats: RefCell<StoreStats>,
    pub fail_next_commit: bool,
}

impl MemoryActorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reloads a fresh store from the durable (committed) view only, the way a
    /// new invocation would after the previous one's commit.
    pub fn reload(&self) -> Self {
        Self {
            committed: self.committed.clone(),
            staged: HashMap::new(),
            stats: RefCell::new(StoreStats::default()),
            fail_next_commit: false,
        }
    }
}

impl ActorStore for MemoryActorStore {
    fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError> {
        self.stats.borrow_mut().reads += 1;
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.committed.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.stats.borrow_mut().writes += 1;
        self.staged.insert(key.to_string(), Some(value));
    }

    fn remove(&mut self, key: &str) {
        self.stats.borrow_mut().removes += 1;
        self.staged.insert(key.to_string(), None);
    }

    fn commit(&mut self) -> Result<(), QueueError> {
        self.stats.borrow_mut().commits += 1;
        if self.fail_next_commit {
            self.fail_next_commit = false;
            self.staged.clear();
            return Err(QueueError::internal("simulated actor-state commit failure"));
        }
        for (key, value) in self.staged.drain() {
            match value {
                Some(v) => {
                    self.committed.insert(key, v);
                }
                None => {
                    self.committed.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// In-memory reference implementation of [`BulkStore`], for tests.
#[derive(Debug, Default)]
pub struct MemoryBulkStore {
    blocks: RefCell<HashMap<String, Vec<u8>>>,
    pub stats: RefCell<StoreStats>,
    pub fail_next_put: bool,
}

impl MemoryBulkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BulkStore for MemoryBulkStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError> {
        self.stats.borrow_mut().reads += 1;
        Ok(self.blocks.borrow().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), QueueError> {
        if self.fail_next_put {
            return Err(QueueError::internal("simulated bulk-store put failure"));
        }
        self.stats.borrow_mut().writes += 1;
        self.blocks.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), QueueError> {
        self.stats.borrow_mut().removes += 1;
        self.blocks.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_store_reads_staged_writes_before_commit() {
        let mut store = MemoryActorStore::new();
        store.set("a", b"1".to_vec());
        assert_eq!(store.try_get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.stats.borrow().writes, 1);
    }

    #[test]
    fn actor_store_commit_persists_and_reload_drops_staged() {
        let mut store = MemoryActorStore::new();
        store.set("a", b"1".to_vec());
        store.commit().unwrap();
        store.set("b", b"2".to_vec());
        let reloaded = store.reload();
        assert_eq!(reloaded.try_get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(reloaded.try_get("b").unwrap(), None);
    }

    #[test]
    fn actor_store_failed_commit_discards_staged_writes() {
        let mut store = MemoryActorStore::new();
        store.set("a", b"1".to_vec());
        store.fail_next_commit = true;
        assert!(store.commit().is_err());
        assert_eq!(store.try_get("a").unwrap(), None);
    }

    #[test]
    fn actor_store_remove_then_commit_clears_committed_value() {
        let mut store = MemoryActorStore::new();
        store.set("a", b"1".to_vec());
        store.commit().unwrap();
        store.remove("a");
        store.commit().unwrap();
        assert_eq!(store.try_get("a").unwrap(), None);
    }

    #[test]
    fn bulk_store_put_get_delete_round_trip() {
        let store = MemoryBulkStore::new();
        store.put("k", b"v".to_vec()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
