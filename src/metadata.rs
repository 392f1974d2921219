// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The Metadata Record: the single persisted root describing configuration,
//! per-priority segment pointers, offloaded-segment ranges, and any active lease.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AsInternal, QueueError};
use crate::item::Item;
use crate::store::ActorStore;

/// Well-known actor-state key under which the [`Metadata`] root is persisted.
pub const METADATA_KEY: &str = "metadata";

/// Configuration fixed at instance creation (§4.2 / §10.6).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub segment_size: u32,
    pub buffer_segments: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { segment_size: 100, buffer_segments: 1 }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.segment_size == 0 {
            return Err(QueueError::invalid_argument("segment_size must be positive"));
        }
        Ok(())
    }
}

/// One priority's segment-range bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRecord {
    pub count: u64,
    pub head_segment: u64,
    pub tail_segment: u64,
    pub head_offloaded_segment: Option<u64>,
    pub tail_offloaded_segment: Option<u64>,
}

impl PriorityRecord {
    /// Whether this priority currently has an offloaded range.
    pub fn has_offloaded_range(&self) -> bool {
        self.head_offloaded_segment.is_some()
    }
}

/// An item removed under the active lease, along with the priority it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeldItem {
    pub item: Item,
    pub origin_priority: u64,
}

/// The at-most-one outstanding lease.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub lock_id: String,
    pub expires_at: u64,
    pub created_at: u64,
    pub held_items: Vec<HeldItem>,
}

impl LeaseRecord {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// The metadata root, as described in §4.2.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub config: QueueConfig,
    pub queues: BTreeMap<u64, PriorityRecord>,
    pub active_lease: Option<LeaseRecord>,
}

impl Metadata {
    pub fn new(config: QueueConfig) -> Self {
        Self { config, queues: BTreeMap::new(), active_lease: None }
    }

    /// Loads the metadata root, or initializes it with `default_config` on first
    /// activation (§4.2). Does not stage a write; callers that create a fresh
    /// record are expected to `save` it as part of their own invocation.
    pub fn load<S: ActorStore>(
        store: &S,
        default_config: QueueConfig,
    ) -> Result<Self, QueueError> {
        match store.try_get(METADATA_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes).internal("decoding metadata record"),
            None => Ok(Self::new(default_config)),
        }
    }

    /// Stages the metadata root for write. The caller commits.
    pub fn save<S: ActorStore>(&self, store: &mut S) -> Result<(), QueueError> {
        let bytes = serde_json::to_vec(self).internal("encoding metadata record")?;
        store.set(METADATA_KEY, bytes);
        Ok(())
    }

    pub fn priority(&self, p: u64) -> Option<&PriorityRecord> {
        self.queues.get(&p)
    }

    pub fn priority_mut(&mut self, p: u64) -> &mut PriorityRecord {
        self.queues.entry(p).or_default()
    }

    /// Removes the priority's record if its count has reached zero (invariant 2).
    pub fn drop_if_empty(&mut self, p: u64) {
        if let Some(rec) = self.queues.get(&p) {
            if rec.count == 0 {
                self.queues.remove(&p);
            }
        }
    }

    /// The lowest priority with `count > 0`, in ascending order (consumption order).
    pub fn priorities_ascending(&self) -> impl Iterator<Item = u64> + '_ {
        self.queues.iter().filter(|(_, rec)| rec.count > 0).map(|(p, _)| *p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryActorStore;

    #[test]
    fn load_on_absent_key_returns_default_config() {
        let store = MemoryActorStore::new();
        let meta = Metadata::load(&store, QueueConfig::default()).unwrap();
        assert_eq!(meta.config, QueueConfig::default());
        assert!(meta.queues.is_empty());
        assert!(meta.active_lease.is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = MemoryActorStore::new();
        let mut meta = Metadata::new(QueueConfig { segment_size: 3, buffer_segments: 0 });
        meta.priority_mut(0).count = 5;
        meta.save(&mut store).unwrap();
        store.commit().unwrap();

        let loaded = Metadata::load(&store, QueueConfig::default()).unwrap();
        assert_eq!(loaded.config.segment_size, 3);
        assert_eq!(loaded.priority(0).unwrap().count, 5);
    }

    #[test]
    fn drop_if_empty_removes_zero_count_priority() {
        let mut meta = Metadata::new(QueueConfig::default());
        meta.priority_mut(1).count = 0;
        meta.drop_if_empty(1);
        assert!(meta.priority(1).is_none());
    }

    #[test]
    fn priorities_ascending_skips_zero_count_and_orders_by_key() {
        let mut meta = Metadata::new(QueueConfig::default());
        meta.priority_mut(5).count = 1;
        meta.priority_mut(1).count = 1;
        meta.priority_mut(3).count = 0;
        let order: Vec<u64> = meta.priorities_ascending().collect();
        assert_eq!(order, vec![1, 5]);
    }

    #[test]
    fn config_validate_rejects_zero_segment_size() {
        let cfg = QueueConfig { segment_size: 0, buffer_segments: 1 };
        assert!(cfg.validate().is_err());
    }
}
