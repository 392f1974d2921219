// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The Queue Engine: the four externally-visible operations (§4.5, §6), wired
//! against the Metadata Record, Segment Store, Offload Manager, and Lease Controller.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::QueueError;
use crate::item::Item;
use crate::lease::{self, clamp_ttl};
use crate::metadata::{HeldItem, Metadata, QueueConfig};
use crate::offload;
use crate::segment;
use crate::store::{ActorStore, BulkStore};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResult {
    pub success: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PopResult {
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaseResult {
    pub items: Vec<Item>,
    pub count: usize,
    pub locked: bool,
    pub lock_id: Option<String>,
    pub lock_expires_at: Option<u64>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AcknowledgeResult {
    pub success: bool,
    pub message: Option<String>,
    pub items_acknowledged: Option<u64>,
    pub error_code: Option<String>,
}

/// A single instance of the durable priority queue, bound to one `instance_id`,
/// one storage pair, and one clock source. Every public method is a plain
/// synchronous state transition: no internal locking, no async, matching §5.
pub struct QueueEngine<A: ActorStore, B: BulkStore, C: Clock> {
    actor: A,
    bulk: B,
    clock: C,
    instance_id: String,
    default_config: QueueConfig,
}

impl<A: ActorStore, B: BulkStore, C: Clock> QueueEngine<A, B, C> {
    pub fn new(actor: A, bulk: B, clock: C, instance_id: impl Into<String>, default_config: QueueConfig) -> Self {
        Self { actor, bulk, clock, instance_id: instance_id.into(), default_config }
    }

    pub fn actor_store(&self) -> &A {
        &self.actor
    }

    pub fn bulk_store(&self) -> &B {
        &self.bulk
    }

    /// The engine's clock source. `ManualClock`'s `advance`/`set` take `&self`
    /// (interior mutability), so tests can drive time forward through this
    /// shared reference without needing `&mut self`.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn load_metadata(&self) -> Result<Metadata, QueueError> {
        Metadata::load(&self.actor, self.default_config.clone())
    }

    /// `Push(item, priority)` — §4.5.
    pub fn push(&mut self, item: Item, priority: Option<u64>) -> Result<PushResult, QueueError> {
        if !item.is_map() {
            return Err(QueueError::invalid_argument("item must be a map"));
        }
        item.validate()?;
        let p = priority.unwrap_or(0);

        let mut meta = self.load_metadata()?;
        meta.config.validate()?;

        let mut t = meta.priority(p).map(|rec| rec.tail_segment).unwrap_or(0);
        let mut seg = segment::read(&self.actor, p, t)?;
        if seg.len() as u32 >= meta.config.segment_size {
            t += 1;
            seg = Vec::new();
        }
        seg.push(item);
        segment::write(&mut self.actor, p, t, &seg)?;

        let is_fresh = meta.priority(p).is_none();
        let rec = meta.priority_mut(p);
        rec.count += 1;
        if is_fresh {
            rec.head_segment = 0;
        }
        rec.tail_segment = t;
        meta.save(&mut self.actor)?;
        self.actor.commit()?;

        offload::offload_after_push(&mut self.actor, &self.bulk, &mut meta, &self.instance_id, p);

        Ok(PushResult { success: true })
    }

    /// `Pop()` — §4.5. Returns at most one item.
    pub fn pop(&mut self) -> Result<PopResult, QueueError> {
        let mut meta = self.load_metadata()?;
        if meta.queues.is_empty() {
            return Ok(PopResult::default());
        }

        for p in meta.priorities_ascending().collect::<Vec<_>>() {
            match self.take_one(&mut meta, p)? {
                Some(item) => {
                    meta.save(&mut self.actor)?;
                    self.actor.commit()?;
                    return Ok(PopResult { items: vec![item] });
                }
                None => continue,
            }
        }

        Ok(PopResult::default())
    }

    /// `PopWithLease(ttl_seconds)` — §4.5.
    pub fn pop_with_lease(&mut self, ttl_seconds: Option<u64>) -> Result<LeaseResult, QueueError> {
        let mut meta = self.load_metadata()?;
        let now = self.clock.now();

        if let Some(lease) = meta.active_lease.clone() {
            if now < lease.expires_at {
                return Ok(LeaseResult {
                    locked: true,
                    lock_expires_at: Some(lease.expires_at),
                    ..Default::default()
                });
            }
            lease::return_expired_lease(&mut self.actor, &self.bulk, &mut meta, &self.instance_id)?;
            meta.save(&mut self.actor)?;
            self.actor.commit()?;
        }

        let mut taken: Option<(u64, Item)> = None;
        for p in meta.priorities_ascending().collect::<Vec<_>>() {
            if let Some(item) = self.take_one(&mut meta, p)? {
                taken = Some((p, item));
                break;
            }
        }

        let Some((origin_priority, item)) = taken else {
            meta.save(&mut self.actor)?;
            self.actor.commit()?;
            return Ok(LeaseResult { locked: false, ..Default::default() });
        };

        let ttl = clamp_ttl(ttl_seconds);
        let lock_id = lease::new_lock_id();
        let lease_rec = lease::new_lease(
            lock_id.clone(),
            now,
            ttl,
            vec![HeldItem { item: item.clone(), origin_priority }],
        );
        let expires_at = lease_rec.expires_at;
        meta.active_lease = Some(lease_rec);
        meta.save(&mut self.actor)?;
        self.actor.commit()?;

        Ok(LeaseResult {
            items: vec![item],
            count: 1,
            locked: true,
            lock_id: Some(lock_id),
            lock_expires_at: Some(expires_at),
            message: None,
        })
    }

    /// `Acknowledge(lock_id)` — §4.5.
    pub fn acknowledge(&mut self, lock_id: &str) -> Result<AcknowledgeResult, QueueError> {
        if lock_id.is_empty() {
            return Err(QueueError::invalid_argument("lock_id must not be empty"));
        }

        let mut meta = self.load_metadata()?;
        let now = self.clock.now();

        let Some(lease) = meta.active_lease.clone() else {
            return Ok(AcknowledgeResult {
                success: false,
                message: Some("no active lease".to_string()),
                error_code: Some(QueueError::not_found("no active lease").code().to_string()),
                items_acknowledged: None,
            });
        };

        if now >= lease.expires_at {
            meta.active_lease = None;
            meta.save(&mut self.actor)?;
            self.actor.commit()?;
            return Ok(AcknowledgeResult {
                success: false,
                message: Some("lease expired".to_string()),
                error_code: Some(QueueError::lock_expired("lease expired").code().to_string()),
                items_acknowledged: None,
            });
        }

        if lease.lock_id != lock_id {
            return Ok(AcknowledgeResult {
                success: false,
                message: Some("lock id does not match active lease".to_string()),
                error_code: Some(QueueError::invalid_lock_id("mismatch").code().to_string()),
                items_acknowledged: None,
            });
        }

        let items_acknowledged = lease.held_items.len() as u64;
        meta.active_lease = None;
        meta.save(&mut self.actor)?;
        self.actor.commit()?;

        Ok(AcknowledgeResult {
            success: true,
            message: None,
            items_acknowledged: Some(items_acknowledged),
            error_code: None,
        })
    }

    /// Shared item-removal steps used by `Pop` and the non-lease-bookkeeping part
    /// of `PopWithLease` (§4.5 Pop steps 3a-g). Returns `None` if priority `p` had
    /// no item to give up by the time reload/self-heal ran.
    fn take_one(&mut self, meta: &mut Metadata, p: u64) -> Result<Option<Item>, QueueError> {
        offload::reload_before_consume(&mut self.actor, &self.bulk, meta, &self.instance_id, p)?;

        let rec = match meta.priority(p) {
            Some(rec) if rec.count > 0 => rec.clone(),
            _ => return Ok(None),
        };

        let mut head = segment::read(&self.actor, p, rec.head_segment)?;
        if head.is_empty() {
            warn!("priority {p} desync: count {} but empty head segment {}", rec.count, rec.head_segment);
            meta.queues.remove(&p);
            meta.save(&mut self.actor)?;
            self.actor.commit()?;
            return Ok(None);
        }

        let item = head.remove(0);

        if head.is_empty() {
            if rec.head_segment < rec.tail_segment {
                segment::remove(&mut self.actor, p, rec.head_segment);
                let rec = meta.priority_mut(p);
                rec.head_segment += 1;
                rec.count -= 1;
            } else {
                segment::remove(&mut self.actor, p, rec.head_segment);
                meta.queues.remove(&p);
            }
        } else {
            segment::write(&mut self.actor, p, rec.head_segment, &head)?;
            let rec = meta.priority_mut(p);
            rec.count -= 1;
        }

        Ok(Some(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{MemoryActorStore, MemoryBulkStore};

    fn item(n: i64) -> Item {
        let mut m = std::collections::BTreeMap::new();
        m.insert("n".to_string(), Item::Int(n));
        Item::Map(m)
    }

    fn engine(segment_size: u32, buffer_segments: u32) -> QueueEngine<MemoryActorStore, MemoryBulkStore, ManualClock> {
        QueueEngine::new(
            MemoryActorStore::new(),
            MemoryBulkStore::new(),
            ManualClock::new(1_000),
            "inst-a",
            QueueConfig { segment_size, buffer_segments },
        )
    }

    #[test]
    fn push_rejects_non_map_item() {
        let mut eng = engine(10, 0);
        let err = eng.push(Item::Int(1), None).unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
    }

    #[test]
    fn push_then_pop_round_trips_fifo() {
        let mut eng = engine(10, 0);
        eng.push(item(1), Some(0)).unwrap();
        eng.push(item(2), Some(0)).unwrap();
        assert_eq!(eng.pop().unwrap().items, vec![item(1)]);
        assert_eq!(eng.pop().unwrap().items, vec![item(2)]);
        assert_eq!(eng.pop().unwrap().items, Vec::<Item>::new());
    }

    #[test]
    fn pop_respects_priority_order() {
        let mut eng = engine(10, 0);
        eng.push(item(1), Some(5)).unwrap();
        eng.push(item(2), Some(0)).unwrap();
        assert_eq!(eng.pop().unwrap().items, vec![item(2)]);
        assert_eq!(eng.pop().unwrap().items, vec![item(1)]);
    }

    #[test]
    fn pop_with_lease_then_locked_until_ack() {
        let mut eng = engine(10, 0);
        eng.push(item(1), Some(0)).unwrap();
        let leased = eng.pop_with_lease(Some(30)).unwrap();
        assert!(leased.locked);
        let lock_id = leased.lock_id.clone().unwrap();

        let blocked = eng.pop_with_lease(Some(30)).unwrap();
        assert!(blocked.locked);
        assert!(blocked.items.is_empty());
        assert_eq!(blocked.lock_id, None);

        let ack = eng.acknowledge(&lock_id).unwrap();
        assert!(ack.success);
        assert_eq!(ack.items_acknowledged, Some(1));
    }

    #[test]
    fn acknowledge_with_wrong_lock_id_does_not_release_lease() {
        let mut eng = engine(10, 0);
        eng.push(item(1), Some(0)).unwrap();
        eng.pop_with_lease(Some(30)).unwrap();

        let ack = eng.acknowledge("bogus").unwrap();
        assert!(!ack.success);
        assert_eq!(ack.error_code, Some("InvalidLockId".to_string()));

        let still_locked = eng.pop_with_lease(Some(30)).unwrap();
        assert!(still_locked.locked);
        assert!(still_locked.lock_id.is_none());
    }

    #[test]
    fn expired_lease_returns_item_to_head_on_next_pop_with_lease() {
        let mut eng = engine(10, 0);
        eng.push(item(1), Some(0)).unwrap();
        eng.push(item(2), Some(0)).unwrap();
        let first = eng.pop_with_lease(Some(1)).unwrap();
        assert_eq!(first.items, vec![item(1)]);

        eng.clock().advance(2);
        let second = eng.pop_with_lease(Some(30)).unwrap();
        assert_eq!(second.items, vec![item(1)]);
    }

    #[test]
    fn acknowledge_on_expired_lease_does_not_return_items() {
        let mut eng = engine(10, 0);
        eng.push(item(1), Some(0)).unwrap();
        let leased = eng.pop_with_lease(Some(1)).unwrap();
        let lock_id = leased.lock_id.unwrap();

        eng.clock().advance(2);
        let ack = eng.acknowledge(&lock_id).unwrap();
        assert!(!ack.success);
        assert_eq!(ack.error_code, Some("LockExpired".to_string()));

        // Acknowledge does not restore the item; only a subsequent Pop would.
        assert_eq!(eng.pop().unwrap().items, vec![item(1)]);
    }

    #[test]
    fn offload_and_reload_round_trip_across_many_segments() {
        // 8 items at segment_size=2 forces two distinct segments to offload
        // behind one another, not just the first one ever offloaded.
        let mut eng = engine(2, 0);
        for n in 0..8 {
            eng.push(item(n), Some(0)).unwrap();
        }
        let mut popped = Vec::new();
        for _ in 0..8 {
            popped.push(eng.pop().unwrap().items.remove(0));
        }
        assert_eq!(popped, (0..8).map(item).collect::<Vec<_>>());
    }
}
