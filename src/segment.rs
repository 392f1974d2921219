// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The Segment Store: fixed-capacity ordered chunks of items, keyed by
//! `(priority, segment_number)`, resident in actor-state or offloaded to bulk-store.

use crate::error::{AsInternal, QueueError};
use crate::item::Item;
use crate::store::{ActorStore, BulkStore};

/// An ordered sequence of items. Insertion is append-only at the tail;
/// consumption removes from the head.
pub type Segment = Vec<Item>;

pub fn actor_key(priority: u64, segment: u64) -> String {
    format!("queue_{}_seg_{}", priority, segment)
}

pub fn bulk_key(priority: u64, segment: u64, instance_id: &str) -> String {
    format!("offloaded_queue_{}_seg_{}_{}", priority, segment, instance_id)
}

/// Reads a resident segment, defaulting to empty if absent.
pub fn read<S: ActorStore>(store: &S, priority: u64, segment: u64) -> Result<Segment, QueueError> {
    match store.try_get(&actor_key(priority, segment))? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .internal(format!("decoding segment ({priority}, {segment})")),
        None => Ok(Vec::new()),
    }
}

/// Stages a replacement of a resident segment. Writing an empty segment is
/// equivalent to `remove` for the purpose of later reads, but the caller decides
/// which to use (§4.5 step e/f distinguishes "clear" from "advance/remove").
pub fn write<S: ActorStore>(
    store: &mut S,
    priority: u64,
    segment: u64,
    value: &Segment,
) -> Result<(), QueueError> {
    let bytes = serde_json::to_vec(value).internal("encoding segment")?;
    store.set(&actor_key(priority, segment), bytes);
    Ok(())
}

/// Stages removal of a resident segment key.
pub fn remove<S: ActorStore>(store: &mut S, priority: u64, segment: u64) {
    store.remove(&actor_key(priority, segment));
}

/// Reads an offloaded segment payload from bulk-store. Returns `Ok(None)` if the
/// key is entirely absent (a data-loss condition the caller must treat as
/// `StoreCorrupt`, per §4.4/§9); a present-but-empty blob still decodes to `Some(vec![])`,
/// which the caller also treats as corrupt rather than silently healing.
pub fn bulk_read<B: BulkStore>(
    store: &B,
    priority: u64,
    segment: u64,
    instance_id: &str,
) -> Result<Option<Segment>, QueueError> {
    match store.get(&bulk_key(priority, segment, instance_id))? {
        Some(bytes) => {
            let decoded: Segment = serde_json::from_slice(&bytes)
                .internal(format!("decoding offloaded segment ({priority}, {segment})"))?;
            Ok(Some(decoded))
        }
        None => Ok(None),
    }
}

pub fn bulk_write<B: BulkStore>(
    store: &B,
    priority: u64,
    segment: u64,
    instance_id: &str,
    value: &Segment,
) -> Result<(), QueueError> {
    let bytes = serde_json::to_vec(value).internal("encoding offloaded segment")?;
    store.put(&bulk_key(priority, segment, instance_id), bytes)
}

pub fn bulk_delete<B: BulkStore>(
    store: &B,
    priority: u64,
    segment: u64,
    instance_id: &str,
) -> Result<(), QueueError> {
    store.delete(&bulk_key(priority, segment, instance_id))
}
