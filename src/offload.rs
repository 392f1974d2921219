// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The Offload Manager: moves full, non-head-adjacent segments out of actor-state
//! into bulk-store, and reloads them back before head-side consumption (§4.4).

use log::warn;

use crate::error::QueueError;
use crate::metadata::{Metadata, PriorityRecord};
use crate::segment;
use crate::store::{ActorStore, BulkStore};

/// Runs after a successful Push to `priority`. Offloads at most one eligible
/// segment per call, matching the procedure's "examine segments of the pushed
/// priority" framing — Push only ever creates one newly-eligible segment per
/// invocation, so a single pass suffices. Offload failures are logged and
/// swallowed: the segment simply remains resident.
pub fn offload_after_push<A: ActorStore, B: BulkStore>(
    actor: &mut A,
    bulk: &B,
    meta: &mut Metadata,
    instance_id: &str,
    priority: u64,
) {
    let Some(rec) = meta.queues.get(&priority) else { return };
    let Some(n) = eligible_segment(rec, meta.config.buffer_segments) else { return };

    if let Err(e) = offload_one(actor, bulk, meta, instance_id, priority, n) {
        warn!("offload of priority {priority} segment {n} failed, remains resident: {e}");
    }
}

/// The lowest segment number currently eligible to offload, per §4.4's definition:
/// strictly between the head buffer and the tail, resident, full, not already offloaded.
///
/// When a priority already has an offloaded range, the next candidate continues
/// from its tail rather than bailing out — otherwise a write-heavy priority would
/// offload only its very first eligible segment and then grow resident state
/// without bound for the rest of its lifetime.
fn eligible_segment(rec: &PriorityRecord, buffer_segments: u32) -> Option<u64> {
    let min_n = rec.head_segment + buffer_segments as u64 + 1;
    let lo = match rec.tail_offloaded_segment {
        Some(tail_offloaded) => (tail_offloaded + 1).max(min_n),
        None => min_n,
    };
    if lo < rec.tail_segment {
        Some(lo)
    } else {
        None
    }
}

fn offload_one<A: ActorStore, B: BulkStore>(
    actor: &mut A,
    bulk: &B,
    meta: &mut Metadata,
    instance_id: &str,
    priority: u64,
    n: u64,
) -> Result<(), QueueError> {
    let payload = segment::read(actor, priority, n)?;
    let segment_size = meta.config.segment_size as usize;
    if payload.len() != segment_size {
        return Ok(()); // not full yet; nothing to do
    }

    segment::bulk_write(bulk, priority, n, instance_id, &payload)?;

    let rec = meta.priority_mut(priority);
    match (rec.head_offloaded_segment, rec.tail_offloaded_segment) {
        (None, None) => {
            rec.head_offloaded_segment = Some(n);
            rec.tail_offloaded_segment = Some(n);
        }
        (Some(_), Some(tail)) => {
            rec.tail_offloaded_segment = Some(tail.max(n));
        }
        _ => unreachable!("offloaded range endpoints are always set together"),
    }

    segment::remove(actor, priority, n);
    actor.commit()
}

/// Reloads offloaded segments of `priority` back into actor-state until the
/// offloaded range's head is no longer within the buffer boundary, per §4.4.
/// Must be called before any head-side consumption of the priority.
pub fn reload_before_consume<A: ActorStore, B: BulkStore>(
    actor: &mut A,
    bulk: &B,
    meta: &mut Metadata,
    instance_id: &str,
    priority: u64,
) -> Result<(), QueueError> {
    let buffer_segments = meta.config.buffer_segments as u64;
    loop {
        let Some(rec) = meta.queues.get(&priority) else { return Ok(()) };
        let Some(m) = rec.head_offloaded_segment else { return Ok(()) };
        if m > rec.head_segment + buffer_segments {
            return Ok(());
        }
        reload_one(actor, bulk, meta, instance_id, priority, m)?;
    }
}

fn reload_one<A: ActorStore, B: BulkStore>(
    actor: &mut A,
    bulk: &B,
    meta: &mut Metadata,
    instance_id: &str,
    priority: u64,
    m: u64,
) -> Result<(), QueueError> {
    let payload = segment::bulk_read(bulk, priority, m, instance_id)?.ok_or_else(|| {
        QueueError::store_corrupt(format!(
            "offloaded segment ({priority}, {m}) missing from bulk-store"
        ))
    })?;
    if payload.is_empty() {
        return Err(QueueError::store_corrupt(format!(
            "offloaded segment ({priority}, {m}) present but empty"
        )));
    }

    segment::write(actor, priority, m, &payload)?;

    let rec = meta.priority_mut(priority);
    let tail_offloaded = rec.tail_offloaded_segment.expect("reload implies a non-empty range");
    if m == tail_offloaded {
        rec.head_offloaded_segment = None;
        rec.tail_offloaded_segment = None;
    } else {
        rec.head_offloaded_segment = Some(m + 1);
    }

    segment::bulk_delete(bulk, priority, m, instance_id)?;
    actor.commit()
}
