// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The Lease Controller: at-most-one outstanding lease per instance, and the
//! procedure that returns unacknowledged items to their originating priority
//! on expiry (§4.6).

use itertools::Itertools;
use rand::RngCore;

use crate::error::QueueError;
use crate::metadata::{HeldItem, LeaseRecord, Metadata};
use crate::offload;
use crate::segment;
use crate::store::{ActorStore, BulkStore};

/// Minimum and default/maximum lease TTL, in seconds (§4.5 PopWithLease step 4).
pub const MIN_TTL_SECONDS: u64 = 1;
pub const MAX_TTL_SECONDS: u64 = 300;
pub const DEFAULT_TTL_SECONDS: u64 = 30;

/// Clamps a caller-supplied TTL into `[MIN_TTL_SECONDS, MAX_TTL_SECONDS]`,
/// defaulting to [`DEFAULT_TTL_SECONDS`] when unspecified.
pub fn clamp_ttl(ttl_seconds: Option<u64>) -> u64 {
    ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS).clamp(MIN_TTL_SECONDS, MAX_TTL_SECONDS)
}

/// Generates an opaque lock id. Grounded on the runtime's preference for `rand`
/// over hand-rolled entropy sources; not cryptographically load-bearing, only
/// required to be hard to guess/collide across leases.
pub fn new_lock_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn new_lease(lock_id: String, now: u64, ttl_seconds: u64, held_items: Vec<HeldItem>) -> LeaseRecord {
    LeaseRecord { lock_id, expires_at: now + ttl_seconds, created_at: now, held_items }
}

/// Executes the lease-return procedure (§4.6) against an expired lease already
/// known to be present in `meta.active_lease`. Groups held items by origin
/// priority (order-preserving, mirroring the grounding codebase's itertools-based
/// bucketing of queue entries by key), prepends each group to its priority's
/// head segment, and removes the lease. Does not commit; the caller commits once
/// as part of its own invocation.
pub fn return_expired_lease<A: ActorStore, B: BulkStore>(
    actor: &mut A,
    bulk: &B,
    meta: &mut Metadata,
    instance_id: &str,
) -> Result<(), QueueError> {
    let lease = meta.active_lease.take().expect("caller verified an active lease");

    let grouped = lease
        .held_items
        .into_iter()
        .into_group_map_by(|held| held.origin_priority);
    let mut priorities: Vec<u64> = grouped.keys().copied().collect();
    priorities.sort_unstable();

    for p in priorities {
        let items: Vec<_> = grouped[&p].iter().map(|held| held.item.clone()).collect();

        offload::reload_before_consume(actor, bulk, meta, instance_id, p)?;

        let rec = meta.priority_mut(p);
        let head_segment = rec.head_segment;
        let mut resident = segment::read(actor, p, head_segment)?;

        let mut restored = items;
        restored.extend(resident.drain(..));
        segment::write(actor, p, head_segment, &restored)?;

        let rec = meta.priority_mut(p);
        rec.count += restored_count(&grouped, p);
    }

    Ok(())
}

fn restored_count(grouped: &std::collections::HashMap<u64, Vec<HeldItem>>, p: u64) -> u64 {
    grouped.get(&p).map(|v| v.len() as u64).unwrap_or(0)
}
