// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A durable, segmented, multi-priority queue with lease-based consumption.
//!
//! An instance is a single-owner state machine keyed by an `instance_id`: items
//! are pushed with an integer priority (lower numbers drain first, FIFO within a
//! priority) and held in fixed-size segments that can be offloaded to a bulk
//! store when cold and reloaded on demand. Consumers use plain [`Pop`](engine::QueueEngine::pop),
//! a lease-guarded [`PopWithLease`](engine::QueueEngine::pop_with_lease) with a TTL and
//! [`Acknowledge`](engine::QueueEngine::acknowledge), or a mix of both across calls.
//!
//! The crate itself performs no I/O beyond the [`ActorStore`](store::ActorStore) and
//! [`BulkStore`](store::BulkStore) traits supplied by the embedding host, and no
//! internal locking: callers are responsible for serializing operations against a
//! single instance, exactly as described in the concurrency model this crate assumes.

pub mod clock;
pub mod engine;
pub mod error;
pub mod item;
pub mod lease;
pub mod metadata;
pub mod offload;
pub mod segment;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{AcknowledgeResult, LeaseResult, PopResult, PushResult, QueueEngine};
pub use error::QueueError;
pub use item::Item;
pub use metadata::QueueConfig;
pub use store::{ActorStore, BulkStore};

/// Convenience alias used throughout this crate's public API.
pub type Result<T> = std::result::Result<T, QueueError>;
