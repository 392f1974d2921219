// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The opaque structured payload carried by the queue.
//!
//! The source this crate's behavior is modeled on serializes nested dict-of-dict
//! payloads transparently. Here the boundary is made explicit: [`Item`] is a
//! self-describing tagged value (scalar, list, or map cases) so deserialization
//! failures surface at the edge instead of inside the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Maximum nesting depth of an [`Item`]. Guards against unbounded recursion on
/// both validation and serialization.
pub const MAX_ITEM_DEPTH: usize = 32;

/// Maximum canonical-JSON encoded size of a single [`Item`], in bytes.
pub const MAX_ITEM_BYTES: usize = 1 << 20; // 1 MiB

/// A structured, self-describing value. Treated as an opaque payload by the
/// queue engine: only ever constructed by callers, validated, and moved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Item {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Item>),
    Map(BTreeMap<String, Item>),
}

impl Item {
    /// Depth of this value: a scalar has depth 1, a list/map has
    /// `1 + max(depth of children)` (0 for empty containers, matching depth 1).
    fn depth(&self) -> usize {
        match self {
            Item::List(items) => 1 + items.iter().map(Item::depth).max().unwrap_or(0),
            Item::Map(fields) => 1 + fields.values().map(Item::depth).max().unwrap_or(0),
            _ => 1,
        }
    }

    /// Validates nesting depth and encoded size, returning `InvalidArgument` on violation.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.depth() > MAX_ITEM_DEPTH {
            return Err(QueueError::invalid_argument(format!(
                "item exceeds maximum nesting depth of {}",
                MAX_ITEM_DEPTH
            )));
        }
        let encoded = serde_json::to_vec(self)
            .map_err(|e| QueueError::invalid_argument(format!("item is not serializable: {}", e)))?;
        if encoded.len() > MAX_ITEM_BYTES {
            return Err(QueueError::invalid_argument(format!(
                "item exceeds maximum encoded size of {} bytes",
                MAX_ITEM_BYTES
            )));
        }
        Ok(())
    }

    /// Whether this item is a valid top-level Push payload: a map.
    pub fn is_map(&self) -> bool {
        matches!(self, Item::Map(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, Item)]) -> Item {
        Item::Map(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn scalars_round_trip_through_json() {
        for item in [
            Item::Null,
            Item::Bool(true),
            Item::Int(42),
            Item::Float(1.5),
            Item::Str("hi".into()),
        ] {
            let encoded = serde_json::to_string(&item).unwrap();
            let decoded: Item = serde_json::from_str(&encoded).unwrap();
            assert_eq!(item, decoded);
        }
    }

    #[test]
    fn map_is_the_only_valid_top_level_payload() {
        assert!(map(&[("n", Item::Int(1))]).is_map());
        assert!(!Item::List(vec![Item::Int(1)]).is_map());
        assert!(!Item::Int(1).is_map());
    }

    #[test]
    fn depth_is_computed_over_nested_structures() {
        assert_eq!(Item::Int(1).depth(), 1);
        assert_eq!(Item::List(vec![]).depth(), 1);
        assert_eq!(Item::List(vec![Item::Int(1)]).depth(), 2);
        let nested = map(&[("a", Item::List(vec![map(&[("b", Item::Int(1))])]))]);
        assert_eq!(nested.depth(), 4);
    }

    #[test]
    fn validate_rejects_excessive_depth() {
        let mut item = Item::Int(0);
        for _ in 0..MAX_ITEM_DEPTH + 1 {
            item = Item::List(vec![item]);
        }
        let err = item.validate().unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
    }

    #[test]
    fn validate_accepts_reasonable_payload() {
        let item = map(&[("x", Item::Int(1)), ("y", Item::Str("hello".into()))]);
        assert!(item.validate().is_ok());
    }
}
