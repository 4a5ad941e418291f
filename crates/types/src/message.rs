// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeMap;

use crate::schema::SchemaId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub key: String,
    pub value: String,
}

impl MessageHeader {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A record read from a topic partition, handed over to the consumer's handler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub key: String,
    pub value: String,
    pub partition: i32,
    pub offset: i64,
    pub headers: Vec<MessageHeader>,
    /// Milliseconds since epoch, when the broker reports one.
    pub timestamp: Option<i64>,
    /// Present only when the key carries an embedded schema registry id.
    pub key_schema_id: Option<SchemaId>,
    /// Present only when the value carries an embedded schema registry id.
    pub value_schema_id: Option<SchemaId>,
}

/// Where consumption starts in each partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OffsetStrategy {
    #[default]
    Earliest,
    Latest,
    /// Start offset per partition. Partitions missing from the map start at the earliest
    /// available offset.
    Explicit(BTreeMap<i32, i64>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeFlags {
    /// Keep streaming new records instead of stopping at the end of the partition.
    pub follow: bool,
    /// Only read the last `n` records of each partition.
    pub tail: Option<u64>,
    pub offset: OffsetStrategy,
}

impl Default for ConsumeFlags {
    fn default() -> Self {
        Self {
            follow: true,
            tail: None,
            offset: OffsetStrategy::Earliest,
        }
    }
}

impl ConsumeFlags {
    /// Computes the offset to start reading from, given a partition's watermarks.
    ///
    /// `low` is the first available offset and `high` the offset the next produced record
    /// will get. The result is always within `low..=high`.
    pub fn start_offset(&self, partition: i32, low: i64, high: i64) -> i64 {
        if let Some(tail) = self.tail {
            let tail = i64::try_from(tail).unwrap_or(i64::MAX);
            return high.saturating_sub(tail).max(low);
        }

        match &self.offset {
            OffsetStrategy::Earliest => low,
            OffsetStrategy::Latest => high,
            OffsetStrategy::Explicit(offsets) => offsets
                .get(&partition)
                .map(|offset| (*offset).clamp(low, high))
                .unwrap_or(low),
        }
    }
}
