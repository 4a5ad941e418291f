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

/// Message count reported when the watermarks could not be fetched.
pub const UNKNOWN_MESSAGE_COUNT: i64 = -1;

/// Snapshot of a topic as reported by the cluster. A fresh value is built on every listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub partition_count: i32,
    pub replication_factor: i16,
    /// Partition id to the broker ids holding a replica.
    pub replica_assignment: BTreeMap<i32, Vec<i32>>,
    pub config_entries: BTreeMap<String, Option<String>>,
    /// Sum of `high - low` watermarks across partitions, or [`UNKNOWN_MESSAGE_COUNT`].
    pub message_count: i64,
}

impl Topic {
    pub fn new(name: impl Into<String>, replica_assignment: BTreeMap<i32, Vec<i32>>) -> Self {
        let replication_factor = replica_assignment
            .values()
            .map(|replicas| replicas.len())
            .max()
            .unwrap_or_default() as i16;

        Self {
            name: name.into(),
            partition_count: replica_assignment.len() as i32,
            replication_factor,
            replica_assignment,
            config_entries: BTreeMap::new(),
            message_count: UNKNOWN_MESSAGE_COUNT,
        }
    }

    pub fn with_config_entries(mut self, entries: BTreeMap<String, Option<String>>) -> Self {
        self.config_entries = entries;
        self
    }

    pub fn with_message_count(mut self, message_count: i64) -> Self {
        self.message_count = message_count;
        self
    }

    pub fn partitions(&self) -> impl Iterator<Item = i32> + '_ {
        self.replica_assignment.keys().copied()
    }
}
