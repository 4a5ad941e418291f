// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! This crate contains the core types shared by the kafscope components: the cluster
//! configuration model, its loader, and the domain types handed out by data sources.

pub mod config;
pub mod config_loader;
pub mod consumer_group;
pub mod message;
pub mod schema;
pub mod topic;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use consumer_group::ConsumerGroup;
pub use message::{ConsumeFlags, Message, MessageHeader, OffsetStrategy};
pub use schema::{MessageSchemaInfo, SchemaId, SchemaInfo, SchemaType};
pub use topic::Topic;
