// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Access to Kafka clusters for the explorer: topic and consumer group listings, message
//! consumption and schema lookups, behind the [`DataSource`] trait.

mod admin;
mod consume;
mod error;
mod facade;
mod kafka_consumer;
mod simulation;
#[cfg(test)]
mod test_cluster;
mod transport;

pub use admin::{AdminFactory, AdminGateway, ClusterAdmin, KafkaAdmin, RdKafkaAdminFactory};
pub use consume::{
    ErrorHandler, MessageHandler, MessageStream, PartitionPlan, RawRecord, decode,
};
pub use error::{AdminError, ConsumeError, DataSourceError, TransportError};
pub use facade::{DataSource, KafkaDataSource};
pub use simulation::{
    KEY_SCHEMA_ID, SIMULATED_CONTEXTS, SIMULATED_TOPICS, SimulatedDataSource, VALUE_SCHEMA_ID,
};
pub use transport::{ExplorerContext, TransportConfig, TransportConfigBuilder};
