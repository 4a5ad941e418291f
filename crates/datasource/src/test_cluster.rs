// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! In-process Kafka cluster for tests, backed by librdkafka's mock brokers.

use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::producer::DefaultProducerContext;
use rdkafka::mocking::MockCluster;
use rdkafka::producer::{FutureProducer, FutureRecord};

use kafscope_types::config::{ClusterConfig, ExplorerConfig};

use crate::transport::{TransportConfig, TransportConfigBuilder};

pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) struct TestCluster {
    mock: MockCluster<'static, DefaultProducerContext>,
    producer: FutureProducer,
}

impl TestCluster {
    pub fn new() -> Self {
        let mock = MockCluster::new(1).unwrap();
        let producer = ClientConfig::new()
            .set("bootstrap.servers", mock.bootstrap_servers())
            .set("message.timeout.ms", "10000")
            .create()
            .unwrap();
        Self { mock, producer }
    }

    pub fn create_topic(&self, topic: &str, partitions: i32) {
        self.mock.create_topic(topic, partitions, 1).unwrap();
    }

    /// Produces `count` records `key-<i>`/`value-<i>` to one partition.
    pub async fn produce(&self, topic: &str, partition: i32, count: usize) {
        for i in 0..count {
            let key = format!("key-{i}");
            let value = format!("value-{i}");
            self.producer
                .send(
                    FutureRecord::to(topic)
                        .partition(partition)
                        .key(&key)
                        .payload(&value),
                    Duration::from_secs(10),
                )
                .await
                .unwrap();
        }
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig::new("mock", vec![self.mock.bootstrap_servers()])
    }

    pub fn explorer_config(&self) -> ExplorerConfig {
        ExplorerConfig {
            current_cluster: "mock".to_owned(),
            clusters: vec![self.cluster_config()],
            ..Default::default()
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfigBuilder::new(&self.cluster_config())
            .build()
            .unwrap()
    }
}
