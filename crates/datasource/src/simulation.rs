// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A data source serving synthetic clusters, topics and messages without any network.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use futures::stream;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kafscope_schema_registry::{
    MAGIC_BYTE, RegistryError, SchemaCache, SchemaResolver, WIRE_HEADER_LEN,
};
use kafscope_types::config_loader::ConfigSource;
use kafscope_types::{
    ConsumeFlags, ConsumerGroup, MessageSchemaInfo, SchemaId, SchemaInfo, SchemaType, Topic,
};

use crate::admin::{AdminGateway, ClusterAdmin};
use crate::consume::{
    ErrorHandler, Handlers, MessageHandler, MessageStream, PartitionEvent, PartitionPlan,
    RawRecord, RecordStream, merge, partition_messages, run_partitions,
};
use crate::error::{AdminError, ConsumeError, DataSourceError};
use crate::facade::DataSource;

pub const SIMULATED_CONTEXTS: [&str; 3] = ["kafka-dev", "kafka-test", "kafka-prod"];
pub const SIMULATED_TOPICS: [&str; 5] =
    ["orders", "payments", "inventory", "user-events", "audit-log"];

const PARTITIONS: i32 = 3;
const REPLICATION_FACTOR: i32 = 3;
/// Records already in each partition when consumption starts, at offsets `1..=BACKLOG`.
const BACKLOG: i64 = 100;
const FIRST_OFFSET: i64 = 1;
/// Pace of new records per partition while following.
const LIVE_INTERVAL: Duration = Duration::from_millis(250);

pub const KEY_SCHEMA_ID: SchemaId = 1;
pub const VALUE_SCHEMA_ID: SchemaId = 2;

/// [`DataSource`] backed by a fixed, synthetic catalog.
///
/// Each partition behaves like a log holding [`BACKLOG`] records that keeps growing while
/// following. Messages are numbered globally and spread round-robin over the partitions;
/// every third value and every fifth key is framed with a schema id.
pub struct SimulatedDataSource {
    context: RwLock<String>,
    admin: AdminGateway,
    schemas: SchemaCache,
}

impl Default for SimulatedDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDataSource {
    pub fn new() -> Self {
        Self {
            context: RwLock::new(SIMULATED_CONTEXTS[0].to_owned()),
            admin: AdminGateway::new(Box::new(SimulatedAdmin), "simulated:9092"),
            schemas: SchemaCache::new(SimulatedRegistry),
        }
    }

    fn partition_streams(
        &self,
        cancel: &CancellationToken,
        topic: &str,
        flags: &ConsumeFlags,
    ) -> Result<Vec<(i32, MessageStream)>, ConsumeError> {
        if !SIMULATED_TOPICS.contains(&topic) {
            return Err(ConsumeError::TopicNotFound(topic.to_owned()));
        }

        let (low, high) = (FIRST_OFFSET, FIRST_OFFSET + BACKLOG);
        Ok((0..PARTITIONS)
            .filter_map(|partition| {
                let start = flags.start_offset(partition, low, high);
                let plan = PartitionPlan::new(partition, start, (!flags.follow).then_some(high));
                if plan.is_drained() {
                    return None;
                }
                debug!(topic, partition, start, "Simulated partition start offset");
                let records = synthetic_records(topic.to_owned(), partition, start, high);
                Some((partition, partition_messages(cancel.clone(), plan, records)))
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl DataSource for SimulatedDataSource {
    async fn init(&self, _source: ConfigSource) -> Result<(), DataSourceError> {
        info!(context = %self.context(), "Using simulated clusters");
        Ok(())
    }

    async fn topics(&self) -> Result<HashMap<String, Topic>, DataSourceError> {
        Ok(self.admin.list_topics().await?)
    }

    fn contexts(&self) -> Vec<String> {
        SIMULATED_CONTEXTS.map(str::to_owned).to_vec()
    }

    fn context(&self) -> String {
        self.context.read().clone()
    }

    async fn set_context(&self, name: &str) -> Result<(), DataSourceError> {
        if !SIMULATED_CONTEXTS.contains(&name) {
            return Err(DataSourceError::ClusterNotFound(name.to_owned()));
        }
        *self.context.write() = name.to_owned();
        debug!(context = name, "Switched simulated context");
        Ok(())
    }

    async fn consumer_groups(&self) -> Result<Vec<ConsumerGroup>, DataSourceError> {
        Ok(self.admin.list_consumer_groups().await?)
    }

    async fn consume_topic(
        &self,
        cancel: CancellationToken,
        topic: &str,
        flags: ConsumeFlags,
        on_message: MessageHandler,
        on_error: ErrorHandler,
    ) -> Result<(), ConsumeError> {
        let partitions = self.partition_streams(&cancel, topic, &flags)?;
        run_partitions(
            cancel,
            partitions,
            Handlers {
                on_message,
                on_error,
            },
        )
        .await
    }

    async fn stream_topic(
        &self,
        cancel: CancellationToken,
        topic: &str,
        flags: ConsumeFlags,
    ) -> Result<MessageStream, ConsumeError> {
        Ok(merge(self.partition_streams(&cancel, topic, &flags)?, None))
    }

    async fn message_schema_info(
        &self,
        key_schema_id: Option<SchemaId>,
        value_schema_id: Option<SchemaId>,
    ) -> Result<Option<MessageSchemaInfo>, DataSourceError> {
        Ok(self
            .schemas
            .message_schema_info(key_schema_id, value_schema_id)
            .await?)
    }

    async fn close(&self) {
        self.admin.close().await;
    }
}

/// Global sequence number of the record at `offset` in `partition`.
fn sequence(partition: i32, offset: i64) -> i64 {
    (offset - FIRST_OFFSET) * i64::from(PARTITIONS) + i64::from(partition) + 1
}

fn frame(schema_id: SchemaId, body: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(WIRE_HEADER_LEN + body.len());
    framed.push(MAGIC_BYTE);
    framed.extend_from_slice(&schema_id.to_be_bytes());
    framed.extend_from_slice(body);
    framed
}

fn synthetic_record(topic: &str, partition: i32, offset: i64) -> RawRecord {
    let n = sequence(partition, offset);

    let key = format!("key-{n}").into_bytes();
    let key = if n % 5 == 0 {
        frame(KEY_SCHEMA_ID, &key)
    } else {
        key
    };

    let value = format!(r#"{{"id":{n},"topic":"{topic}","amount":{}}}"#, (n * 37) % 1000);
    let value = if n % 3 == 0 {
        frame(VALUE_SCHEMA_ID, value.as_bytes())
    } else {
        value.into_bytes()
    };

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .ok();

    RawRecord {
        partition,
        offset,
        key: Some(key),
        payload: Some(value),
        headers: vec![
            ("source".to_owned(), Some(b"kafscope-simulation".to_vec())),
            ("sequence".to_owned(), Some(n.to_string().into_bytes())),
        ],
        timestamp,
    }
}

/// Records from `start` on. The backlog below `high` is available at once, later records
/// arrive every [`LIVE_INTERVAL`].
fn synthetic_records(topic: String, partition: i32, start: i64, high: i64) -> RecordStream {
    stream::unfold(start, move |offset| {
        let topic = topic.clone();
        async move {
            if offset < high {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(LIVE_INTERVAL).await;
            }
            let record = synthetic_record(&topic, partition, offset);
            Some((Ok(PartitionEvent::Record(record)), offset + 1))
        }
    })
    .boxed()
}

struct SimulatedAdmin;

#[async_trait::async_trait]
impl ClusterAdmin for SimulatedAdmin {
    async fn list_topics(&self) -> Result<HashMap<String, Topic>, AdminError> {
        Ok(SIMULATED_TOPICS
            .iter()
            .map(|name| {
                let assignment: BTreeMap<i32, Vec<i32>> = (0..PARTITIONS)
                    .map(|p| (p, (0..REPLICATION_FACTOR).map(|r| (p + r) % 3 + 1).collect()))
                    .collect();
                let config = BTreeMap::from([
                    ("cleanup.policy".to_owned(), Some("delete".to_owned())),
                    ("retention.ms".to_owned(), Some("604800000".to_owned())),
                    ("min.insync.replicas".to_owned(), Some("2".to_owned())),
                ]);
                let topic = Topic::new(*name, assignment)
                    .with_config_entries(config)
                    .with_message_count(BACKLOG * i64::from(PARTITIONS));
                (name.to_string(), topic)
            })
            .collect())
    }

    async fn list_consumer_group_names(&self) -> Result<Vec<String>, AdminError> {
        Ok(simulated_groups().into_iter().map(|g| g.name).collect())
    }

    async fn describe_consumer_groups(
        &self,
        names: &[String],
    ) -> Result<Vec<ConsumerGroup>, AdminError> {
        let groups = simulated_groups();
        Ok(names
            .iter()
            .filter_map(|name| groups.iter().find(|g| &g.name == name).cloned())
            .collect())
    }

    async fn close(&self) {}
}

// deliberately not in name order
fn simulated_groups() -> Vec<ConsumerGroup> {
    vec![
        ConsumerGroup::new("payment-processor", "Stable", 2),
        ConsumerGroup::new("order-service", "Stable", 3),
        ConsumerGroup::new("inventory-sync", "Stable", 1),
        ConsumerGroup::new("analytics", "Empty", 0),
        ConsumerGroup::new("audit-consumer", "PreparingRebalance", 1),
    ]
}

struct SimulatedRegistry;

#[async_trait::async_trait]
impl SchemaResolver for SimulatedRegistry {
    async fn resolve(&self, id: SchemaId) -> Result<Option<SchemaInfo>, RegistryError> {
        let schema = match id {
            KEY_SCHEMA_ID => SchemaInfo {
                id,
                subject: "orders-key".to_owned(),
                version: 1,
                record_name: "com.kafscope.simulation.OrderKey".to_owned(),
                schema_type: SchemaType::Avro,
                schema: r#"{"type":"record","name":"OrderKey","namespace":"com.kafscope.simulation","fields":[{"name":"key","type":"string"}]}"#.to_owned(),
            },
            VALUE_SCHEMA_ID => SchemaInfo {
                id,
                subject: "orders-value".to_owned(),
                version: 3,
                record_name: "com.kafscope.simulation.Order".to_owned(),
                schema_type: SchemaType::Avro,
                schema: r#"{"type":"record","name":"Order","namespace":"com.kafscope.simulation","fields":[{"name":"id","type":"long"},{"name":"topic","type":"string"},{"name":"amount","type":"long"}]}"#.to_owned(),
            },
            _ => return Ok(None),
        };
        Ok(Some(schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use googletest::prelude::*;
    use kafscope_types::{Message, OffsetStrategy};
    use test_log::test;

    fn not_following() -> ConsumeFlags {
        ConsumeFlags {
            follow: false,
            ..Default::default()
        }
    }

    #[test]
    fn sequence_is_round_robin() {
        assert_that!(sequence(0, 1), eq(1));
        assert_that!(sequence(1, 1), eq(2));
        assert_that!(sequence(2, 1), eq(3));
        assert_that!(sequence(0, 2), eq(4));
    }

    #[test]
    fn schema_ids_follow_the_sequence() {
        // n = 3: value framed
        let message = crate::consume::decode(synthetic_record("orders", 2, 1));
        assert_that!(message.value_schema_id, some(eq(VALUE_SCHEMA_ID)));
        assert_that!(message.key_schema_id, none());
        assert!(message.value.starts_with("{\"id\":3"), "{}", message.value);

        // n = 5: key framed
        let message = crate::consume::decode(synthetic_record("orders", 1, 2));
        assert_that!(message.key_schema_id, some(eq(KEY_SCHEMA_ID)));
        assert_that!(message.value_schema_id, none());
        assert_that!(message.key, eq("key-5"));

        // n = 15: both
        let message = crate::consume::decode(synthetic_record("orders", 2, 5));
        assert_that!(message.key_schema_id, some(eq(KEY_SCHEMA_ID)));
        assert_that!(message.value_schema_id, some(eq(VALUE_SCHEMA_ID)));
    }

    #[test(tokio::test)]
    async fn bounded_stream_reads_the_backlog() {
        let source = SimulatedDataSource::new();
        let messages: Vec<_> = source
            .stream_topic(CancellationToken::new(), "orders", not_following())
            .await
            .unwrap()
            .collect()
            .await;

        assert_that!(messages.len(), eq(300));
    }

    #[test(tokio::test)]
    async fn tail_reads_the_last_records() {
        let source = SimulatedDataSource::new();
        let flags = ConsumeFlags {
            tail: Some(2),
            ..not_following()
        };
        let mut offsets: Vec<_> = source
            .stream_topic(CancellationToken::new(), "payments", flags)
            .await
            .unwrap()
            .map(|m| {
                let m = m.unwrap();
                (m.partition, m.offset)
            })
            .collect()
            .await;
        offsets.sort();

        assert_that!(
            offsets,
            eq(vec![(0, 99), (0, 100), (1, 99), (1, 100), (2, 99), (2, 100)])
        );
    }

    #[test(tokio::test)]
    async fn explicit_offsets_per_partition() {
        let source = SimulatedDataSource::new();
        let flags = ConsumeFlags {
            offset: OffsetStrategy::Explicit(BTreeMap::from([(0, 99), (1, 101)])),
            ..not_following()
        };
        let messages: Vec<_> = source
            .stream_topic(CancellationToken::new(), "inventory", flags)
            .await
            .unwrap()
            .map(|m| m.unwrap())
            .collect()
            .await;

        // partition 1 starts at the end, partition 2 is absent and starts at the beginning
        let count = |p| messages.iter().filter(|m| m.partition == p).count();
        assert_that!(count(0), eq(2));
        assert_that!(count(1), eq(0));
        assert_that!(count(2), eq(100));
    }

    #[test(tokio::test)]
    async fn latest_without_follow_is_empty() {
        let source = SimulatedDataSource::new();
        let flags = ConsumeFlags {
            offset: OffsetStrategy::Latest,
            ..not_following()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let (messages, errors) = (Arc::clone(&calls), Arc::clone(&calls));
        let result = source
            .consume_topic(
                CancellationToken::new(),
                "orders",
                flags,
                Arc::new(move |_: Message| -> anyhow::Result<()> {
                    messages.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
                Arc::new(move |_: ConsumeError| {
                    errors.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;
        assert!(result.is_ok());
        assert_that!(calls.load(Ordering::SeqCst), eq(0));
    }

    #[test(tokio::test)]
    async fn unknown_topic_is_rejected() {
        let source = SimulatedDataSource::new();
        let result = source
            .stream_topic(CancellationToken::new(), "nope", ConsumeFlags::default())
            .await;
        assert!(matches!(result, Err(ConsumeError::TopicNotFound(topic)) if topic == "nope"));
    }

    #[test(tokio::test)]
    async fn catalog() -> anyhow::Result<()> {
        let source = SimulatedDataSource::new();

        let topics = source.topics().await?;
        assert_that!(topics.len(), eq(5));
        let orders = &topics["orders"];
        assert_that!(orders.partition_count, eq(3));
        assert_that!(orders.replication_factor, eq(3));
        assert_that!(orders.message_count, eq(300));
        assert_that!(
            orders.config_entries.get("cleanup.policy"),
            some(some(eq("delete")))
        );

        let groups: Vec<_> = source
            .consumer_groups()
            .await?
            .into_iter()
            .map(|g| g.name)
            .collect();
        let mut sorted = groups.clone();
        sorted.sort();
        assert_that!(groups, eq(sorted));
        Ok(())
    }
}
