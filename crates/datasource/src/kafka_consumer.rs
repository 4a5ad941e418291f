// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use rdkafka::consumer::stream_consumer::StreamPartitionQueue;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Headers, Message as _};
use rdkafka::{Offset, TopicPartitionList};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use kafscope_types::ConsumeFlags;

use crate::consume::{
    AbortOnDrop, ErrorHandler, MessageStream, PartitionEvent, PartitionPlan, RawRecord,
    RecordStream, partition_messages,
};
use crate::error::ConsumeError;
use crate::transport::{ExplorerContext, TransportConfig};

type ExplorerConsumer = StreamConsumer<ExplorerContext>;

/// Offsets are never committed, the group only exists because librdkafka requires one.
const GROUP_ID: &str = "kafscope-explorer";
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// The assigned partitions of a topic, ready to be read.
pub(crate) struct TopicReader {
    pub partitions: Vec<(i32, MessageStream)>,
    /// Polls the main queue; dropping it stops the consumer callbacks.
    pub poller: AbortOnDrop,
}

/// Resolves the partitions of `topic` and their start offsets, then assigns them with one
/// queue per partition.
///
/// Errors surfacing on the main queue go to `on_error`, or are logged when there is none.
pub(crate) async fn open_topic(
    transport: &TransportConfig,
    cancel: &CancellationToken,
    topic: &str,
    flags: &ConsumeFlags,
    on_error: Option<ErrorHandler>,
) -> Result<TopicReader, ConsumeError> {
    let consumer: Arc<ExplorerConsumer> = Arc::new(
        transport
            .create_with(&[
                ("group.id", GROUP_ID),
                ("enable.auto.commit", "false"),
                ("enable.auto.offset.store", "false"),
                ("enable.partition.eof", "true"),
            ])
            .map_err(crate::error::TransportError::from)?,
    );
    check_cancelled(cancel)?;

    let partitions = fetch_partitions(&consumer, topic).await?;
    debug!(
        cluster = transport.cluster(),
        topic,
        partitions = partitions.len(),
        "Resolved topic partitions"
    );

    let mut plans = Vec::with_capacity(partitions.len());
    for partition in partitions {
        check_cancelled(cancel)?;
        let (low, high) = fetch_watermarks(&consumer, topic, partition).await?;
        check_cancelled(cancel)?;

        let start = flags.start_offset(partition, low, high);
        let plan = PartitionPlan::new(partition, start, (!flags.follow).then_some(high));
        if plan.is_drained() {
            debug!(topic, partition, low, high, "Nothing to read in partition");
            continue;
        }
        debug!(topic, partition, low, high, start, "Partition start offset");
        plans.push(plan);
    }

    // queues must be split before the assignment, otherwise messages land on the main queue
    let mut queues = Vec::with_capacity(plans.len());
    let mut assignment = TopicPartitionList::new();
    for plan in plans {
        let queue = consumer
            .split_partition_queue(topic, plan.partition)
            .ok_or_else(|| {
                KafkaError::Subscription(format!(
                    "cannot split queue of {topic} partition {}",
                    plan.partition
                ))
            })?;
        assignment.add_partition_offset(topic, plan.partition, Offset::Offset(plan.start))?;
        queues.push((plan, queue));
    }
    consumer.assign(&assignment)?;

    let poller = AbortOnDrop(tokio::spawn(poll_main_queue(
        Arc::clone(&consumer),
        on_error,
    )));

    let partitions = queues
        .into_iter()
        .map(|(plan, queue)| {
            (
                plan.partition,
                partition_messages(cancel.clone(), plan, partition_records(queue)),
            )
        })
        .collect();

    Ok(TopicReader { partitions, poller })
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), ConsumeError> {
    if cancel.is_cancelled() {
        Err(ConsumeError::Cancelled)
    } else {
        Ok(())
    }
}

async fn fetch_partitions(
    consumer: &Arc<ExplorerConsumer>,
    topic: &str,
) -> Result<Vec<i32>, ConsumeError> {
    let consumer = Arc::clone(consumer);
    let name = topic.to_owned();
    let partitions = tokio::task::spawn_blocking(move || {
        let metadata = consumer.fetch_metadata(Some(name.as_str()), METADATA_TIMEOUT)?;
        Ok::<_, KafkaError>(
            metadata
                .topics()
                .iter()
                .find(|t| t.name() == name && t.error().is_none())
                .map(|t| t.partitions().iter().map(|p| p.id()).collect::<Vec<_>>()),
        )
    })
    .await??;

    match partitions {
        Some(partitions) if !partitions.is_empty() => Ok(partitions),
        _ => Err(ConsumeError::TopicNotFound(topic.to_owned())),
    }
}

async fn fetch_watermarks(
    consumer: &Arc<ExplorerConsumer>,
    topic: &str,
    partition: i32,
) -> Result<(i64, i64), ConsumeError> {
    let consumer = Arc::clone(consumer);
    let topic = topic.to_owned();
    Ok(tokio::task::spawn_blocking(move || {
        consumer.fetch_watermarks(&topic, partition, METADATA_TIMEOUT)
    })
    .await??)
}

fn partition_records(queue: StreamPartitionQueue<ExplorerContext>) -> RecordStream {
    stream::unfold(queue, |queue| async move {
        let record = match queue.recv().await {
            Ok(message) => Ok(PartitionEvent::Record(raw_record(&message))),
            Err(KafkaError::PartitionEOF(_)) => Ok(PartitionEvent::EndOfPartition),
            Err(err) => Err(ConsumeError::from(err)),
        };
        Some((record, queue))
    })
    .boxed()
}

fn raw_record(message: &BorrowedMessage<'_>) -> RawRecord {
    RawRecord {
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        payload: message.payload().map(<[u8]>::to_vec),
        headers: message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|h| (h.key.to_owned(), h.value.map(<[u8]>::to_vec)))
                    .collect()
            })
            .unwrap_or_default(),
        timestamp: message.timestamp().to_millis(),
    }
}

/// The main queue has to be polled for callbacks to be served. Messages are only expected on
/// the partition queues.
async fn poll_main_queue(consumer: Arc<ExplorerConsumer>, on_error: Option<ErrorHandler>) {
    loop {
        let err = match consumer.recv().await {
            Ok(message) => ConsumeError::UnexpectedMainQueueMessage(message.partition()),
            Err(KafkaError::PartitionEOF(_)) => continue,
            Err(err) => ConsumeError::Kafka(err),
        };
        match &on_error {
            Some(on_error) => on_error(err),
            None => warn!(%err, "Consumer error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use googletest::prelude::*;
    use std::result::Result;
    use test_log::test;

    use kafscope_types::{Message, OffsetStrategy};

    use crate::consume::merge;
    use crate::test_cluster::{READ_TIMEOUT, TestCluster};

    const TOPIC: &str = "orders";

    /// Two partitions holding 5 and 3 records.
    async fn cluster() -> TestCluster {
        let cluster = TestCluster::new();
        cluster.create_topic(TOPIC, 2);
        cluster.produce(TOPIC, 0, 5).await;
        cluster.produce(TOPIC, 1, 3).await;
        cluster
    }

    async fn read_to_end(
        cluster: &TestCluster,
        topic: &str,
        flags: ConsumeFlags,
    ) -> Result<BTreeMap<i32, Vec<Message>>, ConsumeError> {
        let flags = ConsumeFlags {
            follow: false,
            ..flags
        };
        let cancel = CancellationToken::new();
        let reader = open_topic(&cluster.transport(), &cancel, topic, &flags, None).await?;
        let messages: Vec<Message> = tokio::time::timeout(
            READ_TIMEOUT,
            merge(reader.partitions, Some(reader.poller))
                .map(|m| m.unwrap())
                .collect(),
        )
        .await
        .expect("bounded read must end");

        let mut by_partition: BTreeMap<i32, Vec<Message>> = BTreeMap::new();
        for message in messages {
            by_partition.entry(message.partition).or_default().push(message);
        }
        Ok(by_partition)
    }

    fn offsets(messages: &BTreeMap<i32, Vec<Message>>) -> BTreeMap<i32, Vec<i64>> {
        messages
            .iter()
            .map(|(p, messages)| (*p, messages.iter().map(|m| m.offset).collect()))
            .collect()
    }

    #[test(tokio::test)]
    async fn reads_all_partitions_from_earliest() -> anyhow::Result<()> {
        let cluster = cluster().await;
        let messages = read_to_end(&cluster, TOPIC, ConsumeFlags::default()).await?;

        assert_that!(
            offsets(&messages),
            eq(BTreeMap::from([(0, vec![0, 1, 2, 3, 4]), (1, vec![0, 1, 2])]))
        );
        let first = &messages[&0][0];
        assert_that!(first.key, eq("key-0"));
        assert_that!(first.value, eq("value-0"));
        assert_that!(first.value_schema_id, none());
        Ok(())
    }

    #[test(tokio::test)]
    async fn tail_reads_the_last_records_of_each_partition() -> anyhow::Result<()> {
        let cluster = cluster().await;
        let flags = ConsumeFlags {
            tail: Some(2),
            ..Default::default()
        };
        let messages = read_to_end(&cluster, TOPIC, flags).await?;

        assert_that!(
            offsets(&messages),
            eq(BTreeMap::from([(0, vec![3, 4]), (1, vec![1, 2])]))
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn latest_without_follow_reads_nothing() -> anyhow::Result<()> {
        let cluster = cluster().await;
        let flags = ConsumeFlags {
            offset: OffsetStrategy::Latest,
            ..Default::default()
        };
        let messages = read_to_end(&cluster, TOPIC, flags).await?;

        assert!(messages.is_empty(), "{messages:?}");
        Ok(())
    }

    #[test(tokio::test)]
    async fn explicit_offsets_default_to_earliest() -> anyhow::Result<()> {
        let cluster = cluster().await;
        let flags = ConsumeFlags {
            offset: OffsetStrategy::Explicit(BTreeMap::from([(0, 3)])),
            ..Default::default()
        };
        let messages = read_to_end(&cluster, TOPIC, flags).await?;

        assert_that!(
            offsets(&messages),
            eq(BTreeMap::from([(0, vec![3, 4]), (1, vec![0, 1, 2])]))
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn unknown_topic_is_not_found() {
        let cluster = cluster().await;
        let result = read_to_end(&cluster, "does-not-exist", ConsumeFlags::default()).await;

        assert!(
            matches!(&result, Err(ConsumeError::TopicNotFound(topic)) if topic == "does-not-exist"),
            "{result:?}"
        );
    }

    #[test(tokio::test)]
    async fn following_continues_past_the_end_of_the_partition() -> anyhow::Result<()> {
        let cluster = TestCluster::new();
        cluster.create_topic(TOPIC, 1);
        cluster.produce(TOPIC, 0, 2).await;

        let cancel = CancellationToken::new();
        let reader = open_topic(
            &cluster.transport(),
            &cancel,
            TOPIC,
            &ConsumeFlags::default(),
            None,
        )
        .await?;
        let mut stream = merge(reader.partitions, Some(reader.poller));

        let mut offsets = Vec::new();
        for _ in 0..2 {
            let message = tokio::time::timeout(READ_TIMEOUT, stream.next()).await?;
            offsets.push(message.unwrap()?.offset);
        }
        // the partition end was reached, more records keep coming
        cluster.produce(TOPIC, 0, 1).await;
        let message = tokio::time::timeout(READ_TIMEOUT, stream.next()).await?;
        offsets.push(message.unwrap()?.offset);
        assert_that!(offsets, elements_are![eq(0), eq(1), eq(2)]);

        cancel.cancel();
        assert!(stream.next().await.is_none());
        Ok(())
    }
}
