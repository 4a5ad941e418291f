// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Partition streams and the delivery loop shared by all data sources.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use kafscope_schema_registry::{WIRE_HEADER_LEN, schema_id};
use kafscope_types::{Message, MessageHeader};

use crate::error::ConsumeError;

/// Called inline for every delivered message. An `Err` is reported to the [`ErrorHandler`].
pub type MessageHandler = Arc<dyn Fn(Message) -> anyhow::Result<()> + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(ConsumeError) + Send + Sync>;

/// Lazy sequence of messages of a topic. Not restartable.
pub type MessageStream = BoxStream<'static, Result<Message, ConsumeError>>;
pub(crate) type RecordStream = BoxStream<'static, Result<PartitionEvent, ConsumeError>>;

/// What reading a partition yields.
#[derive(Debug)]
pub(crate) enum PartitionEvent {
    Record(RawRecord),
    /// Nothing more is readable for now. Transaction markers and records above the last
    /// stable offset can keep a partition from ever delivering its high watermark - 1.
    EndOfPartition,
}

/// A record as read from a partition, before rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    pub headers: Vec<(String, Option<Vec<u8>>)>,
    pub timestamp: Option<i64>,
}

/// Renders a record into a [`Message`].
///
/// Key and value are decoded as lossy UTF-8. A key or value in the Confluent wire format sets
/// the corresponding schema id, and the wire header is not part of the rendered text.
pub fn decode(record: RawRecord) -> Message {
    let (key, key_schema_id) = render_payload(record.key.as_deref());
    let (value, value_schema_id) = render_payload(record.payload.as_deref());

    Message {
        key,
        value,
        partition: record.partition,
        offset: record.offset,
        headers: record
            .headers
            .into_iter()
            .map(|(key, value)| {
                MessageHeader::new(
                    key,
                    value
                        .map(|v| String::from_utf8_lossy(&v).into_owned())
                        .unwrap_or_default(),
                )
            })
            .collect(),
        timestamp: record.timestamp,
        key_schema_id,
        value_schema_id,
    }
}

fn render_payload(payload: Option<&[u8]>) -> (String, Option<u32>) {
    let Some(payload) = payload else {
        return (String::new(), None);
    };
    match schema_id(payload) {
        Some(id) => (
            String::from_utf8_lossy(&payload[WIRE_HEADER_LEN..]).into_owned(),
            Some(id),
        ),
        None => (String::from_utf8_lossy(payload).into_owned(), None),
    }
}

/// Where reading a partition starts and, when not following, where it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub partition: i32,
    pub start: i64,
    /// Exclusive upper bound, the high watermark captured at start.
    pub end: Option<i64>,
}

impl PartitionPlan {
    pub fn new(partition: i32, start: i64, end: Option<i64>) -> Self {
        Self {
            partition,
            start,
            end,
        }
    }

    /// True when there is nothing to read before `end`.
    pub fn is_drained(&self) -> bool {
        self.end.is_some_and(|end| self.start >= end)
    }
}

struct PartitionState {
    cancel: CancellationToken,
    plan: PartitionPlan,
    records: RecordStream,
    done: bool,
}

/// Turns the records of one partition into messages.
///
/// The stream ends once cancellation is observed, before or after waiting for the next
/// record. With an end offset it also ends when that offset is reached or the partition
/// reports that nothing more is readable. Read errors are passed through.
pub(crate) fn partition_messages(
    cancel: CancellationToken,
    plan: PartitionPlan,
    records: RecordStream,
) -> MessageStream {
    let state = PartitionState {
        done: plan.is_drained(),
        cancel,
        plan,
        records,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done || state.cancel.is_cancelled() {
                return None;
            }

            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => None,
                next = state.records.next() => next,
            };
            if state.cancel.is_cancelled() {
                return None;
            }

            match next? {
                Ok(PartitionEvent::Record(record)) => {
                    if let Some(end) = state.plan.end {
                        if record.offset >= end {
                            return None;
                        }
                        state.done = record.offset + 1 >= end;
                    }
                    return Some((Ok(decode(record)), state));
                }
                Ok(PartitionEvent::EndOfPartition) if state.plan.end.is_some() => {
                    debug!(partition = state.plan.partition, "Reached end of partition");
                    return None;
                }
                // following: wait for more
                Ok(PartitionEvent::EndOfPartition) => {}
                Err(err) => return Some((Err(err), state)),
            }
        }
    })
    .boxed()
}

#[derive(Clone)]
pub(crate) struct Handlers {
    pub on_message: MessageHandler,
    pub on_error: ErrorHandler,
}

/// Delivers the messages of one partition, one at a time and in offset order.
async fn drive_partition(
    cancel: CancellationToken,
    partition: i32,
    mut messages: MessageStream,
    handlers: Handlers,
) -> Result<(), ConsumeError> {
    debug!(partition, "Starting partition delivery");
    while let Some(next) = messages.next().await {
        if cancel.is_cancelled() {
            break;
        }
        match next {
            Ok(message) => deliver(&cancel, &handlers, message),
            Err(err) => (handlers.on_error)(err),
        }
    }

    if cancel.is_cancelled() {
        trace!(partition, "Partition delivery cancelled");
        Err(ConsumeError::Cancelled)
    } else {
        debug!(partition, "Partition drained");
        Ok(())
    }
}

fn deliver(cancel: &CancellationToken, handlers: &Handlers, message: Message) {
    let (partition, offset) = (message.partition, message.offset);
    match catch_unwind(AssertUnwindSafe(|| (handlers.on_message)(message))) {
        Ok(Ok(())) => {}
        Ok(Err(source)) => (handlers.on_error)(ConsumeError::Handler {
            partition,
            offset,
            source,
        }),
        // the handler may panic because it is being torn down
        Err(_) if cancel.is_cancelled() => {
            debug!(partition, offset, "Ignoring handler panic after cancellation");
        }
        Err(panic) => (handlers.on_error)(ConsumeError::HandlerPanicked {
            partition,
            offset,
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Runs one task per partition until all of them drain or the token is cancelled.
pub(crate) async fn run_partitions(
    cancel: CancellationToken,
    partitions: Vec<(i32, MessageStream)>,
    handlers: Handlers,
) -> Result<(), ConsumeError> {
    let mut tasks = JoinSet::new();
    for (partition, messages) in partitions {
        tasks.spawn(drive_partition(
            cancel.clone(),
            partition,
            messages,
            handlers.clone(),
        ));
    }

    let mut cancelled = false;
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(ConsumeError::Cancelled)) => cancelled = true,
            Ok(Err(err)) => (handlers.on_error)(err),
            Err(err) => {
                warn!(%err, "Partition task failed");
                (handlers.on_error)(err.into());
            }
        }
    }

    if cancelled || cancel.is_cancelled() {
        Err(ConsumeError::Cancelled)
    } else {
        Ok(())
    }
}

/// Aborts the wrapped task when dropped.
pub(crate) struct AbortOnDrop(pub JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Keeps background work alive for as long as the stream is in use.
pub(crate) struct GuardedStream {
    inner: MessageStream,
    _guard: Option<AbortOnDrop>,
}

impl GuardedStream {
    pub fn new(inner: MessageStream, guard: Option<AbortOnDrop>) -> Self {
        Self {
            inner,
            _guard: guard,
        }
    }
}

impl Stream for GuardedStream {
    type Item = Result<Message, ConsumeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Merges the partition streams into one stream, in arrival order.
pub(crate) fn merge(
    partitions: Vec<(i32, MessageStream)>,
    guard: Option<AbortOnDrop>,
) -> MessageStream {
    let merged = stream::select_all(partitions.into_iter().map(|(_, messages)| messages));
    GuardedStream::new(merged.boxed(), guard).boxed()
}
