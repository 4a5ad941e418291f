// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, OwnedResourceSpecifier, ResourceSpecifier};
use rdkafka::consumer::{BaseConsumer, Consumer};
use tracing::{debug, warn};

use kafscope_types::topic::UNKNOWN_MESSAGE_COUNT;
use kafscope_types::{ConsumerGroup, Topic};

use crate::error::AdminError;
use crate::transport::{ExplorerContext, TransportConfig};

const ADMIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Reported for groups the coordinator no longer knows.
const DEAD_GROUP_STATE: &str = "Dead";

/// Administrative calls against a cluster.
#[async_trait::async_trait]
pub trait ClusterAdmin: Send + Sync + 'static {
    async fn list_topics(&self) -> Result<HashMap<String, Topic>, AdminError>;

    async fn list_consumer_group_names(&self) -> Result<Vec<String>, AdminError>;

    /// Describes the named groups. The result may come in any order.
    async fn describe_consumer_groups(
        &self,
        names: &[String],
    ) -> Result<Vec<ConsumerGroup>, AdminError>;

    /// Releases the connections of this admin. Calls after closing fail.
    async fn close(&self);
}

/// Creates a [`ClusterAdmin`] for a cluster.
pub trait AdminFactory: Send + Sync + 'static {
    fn create(&self, transport: &TransportConfig) -> Result<Box<dyn ClusterAdmin>, AdminError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RdKafkaAdminFactory;

impl AdminFactory for RdKafkaAdminFactory {
    fn create(&self, transport: &TransportConfig) -> Result<Box<dyn ClusterAdmin>, AdminError> {
        Ok(Box::new(KafkaAdmin::new(transport)?))
    }
}

/// [`ClusterAdmin`] on top of librdkafka: metadata and group listings through a consumer
/// handle, topic configs through the admin API.
pub struct KafkaAdmin {
    cluster: String,
    clients: parking_lot::RwLock<Option<Clients>>,
}

#[derive(Clone)]
struct Clients {
    consumer: Arc<BaseConsumer<ExplorerContext>>,
    admin: Arc<AdminClient<ExplorerContext>>,
}

impl KafkaAdmin {
    pub fn new(transport: &TransportConfig) -> Result<Self, AdminError> {
        let consumer = transport.create::<BaseConsumer<ExplorerContext>>()?;
        let admin = transport.create::<AdminClient<ExplorerContext>>()?;
        debug!(
            cluster = transport.cluster(),
            brokers = transport.brokers(),
            "Created admin clients"
        );

        Ok(Self {
            cluster: transport.cluster().to_owned(),
            clients: parking_lot::RwLock::new(Some(Clients {
                consumer: Arc::new(consumer),
                admin: Arc::new(admin),
            })),
        })
    }

    fn clients(&self) -> Result<Clients, AdminError> {
        self.clients
            .read()
            .clone()
            .ok_or_else(|| AdminError::Other(format!("admin of '{}' is closed", self.cluster)))
    }

    async fn topic_configs(
        &self,
        admin: &AdminClient<ExplorerContext>,
        names: &[String],
    ) -> HashMap<String, BTreeMap<String, Option<String>>> {
        if names.is_empty() {
            return HashMap::new();
        }
        let resources: Vec<_> = names
            .iter()
            .map(|name| ResourceSpecifier::Topic(name.as_str()))
            .collect();
        let options = AdminOptions::new().request_timeout(Some(ADMIN_TIMEOUT));

        let results = match admin.describe_configs(&resources, &options).await {
            Ok(results) => results,
            Err(err) => {
                warn!(cluster = %self.cluster, %err, "Cannot describe topic configs");
                return HashMap::new();
            }
        };

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(resource) => match resource.specifier {
                    OwnedResourceSpecifier::Topic(name) => Some((
                        name,
                        resource
                            .entries
                            .into_iter()
                            .map(|entry| (entry.name, entry.value))
                            .collect(),
                    )),
                    _ => None,
                },
                Err(code) => {
                    debug!(cluster = %self.cluster, %code, "Topic config not available");
                    None
                }
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ClusterAdmin for KafkaAdmin {
    async fn list_topics(&self) -> Result<HashMap<String, Topic>, AdminError> {
        let clients = self.clients()?;

        let consumer = Arc::clone(&clients.consumer);
        let listed = tokio::task::spawn_blocking(move || {
            let metadata = consumer.fetch_metadata(None, ADMIN_TIMEOUT)?;
            let topics: Vec<_> = metadata
                .topics()
                .iter()
                .filter(|topic| topic.error().is_none())
                .map(|topic| {
                    let assignment: BTreeMap<i32, Vec<i32>> = topic
                        .partitions()
                        .iter()
                        .map(|p| (p.id(), p.replicas().to_vec()))
                        .collect();
                    // any partition without watermarks makes the count unknown
                    let message_count = assignment
                        .keys()
                        .map(|partition| {
                            consumer
                                .fetch_watermarks(topic.name(), *partition, ADMIN_TIMEOUT)
                                .map(|(low, high)| high - low)
                        })
                        .sum::<Result<i64, _>>()
                        .unwrap_or(UNKNOWN_MESSAGE_COUNT);
                    Topic::new(topic.name(), assignment).with_message_count(message_count)
                })
                .collect();
            Ok::<_, AdminError>(topics)
        })
        .await??;

        let names: Vec<String> = listed.iter().map(|t| t.name.clone()).collect();
        let mut configs = self.topic_configs(&clients.admin, &names).await;

        Ok(listed
            .into_iter()
            .map(|topic| {
                let entries = configs.remove(&topic.name).unwrap_or_default();
                (topic.name.clone(), topic.with_config_entries(entries))
            })
            .collect())
    }

    async fn list_consumer_group_names(&self) -> Result<Vec<String>, AdminError> {
        let consumer = self.clients()?.consumer;
        let names = tokio::task::spawn_blocking(move || {
            let groups = consumer.fetch_group_list(None, ADMIN_TIMEOUT)?;
            Ok::<_, AdminError>(
                groups
                    .groups()
                    .iter()
                    .map(|g| g.name().to_owned())
                    .collect::<Vec<_>>(),
            )
        })
        .await??;
        Ok(names)
    }

    async fn describe_consumer_groups(
        &self,
        names: &[String],
    ) -> Result<Vec<ConsumerGroup>, AdminError> {
        let consumer = self.clients()?.consumer;
        let names = names.to_vec();
        let groups = tokio::task::spawn_blocking(move || {
            names
                .into_iter()
                .map(|name| {
                    let list = consumer.fetch_group_list(Some(name.as_str()), ADMIN_TIMEOUT)?;
                    let group = match list.groups().iter().find(|g| g.name() == name) {
                        Some(group) => {
                            let mut described =
                                ConsumerGroup::new(&name, group.state(), group.members().len());
                            described.protocol_type = group.protocol_type().to_owned();
                            described
                        }
                        None => ConsumerGroup::new(&name, DEAD_GROUP_STATE, 0),
                    };
                    Ok::<_, AdminError>(group)
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .await??;
        Ok(groups)
    }

    async fn close(&self) {
        if self.clients.write().take().is_some() {
            debug!(cluster = %self.cluster, "Closed admin clients");
        }
    }
}

/// Metadata calls against the active cluster. Failures carry the broker list.
pub struct AdminGateway {
    admin: Box<dyn ClusterAdmin>,
    brokers: String,
}

impl AdminGateway {
    pub fn new(admin: Box<dyn ClusterAdmin>, brokers: impl Into<String>) -> Self {
        Self {
            admin,
            brokers: brokers.into(),
        }
    }

    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    pub async fn list_topics(&self) -> Result<HashMap<String, Topic>, AdminError> {
        self.admin
            .list_topics()
            .await
            .map_err(|err| err.with_brokers(&self.brokers))
    }

    /// Lists all groups sorted by name.
    pub async fn list_consumer_groups(&self) -> Result<Vec<ConsumerGroup>, AdminError> {
        let mut names = self
            .admin
            .list_consumer_group_names()
            .await
            .map_err(|err| err.with_brokers(&self.brokers))?;
        names.sort();
        names.dedup();

        let mut groups = self
            .admin
            .describe_consumer_groups(&names)
            .await
            .map_err(|err| err.with_brokers(&self.brokers))?;
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    pub async fn close(&self) {
        self.admin.close().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};

    use googletest::prelude::*;
    use std::result::Result;
    use parking_lot::Mutex;
    use rdkafka::error::KafkaError;
    use rdkafka::types::RDKafkaErrorCode;
    use test_log::test;

    /// Serves a fixed catalog and records the names it was asked to describe.
    #[derive(Default)]
    pub(crate) struct CannedAdmin {
        pub topics: Vec<Topic>,
        pub groups: Vec<ConsumerGroup>,
        pub fail: bool,
        pub described: Arc<Mutex<Vec<String>>>,
        pub closed: Arc<AtomicBool>,
    }

    impl CannedAdmin {
        fn check(&self) -> Result<(), AdminError> {
            if self.fail {
                let err = KafkaError::MetadataFetch(RDKafkaErrorCode::BrokerTransportFailure);
                return Err(err.into());
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl ClusterAdmin for CannedAdmin {
        async fn list_topics(&self) -> Result<HashMap<String, Topic>, AdminError> {
            self.check()?;
            Ok(self
                .topics
                .iter()
                .map(|t| (t.name.clone(), t.clone()))
                .collect())
        }

        async fn list_consumer_group_names(&self) -> Result<Vec<String>, AdminError> {
            self.check()?;
            Ok(self.groups.iter().map(|g| g.name.clone()).collect())
        }

        async fn describe_consumer_groups(
            &self,
            names: &[String],
        ) -> Result<Vec<ConsumerGroup>, AdminError> {
            self.described.lock().extend(names.iter().cloned());
            // reversed, to make sure callers do not rely on the order
            Ok(names
                .iter()
                .rev()
                .filter_map(|name| self.groups.iter().find(|g| &g.name == name).cloned())
                .collect())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn groups(names: &[&str]) -> Vec<ConsumerGroup> {
        names
            .iter()
            .map(|name| ConsumerGroup::new(*name, "Stable", 1))
            .collect()
    }

    #[test(tokio::test)]
    async fn consumer_groups_are_sorted_by_name() -> anyhow::Result<()> {
        let admin = CannedAdmin {
            groups: groups(&["payments", "Zeta", "audit", "orders", "alpha"]),
            ..Default::default()
        };
        let described = Arc::clone(&admin.described);
        let gateway = AdminGateway::new(Box::new(admin), "b1:9092");

        let names: Vec<_> = gateway
            .list_consumer_groups()
            .await?
            .into_iter()
            .map(|g| g.name)
            .collect();

        // byte order puts upper case first
        let expected = ["Zeta", "alpha", "audit", "orders", "payments"].map(str::to_owned);
        assert_that!(names, eq(expected.to_vec()));
        assert_that!(*described.lock(), eq(expected.to_vec()));
        Ok(())
    }

    #[test(tokio::test)]
    async fn errors_carry_the_broker_list() {
        let admin = CannedAdmin {
            fail: true,
            ..Default::default()
        };
        let gateway = AdminGateway::new(Box::new(admin), "b1:9092,b2:9092");

        let err = gateway.list_topics().await.unwrap_err();
        assert!(matches!(err, AdminError::Cluster { .. }));
        assert_that!(err.to_string(), contains_substring("b1:9092,b2:9092"));

        let err = gateway.list_consumer_groups().await.unwrap_err();
        assert_that!(err.to_string(), contains_substring("b1:9092,b2:9092"));
    }

    #[test(tokio::test)]
    async fn topics_are_keyed_by_name() -> anyhow::Result<()> {
        let admin = CannedAdmin {
            topics: vec![
                Topic::new("orders", BTreeMap::from([(0, vec![1]), (1, vec![2])])),
                Topic::new("payments", BTreeMap::from([(0, vec![1, 2])])),
            ],
            ..Default::default()
        };
        let closed = Arc::clone(&admin.closed);
        let gateway = AdminGateway::new(Box::new(admin), "b1:9092");

        let topics = gateway.list_topics().await?;
        assert_that!(topics.len(), eq(2));
        assert_that!(topics["orders"].partition_count, eq(2));
        assert_that!(topics["payments"].replication_factor, eq(2));

        gateway.close().await;
        assert!(closed.load(Ordering::SeqCst));
        Ok(())
    }

    #[test(tokio::test)]
    async fn kafka_admin_counts_messages_from_watermarks() -> anyhow::Result<()> {
        let cluster = crate::test_cluster::TestCluster::new();
        cluster.create_topic("orders", 2);
        cluster.create_topic("payments", 1);
        cluster.produce("orders", 0, 4).await;
        cluster.produce("orders", 1, 2).await;
        let transport = cluster.transport();
        let admin = KafkaAdmin::new(&transport)?;

        let topics = admin.list_topics().await?;
        let orders = &topics["orders"];
        assert_that!(orders.partition_count, eq(2));
        assert_that!(orders.replication_factor, eq(1));
        assert_that!(orders.message_count, eq(6));
        assert_that!(topics["payments"].message_count, eq(0));

        admin.close().await;
        let err = admin.list_topics().await.unwrap_err();
        assert_that!(err.to_string(), contains_substring("closed"));
        Ok(())
    }
}
