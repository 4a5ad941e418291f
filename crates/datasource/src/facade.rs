// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kafscope_schema_registry::{SchemaCache, SchemaRegistryClient};
use kafscope_types::config::{ClusterConfig, ExplorerConfig};
use kafscope_types::config_loader::{ConfigLoader, ConfigSource};
use kafscope_types::{ConsumeFlags, ConsumerGroup, MessageSchemaInfo, SchemaId, Topic};

use crate::admin::{AdminFactory, AdminGateway, RdKafkaAdminFactory};
use crate::consume::{ErrorHandler, Handlers, MessageHandler, MessageStream, merge, run_partitions};
use crate::error::{ConsumeError, DataSourceError, TransportError};
use crate::kafka_consumer::{TopicReader, open_topic};
use crate::transport::{TransportConfig, TransportConfigBuilder};

/// Everything the explorer needs from a cluster.
///
/// Implementations hold their own configuration; switching the context only affects the
/// instance it is called on.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Loads the cluster configuration and activates the initial cluster.
    async fn init(&self, source: ConfigSource) -> Result<(), DataSourceError>;

    async fn topics(&self) -> Result<HashMap<String, Topic>, DataSourceError>;

    /// Names of the configured clusters.
    fn contexts(&self) -> Vec<String>;

    /// Name of the active cluster.
    fn context(&self) -> String;

    /// Activates the named cluster. An unknown name leaves the active cluster unchanged.
    async fn set_context(&self, name: &str) -> Result<(), DataSourceError>;

    /// Consumer groups sorted by name.
    async fn consumer_groups(&self) -> Result<Vec<ConsumerGroup>, DataSourceError>;

    /// Reads `topic` until all partitions drain (when not following) or `cancel` fires.
    ///
    /// Messages are handed to `on_message` inline, in offset order per partition. Handler
    /// failures and read errors go to `on_error` and do not stop consumption. Returns
    /// [`ConsumeError::Cancelled`] when cancelled.
    async fn consume_topic(
        &self,
        cancel: CancellationToken,
        topic: &str,
        flags: ConsumeFlags,
        on_message: MessageHandler,
        on_error: ErrorHandler,
    ) -> Result<(), ConsumeError>;

    /// Like [`DataSource::consume_topic`], as a stream. The stream ends when `cancel` fires.
    async fn stream_topic(
        &self,
        cancel: CancellationToken,
        topic: &str,
        flags: ConsumeFlags,
    ) -> Result<MessageStream, ConsumeError>;

    /// Resolves the schemas a message refers to. `None` when neither id resolves.
    async fn message_schema_info(
        &self,
        key_schema_id: Option<SchemaId>,
        value_schema_id: Option<SchemaId>,
    ) -> Result<Option<MessageSchemaInfo>, DataSourceError>;

    /// Releases the connections of the active cluster.
    async fn close(&self);
}

/// Clients of the active cluster, created on first use.
struct ActiveCluster {
    cluster: ClusterConfig,
    schemas: Option<SchemaCache>,
    transport: OnceCell<TransportConfig>,
    admin: OnceCell<AdminGateway>,
}

impl ActiveCluster {
    fn new(cluster: ClusterConfig) -> Result<Self, DataSourceError> {
        let schemas = match &cluster.schema_registry_url {
            Some(url) if !url.is_empty() => Some(SchemaCache::new(SchemaRegistryClient::new(
                url,
                cluster.schema_registry_credentials.clone(),
            )?)),
            _ => None,
        };

        Ok(Self {
            cluster,
            schemas,
            transport: OnceCell::new(),
            admin: OnceCell::new(),
        })
    }

    fn name(&self) -> &str {
        &self.cluster.name
    }

    async fn transport(&self) -> Result<&TransportConfig, TransportError> {
        self.transport
            .get_or_try_init(|| async { TransportConfigBuilder::new(&self.cluster).build() })
            .await
    }

    async fn admin(&self, factory: &dyn AdminFactory) -> Result<&AdminGateway, DataSourceError> {
        self.admin
            .get_or_try_init(|| async {
                let transport = self.transport().await?;
                let admin = factory.create(transport)?;
                Ok::<_, DataSourceError>(AdminGateway::new(admin, transport.brokers()))
            })
            .await
    }

    async fn close(&self) {
        if let Some(admin) = self.admin.get() {
            admin.close().await;
        }
    }
}

struct State {
    config: ExplorerConfig,
    active: Arc<ActiveCluster>,
}

/// [`DataSource`] talking to real Kafka clusters.
pub struct KafkaDataSource {
    admin_factory: Arc<dyn AdminFactory>,
    config_loader: ConfigLoader,
    state: RwLock<Option<State>>,
}

impl Default for KafkaDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl KafkaDataSource {
    pub fn new() -> Self {
        Self::with_admin_factory(Arc::new(RdKafkaAdminFactory))
    }

    pub fn with_admin_factory(admin_factory: Arc<dyn AdminFactory>) -> Self {
        Self {
            admin_factory,
            config_loader: ConfigLoader::default(),
            state: RwLock::new(None),
        }
    }

    pub fn with_config_loader(mut self, config_loader: ConfigLoader) -> Self {
        self.config_loader = config_loader;
        self
    }

    fn active(&self) -> Result<Arc<ActiveCluster>, DataSourceError> {
        self.state
            .read()
            .as_ref()
            .map(|state| Arc::clone(&state.active))
            .ok_or(DataSourceError::NotInitialized)
    }

    async fn open(
        &self,
        cancel: &CancellationToken,
        topic: &str,
        flags: &ConsumeFlags,
        on_error: Option<ErrorHandler>,
    ) -> Result<TopicReader, ConsumeError> {
        let active = self.active().map_err(|_| ConsumeError::NotInitialized)?;
        let transport = active.transport().await?;
        info!(
            cluster = active.name(),
            topic,
            follow = flags.follow,
            tail = ?flags.tail,
            offset = ?flags.offset,
            "Consuming topic"
        );
        open_topic(transport, cancel, topic, flags, on_error).await
    }
}

#[async_trait::async_trait]
impl DataSource for KafkaDataSource {
    async fn init(&self, source: ConfigSource) -> Result<(), DataSourceError> {
        let config = self.config_loader.load(&source);
        let cluster = config
            .initial_cluster()
            .cloned()
            .ok_or_else(|| DataSourceError::ClusterNotFound(config.current_cluster.clone()))?;
        info!(
            cluster = %cluster.name,
            brokers = %cluster.broker_list(),
            contexts = config.clusters.len(),
            "Initializing data source"
        );
        let active = Arc::new(ActiveCluster::new(cluster)?);

        let previous = self.state.write().replace(State { config, active });
        if let Some(previous) = previous {
            previous.active.close().await;
        }
        Ok(())
    }

    async fn topics(&self) -> Result<HashMap<String, Topic>, DataSourceError> {
        let active = self.active()?;
        let admin = active.admin(self.admin_factory.as_ref()).await?;
        Ok(admin.list_topics().await?)
    }

    fn contexts(&self) -> Vec<String> {
        self.state
            .read()
            .as_ref()
            .map(|state| state.config.cluster_names())
            .unwrap_or_default()
    }

    fn context(&self) -> String {
        self.state
            .read()
            .as_ref()
            .map(|state| state.active.name().to_owned())
            .unwrap_or_default()
    }

    async fn set_context(&self, name: &str) -> Result<(), DataSourceError> {
        let previous = {
            let mut guard = self.state.write();
            let state = guard.as_mut().ok_or(DataSourceError::NotInitialized)?;
            let Some(cluster) = state.config.cluster(name).cloned() else {
                warn!(context = name, "Unknown context, keeping {}", state.active.name());
                return Err(DataSourceError::ClusterNotFound(name.to_owned()));
            };

            let previous = if state.active.name() == name {
                None
            } else {
                let active = Arc::new(ActiveCluster::new(cluster)?);
                Some(std::mem::replace(&mut state.active, active))
            };
            // an explicit choice wins over the override from the configuration
            state.config.current_cluster = name.to_owned();
            state.config.cluster_override = None;
            previous
        };

        if let Some(previous) = previous {
            debug!(from = previous.name(), to = name, "Switched context");
            previous.close().await;
        }
        Ok(())
    }

    async fn consumer_groups(&self) -> Result<Vec<ConsumerGroup>, DataSourceError> {
        let active = self.active()?;
        let admin = active.admin(self.admin_factory.as_ref()).await?;
        Ok(admin.list_consumer_groups().await?)
    }

    async fn consume_topic(
        &self,
        cancel: CancellationToken,
        topic: &str,
        flags: ConsumeFlags,
        on_message: MessageHandler,
        on_error: ErrorHandler,
    ) -> Result<(), ConsumeError> {
        let TopicReader { partitions, poller } = self
            .open(&cancel, topic, &flags, Some(Arc::clone(&on_error)))
            .await?;

        let result = run_partitions(
            cancel,
            partitions,
            Handlers {
                on_message,
                on_error,
            },
        )
        .await;
        drop(poller);
        debug!(topic, ?result, "Stopped consuming topic");
        result
    }

    async fn stream_topic(
        &self,
        cancel: CancellationToken,
        topic: &str,
        flags: ConsumeFlags,
    ) -> Result<MessageStream, ConsumeError> {
        let TopicReader { partitions, poller } = self.open(&cancel, topic, &flags, None).await?;
        Ok(merge(partitions, Some(poller)))
    }

    async fn message_schema_info(
        &self,
        key_schema_id: Option<SchemaId>,
        value_schema_id: Option<SchemaId>,
    ) -> Result<Option<MessageSchemaInfo>, DataSourceError> {
        if key_schema_id.is_none() && value_schema_id.is_none() {
            return Ok(None);
        }
        let active = self.active()?;
        let Some(schemas) = &active.schemas else {
            debug!(cluster = active.name(), "No schema registry configured");
            return Ok(None);
        };
        Ok(schemas
            .message_schema_info(key_schema_id, value_schema_id)
            .await?)
    }

    async fn close(&self) {
        let state = self.state.write().take();
        if let Some(state) = state {
            debug!(cluster = state.active.name(), "Closing data source");
            state.active.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use googletest::prelude::*;
    use std::result::Result;
    use kafscope_types::test_util::sample_config;
    use test_log::test;

    use crate::admin::tests::CannedAdmin;
    use crate::admin::ClusterAdmin;
    use crate::error::AdminError;

    /// Hands out canned admins and remembers how they were used.
    #[derive(Default)]
    struct CannedAdminFactory {
        created: AtomicUsize,
        closed: Arc<AtomicBool>,
    }

    impl AdminFactory for CannedAdminFactory {
        fn create(&self, transport: &TransportConfig) -> Result<Box<dyn ClusterAdmin>, AdminError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            self.closed.store(false, Ordering::SeqCst);
            Ok(Box::new(CannedAdmin {
                groups: ["zulu", "alpha", transport.cluster()]
                    .into_iter()
                    .map(|name| ConsumerGroup::new(name, "Stable", 1))
                    .collect(),
                closed: Arc::clone(&self.closed),
                ..Default::default()
            }))
        }
    }

    async fn data_source() -> (KafkaDataSource, Arc<CannedAdminFactory>) {
        let factory = Arc::new(CannedAdminFactory::default());
        let source = KafkaDataSource::with_admin_factory(Arc::clone(&factory) as _);
        source
            .init(ConfigSource::Inline(sample_config()))
            .await
            .unwrap();
        (source, factory)
    }

    #[test(tokio::test)]
    async fn calls_before_init_fail() {
        let source = KafkaDataSource::new();
        assert!(matches!(
            source.topics().await,
            Err(DataSourceError::NotInitialized)
        ));
        assert!(matches!(
            source.set_context("kafka-dev").await,
            Err(DataSourceError::NotInitialized)
        ));
        assert_that!(source.context(), eq(""));
        assert!(source.contexts().is_empty());
    }

    #[test(tokio::test)]
    async fn unknown_context_changes_nothing() {
        let (source, _) = data_source().await;
        assert_that!(
            source.contexts(),
            elements_are![eq("kafka-dev"), eq("kafka-test"), eq("kafka-prod")]
        );
        assert_that!(source.context(), eq("kafka-dev"));

        source.set_context("kafka-test").await.unwrap();
        assert_that!(source.context(), eq("kafka-test"));

        let err = source.set_context("nope").await.unwrap_err();
        assert!(matches!(err, DataSourceError::ClusterNotFound(name) if name == "nope"));
        assert_that!(source.context(), eq("kafka-test"));
    }

    #[test(tokio::test)]
    async fn admin_is_reused_until_the_context_switches() -> anyhow::Result<()> {
        let (source, factory) = data_source().await;

        let groups: Vec<_> = source
            .consumer_groups()
            .await?
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_that!(groups, elements_are![eq("alpha"), eq("kafka-dev"), eq("zulu")]);
        source.topics().await?;
        assert_that!(factory.created.load(Ordering::SeqCst), eq(1));

        source.set_context("kafka-prod").await?;
        assert!(factory.closed.load(Ordering::SeqCst));
        let groups = source.consumer_groups().await?;
        assert!(groups.iter().any(|g| g.name == "kafka-prod"));
        assert_that!(factory.created.load(Ordering::SeqCst), eq(2));

        source.close().await;
        assert!(factory.closed.load(Ordering::SeqCst));
        assert!(matches!(
            source.topics().await,
            Err(DataSourceError::NotInitialized)
        ));
        Ok(())
    }

    #[test(tokio::test)]
    async fn override_is_cleared_by_an_explicit_choice() {
        let mut config = sample_config();
        config.cluster_override = Some("kafka-prod".to_owned());
        let source = KafkaDataSource::with_admin_factory(Arc::new(CannedAdminFactory::default()));
        source.init(ConfigSource::Inline(config)).await.unwrap();
        assert_that!(source.context(), eq("kafka-prod"));

        source.set_context("kafka-dev").await.unwrap();
        assert_that!(source.context(), eq("kafka-dev"));
        let state = source.state.read();
        assert_that!(state.as_ref().unwrap().config.cluster_override, none());
    }

    #[test(tokio::test)]
    async fn unreadable_config_falls_back_to_localhost() {
        let source = KafkaDataSource::with_admin_factory(Arc::new(CannedAdminFactory::default()))
            .with_config_loader(ConfigLoader::default().without_env());
        source
            .init(ConfigSource::File("/does/not/exist.yaml".into()))
            .await
            .unwrap();

        assert_that!(source.context(), eq("localhost"));
        assert_that!(source.contexts(), elements_are![eq("localhost")]);
    }

    #[test(tokio::test)]
    async fn no_registry_means_no_schema_info() -> anyhow::Result<()> {
        let (source, _) = data_source().await;
        assert_that!(source.message_schema_info(None, Some(2)).await?, none());
        assert_that!(source.message_schema_info(None, None).await?, none());
        Ok(())
    }

    #[test(tokio::test)]
    async fn bounded_consumption_against_a_cluster_returns_when_drained() -> anyhow::Result<()> {
        let cluster = crate::test_cluster::TestCluster::new();
        cluster.create_topic("orders", 2);
        cluster.produce("orders", 0, 3).await;
        cluster.produce("orders", 1, 2).await;

        let source = KafkaDataSource::new();
        source
            .init(ConfigSource::Inline(cluster.explorer_config()))
            .await?;
        assert_that!(source.topics().await?["orders"].message_count, eq(5));

        let delivered = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let on_message: MessageHandler = {
            let delivered = Arc::clone(&delivered);
            Arc::new(move |_: kafscope_types::Message| -> anyhow::Result<()> {
                delivered.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        let on_error: ErrorHandler = {
            let errors = Arc::clone(&errors);
            Arc::new(move |_: ConsumeError| {
                errors.fetch_add(1, Ordering::SeqCst);
            })
        };
        let flags = ConsumeFlags {
            follow: false,
            ..Default::default()
        };

        tokio::time::timeout(
            crate::test_cluster::READ_TIMEOUT,
            source.consume_topic(CancellationToken::new(), "orders", flags, on_message, on_error),
        )
        .await??;

        assert_that!(delivered.load(Ordering::SeqCst), eq(5));
        assert_that!(errors.load(Ordering::SeqCst), eq(0));
        source.close().await;
        Ok(())
    }
}
