// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::PathBuf;

use rdkafka::error::KafkaError;

use kafscope_auth::TokenError;
use kafscope_schema_registry::RegistryError;
use kafscope_types::config::SaslMechanism;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cluster '{0}' has no brokers configured")]
    NoBrokers(String),
    #[error("cannot read TLS file {path}: {source}")]
    TlsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{mechanism} on cluster '{cluster}' requires a username and a password")]
    MissingCredentials {
        cluster: String,
        mechanism: SaslMechanism,
    },
    #[error("cannot set up OAUTHBEARER for cluster '{cluster}': {source}")]
    OAuth {
        cluster: String,
        #[source]
        source: TokenError,
    },
    #[error("cannot create kafka client: {0}")]
    Client(#[from] KafkaError),
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Kafka(#[from] KafkaError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("admin task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Other(String),
    #[error("admin request to brokers {brokers} failed: {source}")]
    Cluster {
        brokers: String,
        #[source]
        source: Box<AdminError>,
    },
}

impl AdminError {
    pub(crate) fn with_brokers(self, brokers: &str) -> Self {
        match self {
            already @ AdminError::Cluster { .. } => already,
            other => AdminError::Cluster {
                brokers: brokers.to_owned(),
                source: Box::new(other),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("consumption was cancelled")]
    Cancelled,
    #[error("topic '{0}' not found")]
    TopicNotFound(String),
    #[error("data source is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Kafka(#[from] KafkaError),
    #[error("error handling message partition {partition} offset {offset}: {source}")]
    Handler {
        partition: i32,
        offset: i64,
        #[source]
        source: anyhow::Error,
    },
    #[error("message handler panicked at partition {partition} offset {offset}: {message}")]
    HandlerPanicked {
        partition: i32,
        offset: i64,
        message: String,
    },
    #[error("received a message on the main queue for partition {0} despite partitioned queues")]
    UnexpectedMainQueueMessage(i32),
    #[error("partition task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("data source is not initialized")]
    NotInitialized,
    #[error("cluster '{0}' not found")]
    ClusterNotFound(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Admin(#[from] AdminError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
