// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod cluster;
mod version;

pub use cluster::*;
pub use version::*;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Name of the cluster used when no usable configuration could be loaded.
pub const DEFAULT_CLUSTER_NAME: &str = "localhost";
/// Broker address of the fallback cluster.
pub const DEFAULT_BROKER: &str = "localhost:9092";

/// # Explorer configuration file
///
/// The on-disk configuration listing the known clusters. The layout is compatible with the
/// `kaf` configuration file, so an existing `~/.kaf/config` can be used as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExplorerConfig {
    /// # Current cluster
    ///
    /// Name of the cluster selected when the explorer starts.
    pub current_cluster: String,

    /// # Cluster override
    ///
    /// When set, takes precedence over `current-cluster`.
    #[serde(rename = "clusteroverride", skip_serializing_if = "Option::is_none")]
    pub cluster_override: Option<String>,

    /// # Clusters
    pub clusters: Vec<ClusterConfig>,

    /// # Logging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogOptions>,
}

impl ExplorerConfig {
    /// Configuration pointing at a single broker on `localhost`.
    pub fn fallback() -> Self {
        Self {
            current_cluster: DEFAULT_CLUSTER_NAME.to_owned(),
            cluster_override: None,
            clusters: vec![ClusterConfig::new(
                DEFAULT_CLUSTER_NAME,
                vec![DEFAULT_BROKER.to_owned()],
            )],
            log: None,
        }
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|c| c.name == name)
    }

    pub fn cluster_names(&self) -> Vec<String> {
        self.clusters.iter().map(|c| c.name.clone()).collect()
    }

    /// Resolves the cluster to activate on startup: the override if it names a known
    /// cluster, then `current-cluster`, then the first configured cluster.
    pub fn initial_cluster(&self) -> Option<&ClusterConfig> {
        self.cluster_override
            .as_deref()
            .filter(|name| !name.is_empty())
            .and_then(|name| self.cluster(name))
            .or_else(|| self.cluster(&self.current_cluster))
            .or_else(|| self.clusters.first())
    }

    pub fn log_options(&self) -> LogOptions {
        self.log.clone().unwrap_or_default()
    }
}

/// # Logging options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LogOptions {
    /// # Logging Filter
    ///
    /// Log filter configuration. Can be overridden by the `RUST_LOG` environment variable.
    pub filter: String,

    /// # Logging format
    pub format: LogFormat,

    /// # Log file
    ///
    /// Write logs to this file instead of stderr. The dashboard owns the terminal, so
    /// interactive sessions should always set this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            filter: "warn,kafscope=info".to_owned(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// # Log format
#[derive(Debug, Clone, Copy, Hash, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// # Pretty
    ///
    /// Enables verbose logging.
    #[default]
    Pretty,
    /// # Compact
    Compact,
    /// # Json
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(names: &[&str]) -> ExplorerConfig {
        ExplorerConfig {
            current_cluster: String::new(),
            cluster_override: None,
            clusters: names
                .iter()
                .map(|n| ClusterConfig::new(*n, vec![format!("{n}:9092")]))
                .collect(),
            log: None,
        }
    }

    #[test]
    fn initial_cluster_prefers_override() {
        let mut config = config_with(&["dev", "test", "prod"]);
        config.current_cluster = "test".to_owned();
        assert_eq!(config.initial_cluster().unwrap().name, "test");

        config.cluster_override = Some("prod".to_owned());
        assert_eq!(config.initial_cluster().unwrap().name, "prod");

        // unknown override falls through to current-cluster
        config.cluster_override = Some("nope".to_owned());
        assert_eq!(config.initial_cluster().unwrap().name, "test");
    }

    #[test]
    fn initial_cluster_defaults_to_first() {
        let config = config_with(&["dev", "test"]);
        assert_eq!(config.initial_cluster().unwrap().name, "dev");
        assert!(config_with(&[]).initial_cluster().is_none());
    }

    #[test]
    fn fallback_points_to_localhost() {
        let config = ExplorerConfig::fallback();
        let cluster = config.initial_cluster().unwrap();
        assert_eq!(cluster.name, DEFAULT_CLUSTER_NAME);
        assert_eq!(cluster.brokers, vec![DEFAULT_BROKER.to_owned()]);
    }
}
