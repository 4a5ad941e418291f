// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use tracing::{debug, warn};

use crate::config::ExplorerConfig;

/// Environment variable to override the config file location
pub const CONFIG_FILE_ENV: &str = "KAFSCOPE_CONFIG";
const ENV_PREFIX: &str = "KAFSCOPE_";

#[derive(thiserror::Error, Debug)]
pub enum ConfigLoadError {
    #[error("configuration loading error: {0}")]
    Figment(Box<figment::Error>),
    #[error("could not detect the home directory")]
    NoHomeDirectory,
}

// Because thiserror doesn't support auto-boxing or auto implements From with boxing.
impl From<figment::Error> for ConfigLoadError {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

/// Where a data source gets its cluster configuration from.
#[derive(Debug, Clone, Default)]
pub enum ConfigSource {
    /// `$KAFSCOPE_CONFIG`, or `~/.kaf/config`.
    #[default]
    Default,
    File(PathBuf),
    /// Already materialized configuration, used as is.
    Inline(ExplorerConfig),
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    load_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self { load_env: true }
    }
}

impl ConfigLoader {
    /// Do not merge `KAFSCOPE_*` environment overrides.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Loads the configuration, never failing: an unreadable or malformed file, as well as a
    /// file without clusters, results in the single `localhost` cluster.
    pub fn load(&self, source: &ConfigSource) -> ExplorerConfig {
        let loaded = match source {
            ConfigSource::Inline(config) => Ok(config.clone()),
            ConfigSource::File(path) => self.load_file(path),
            ConfigSource::Default => {
                default_config_path().and_then(|path| self.load_file(&path))
            }
        };

        let config = match loaded {
            Ok(config) => config,
            Err(err) => {
                warn!("Failed loading configuration, falling back to localhost: {err}");
                return ExplorerConfig::fallback();
            }
        };

        if config.clusters.is_empty() {
            warn!("No clusters configured, falling back to localhost");
            return ExplorerConfig::fallback();
        }

        for cluster in config.clusters.iter().filter(|c| c.brokers.is_empty()) {
            warn!(
                cluster = %cluster.name,
                "Cluster has no brokers configured and cannot be connected to"
            );
        }

        config
    }

    pub fn load_file(&self, path: &Path) -> Result<ExplorerConfig, ConfigLoadError> {
        debug!("Loading configuration from {}", path.display());
        let mut figment = Figment::from(Serialized::defaults(ExplorerConfig::default()))
            .merge(Yaml::file_exact(path));

        if self.load_env {
            figment = figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .only(&["current_cluster", "clusteroverride"])
                    .map(|k| k.as_str().replace('_', "-").into()),
            );
        }

        Ok(figment.extract()?)
    }
}

/// Resolves the configuration file: `$KAFSCOPE_CONFIG` if set, `~/.kaf/config` otherwise.
pub fn default_config_path() -> Result<PathBuf, ConfigLoadError> {
    if let Some(path) = std::env::var_os(CONFIG_FILE_ENV) {
        return Ok(PathBuf::from(path));
    }

    Ok(dirs::home_dir()
        .ok_or(ConfigLoadError::NoHomeDirectory)?
        .join(".kaf")
        .join("config"))
}
