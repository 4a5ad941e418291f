// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::error::Error as StdError;
use std::path::Path;
use std::sync::Arc;

use rdkafka::client::{ClientContext, OAuthToken};
use rdkafka::config::{FromClientConfigAndContext, RDKafkaLogLevel};
use rdkafka::consumer::ConsumerContext;
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::ClientConfig;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, error, info, trace, warn};

use kafscope_auth::{ScramClientFactory, ScramMechanism, TokenError, TokenProvider};
use kafscope_types::config::{ClusterConfig, KafkaVersion, SaslMechanism, SecurityProtocol};

use crate::error::TransportError;

const CLIENT_ID: &str = "kafscope";

/// Client context shared by all clients of a cluster. Routes librdkafka logs into `tracing`
/// and serves OAUTHBEARER token refreshes from the cluster's [`TokenProvider`].
#[derive(Clone)]
pub struct ExplorerContext {
    cluster: Arc<str>,
    token_provider: Option<TokenProvider>,
    runtime: Option<Handle>,
}

impl ExplorerContext {
    fn new(cluster: &str, token_provider: Option<TokenProvider>, runtime: Option<Handle>) -> Self {
        Self {
            cluster: Arc::from(cluster),
            token_provider,
            runtime,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn token_provider(&self) -> Option<&TokenProvider> {
        self.token_provider.as_ref()
    }

    /// Blocks the calling librdkafka thread until the provider hands out a valid token.
    ///
    /// When called from a runtime worker this needs the multi-thread runtime; on a
    /// current-thread runtime the refresh fails with [`TokenError::CurrentThreadRuntime`].
    fn oauth_token(&self) -> Result<OAuthToken, TokenError> {
        let (Some(provider), Some(runtime)) = (&self.token_provider, &self.runtime) else {
            return Err(TokenError::MissingCredentials);
        };

        let token = match Handle::try_current().map(|current| current.runtime_flavor()) {
            // the main queue is polled from a runtime worker
            Ok(RuntimeFlavor::MultiThread) => {
                tokio::task::block_in_place(|| runtime.block_on(provider.token()))
            }
            // blocking the only worker would stall the refresh it waits for
            Ok(_) => return Err(TokenError::CurrentThreadRuntime),
            Err(_) => runtime.block_on(provider.token()),
        }?;

        Ok(OAuthToken {
            lifetime_ms: token.expires_at_millis(),
            principal_name: token.principal,
            token: token.value,
        })
    }
}

impl ClientContext for ExplorerContext {
    const ENABLE_REFRESH_OAUTH_TOKEN: bool = true;

    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        let cluster = &*self.cluster;
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => error!(cluster, fac, "librdkafka: {log_message}"),
            RDKafkaLogLevel::Warning => warn!(cluster, fac, "librdkafka: {log_message}"),
            RDKafkaLogLevel::Notice => info!(cluster, fac, "librdkafka: {log_message}"),
            RDKafkaLogLevel::Info => debug!(cluster, fac, "librdkafka: {log_message}"),
            RDKafkaLogLevel::Debug => trace!(cluster, fac, "librdkafka: {log_message}"),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        warn!(cluster = &*self.cluster, %error, "librdkafka error: {reason}");
    }

    fn generate_oauth_token(
        &self,
        _oauthbearer_config: Option<&str>,
    ) -> Result<OAuthToken, Box<dyn StdError>> {
        debug!(cluster = &*self.cluster, "Refreshing OAUTHBEARER token");
        Ok(self.oauth_token()?)
    }
}

impl ConsumerContext for ExplorerContext {}

/// Client settings for one cluster, resolved from its [`ClusterConfig`]. Building it never
/// opens a connection.
#[derive(Clone)]
pub struct TransportConfig {
    cluster: String,
    brokers: String,
    version: KafkaVersion,
    security_protocol: SecurityProtocol,
    client_config: ClientConfig,
    context: ExplorerContext,
    scram: Option<ScramClientFactory>,
}

impl TransportConfig {
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Comma separated bootstrap brokers.
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    pub fn version(&self) -> KafkaVersion {
        self.version
    }

    pub fn security_protocol(&self) -> SecurityProtocol {
        self.security_protocol
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    pub fn context(&self) -> &ExplorerContext {
        &self.context
    }

    /// Present for SCRAM-SHA-256/512 clusters.
    ///
    /// librdkafka runs the SCRAM exchange of its own connections from `sasl.username` and
    /// `sasl.password`; the factory serves handshakes driven outside of librdkafka.
    pub fn scram(&self) -> Option<&ScramClientFactory> {
        self.scram.as_ref()
    }

    /// Creates a librdkafka client of type `T` with this configuration.
    pub fn create<T>(&self) -> KafkaResult<T>
    where
        T: FromClientConfigAndContext<ExplorerContext>,
    {
        self.client_config.create_with_context(self.context.clone())
    }

    /// Creates a client with extra settings on top of this configuration.
    pub fn create_with<T>(&self, overrides: &[(&str, &str)]) -> KafkaResult<T>
    where
        T: FromClientConfigAndContext<ExplorerContext>,
    {
        let mut client_config = self.client_config.clone();
        for (key, value) in overrides {
            client_config.set(*key, *value);
        }
        client_config.create_with_context(self.context.clone())
    }
}

pub struct TransportConfigBuilder<'a> {
    cluster: &'a ClusterConfig,
    token_provider: Option<TokenProvider>,
    runtime: Option<Handle>,
}

impl<'a> TransportConfigBuilder<'a> {
    pub fn new(cluster: &'a ClusterConfig) -> Self {
        Self {
            cluster,
            token_provider: None,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Uses `provider` for OAUTHBEARER instead of one derived from the SASL settings. Lets
    /// all clients of a data source share a token.
    pub fn token_provider(mut self, provider: TokenProvider) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Runtime that drives token refreshes. Defaults to the runtime the builder was created on.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<TransportConfig, TransportError> {
        let cluster = self.cluster;
        if cluster.brokers.is_empty() {
            return Err(TransportError::NoBrokers(cluster.name.clone()));
        }

        let mut client_config = ClientConfig::new();
        let brokers = cluster.broker_list();
        client_config
            .set("bootstrap.servers", &brokers)
            .set("client.id", CLIENT_ID)
            .set("api.version.request", "true");

        let version = resolve_version(cluster);
        client_config.set("broker.version.fallback", version.to_string());

        let mechanism = cluster.sasl_mechanism();
        let security_protocol = cluster.security_protocol.unwrap_or_else(|| {
            match (cluster.tls.is_some(), mechanism.is_some()) {
                (true, true) => SecurityProtocol::SaslSsl,
                (false, true) => SecurityProtocol::SaslPlaintext,
                (true, false) => SecurityProtocol::Ssl,
                (false, false) => SecurityProtocol::Plaintext,
            }
        });
        client_config.set("security.protocol", security_protocol.to_string());

        if security_protocol.uses_tls() || cluster.tls.is_some() {
            configure_tls(cluster, &mut client_config)?;
        }

        let mut scram = None;
        let mut token_provider = None;
        if let Some(mechanism) = mechanism {
            client_config.set("sasl.mechanisms", mechanism.to_string());
            match mechanism {
                SaslMechanism::Plain => {
                    let (username, password) = credentials(cluster, mechanism)?;
                    client_config
                        .set("sasl.username", username)
                        .set("sasl.password", password);
                }
                SaslMechanism::ScramSha256 | SaslMechanism::ScramSha512 => {
                    let (username, password) = credentials(cluster, mechanism)?;
                    client_config
                        .set("sasl.username", username)
                        .set("sasl.password", password);
                    let mechanism = match mechanism {
                        SaslMechanism::ScramSha512 => ScramMechanism::Sha512,
                        _ => ScramMechanism::Sha256,
                    };
                    scram = Some(ScramClientFactory::new(mechanism, username, password));
                }
                SaslMechanism::OAuthBearer => {
                    token_provider = match self.token_provider {
                        Some(provider) => Some(provider),
                        None => {
                            let sasl = cluster.sasl.clone().unwrap_or_default();
                            Some(TokenProvider::from_sasl_config(&sasl).map_err(|source| {
                                TransportError::OAuth {
                                    cluster: cluster.name.clone(),
                                    source,
                                }
                            })?)
                        }
                    };
                }
            }

            if let Some(handshake) = cluster.sasl.as_ref().and_then(|s| s.version) {
                debug!(
                    cluster = %cluster.name,
                    handshake,
                    "SASL handshake version is negotiated by the client, ignoring the configured one"
                );
            }
        }

        debug!(
            cluster = %cluster.name,
            %brokers,
            %version,
            %security_protocol,
            sasl_mechanism = ?mechanism,
            "Built transport configuration"
        );

        Ok(TransportConfig {
            cluster: cluster.name.clone(),
            brokers,
            version,
            security_protocol,
            context: ExplorerContext::new(&cluster.name, token_provider, self.runtime),
            client_config,
            scram,
        })
    }
}

fn resolve_version(cluster: &ClusterConfig) -> KafkaVersion {
    match cluster.version.as_deref().map(str::trim) {
        None | Some("") => KafkaVersion::DEFAULT,
        Some(version) => version.parse().unwrap_or_else(|err| {
            warn!(
                cluster = %cluster.name,
                %err,
                "Falling back to protocol version {}",
                KafkaVersion::DEFAULT
            );
            KafkaVersion::DEFAULT
        }),
    }
}

fn configure_tls(
    cluster: &ClusterConfig,
    client_config: &mut ClientConfig,
) -> Result<(), TransportError> {
    let Some(tls) = &cluster.tls else {
        return Ok(());
    };

    if let Some(path) = &tls.ca_file {
        client_config.set("ssl.ca.pem", read_pem(path)?);
    }
    if let Some(path) = &tls.client_file {
        client_config.set("ssl.certificate.pem", read_pem(path)?);
    }
    if let Some(path) = &tls.client_key_file {
        client_config.set("ssl.key.pem", read_pem(path)?);
    }
    if tls.insecure {
        warn!(cluster = %cluster.name, "TLS certificate verification is disabled");
        client_config
            .set("enable.ssl.certificate.verification", "false")
            .set("ssl.endpoint.identification.algorithm", "none");
    }
    Ok(())
}

fn read_pem(path: &Path) -> Result<String, TransportError> {
    std::fs::read_to_string(path).map_err(|source| TransportError::TlsFile {
        path: path.to_owned(),
        source,
    })
}

fn credentials(
    cluster: &ClusterConfig,
    mechanism: SaslMechanism,
) -> Result<(&str, &str), TransportError> {
    let sasl = cluster.sasl.as_ref();
    match (
        sasl.and_then(|s| s.username.as_deref()),
        sasl.and_then(|s| s.password.as_deref()),
    ) {
        (Some(username), Some(password)) if !username.is_empty() => Ok((username, password)),
        _ => Err(TransportError::MissingCredentials {
            cluster: cluster.name.clone(),
            mechanism,
        }),
    }
}
