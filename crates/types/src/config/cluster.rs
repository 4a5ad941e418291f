// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// # Kafka cluster
///
/// Configuration options to connect to a Kafka cluster.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterConfig {
    /// Cluster name, used as the context name.
    pub name: String,

    /// # Brokers
    ///
    /// Initial list of brokers (host:port).
    #[serde(default)]
    pub brokers: Vec<String>,

    /// # Protocol version
    ///
    /// Kafka protocol version assumed for brokers, e.g. `2.8.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(rename = "SASL", default, skip_serializing_if = "Option::is_none")]
    pub sasl: Option<SaslConfig>,

    #[serde(rename = "TLS", default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_protocol: Option<SecurityProtocol>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_registry_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_registry_credentials: Option<Credentials>,
}

impl ClusterConfig {
    pub fn new(name: impl Into<String>, brokers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            brokers,
            version: None,
            sasl: None,
            tls: None,
            security_protocol: None,
            schema_registry_url: None,
            schema_registry_credentials: None,
        }
    }

    /// Comma separated broker list, as used in error messages and client configuration.
    pub fn broker_list(&self) -> String {
        self.brokers.join(",")
    }

    /// The SASL mechanism in effect, if any.
    ///
    /// A SASL block that only carries a username is treated as `PLAIN`.
    pub fn sasl_mechanism(&self) -> Option<SaslMechanism> {
        let sasl = self.sasl.as_ref()?;
        match sasl.mechanism {
            Some(mechanism) => Some(mechanism),
            None if sasl.username.as_deref().is_some_and(|u| !u.is_empty()) => {
                Some(SaslMechanism::Plain)
            }
            None => None,
        }
    }
}

// Credentials must not leak in logs
impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("name", &self.name)
            .field("brokers", &self.brokers)
            .field("version", &self.version)
            .field("sasl", &self.sasl)
            .field("tls", &self.tls)
            .field("security_protocol", &self.security_protocol)
            .field("schema_registry_url", &self.schema_registry_url)
            .finish_non_exhaustive()
    }
}

/// # SASL options
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaslConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<SaslMechanism>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Pre-issued OAUTHBEARER token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(rename = "clientID", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(
        rename = "clientSecret",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_secret: Option<String>,
    /// Token endpoint for the OAuth client-credentials grant.
    #[serde(rename = "tokenURL", default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,

    /// SASL handshake version (0 or 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i16>,
}

impl fmt::Debug for SaslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslConfig")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum SaslMechanism {
    #[serde(rename = "PLAIN", alias = "plain")]
    #[strum(serialize = "PLAIN")]
    Plain,
    #[serde(rename = "SCRAM-SHA-256", alias = "scram-sha-256")]
    #[strum(serialize = "SCRAM-SHA-256")]
    ScramSha256,
    #[serde(rename = "SCRAM-SHA-512", alias = "scram-sha-512")]
    #[strum(serialize = "SCRAM-SHA-512")]
    ScramSha512,
    #[serde(rename = "OAUTHBEARER", alias = "oauthbearer")]
    #[strum(serialize = "OAUTHBEARER")]
    OAuthBearer,
}

/// # TLS options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(rename = "cafile", default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    #[serde(rename = "clientfile", default, skip_serializing_if = "Option::is_none")]
    pub client_file: Option<PathBuf>,
    #[serde(
        rename = "clientkeyfile",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_key_file: Option<PathBuf>,
    /// Skip server certificate verification.
    #[serde(default)]
    pub insecure: bool,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SecurityProtocol {
    #[serde(alias = "plaintext")]
    Plaintext,
    #[serde(alias = "ssl")]
    Ssl,
    #[serde(alias = "sasl_plaintext")]
    SaslPlaintext,
    #[serde(alias = "sasl_ssl")]
    SaslSsl,
}

impl SecurityProtocol {
    pub fn uses_tls(self) -> bool {
        matches!(self, SecurityProtocol::Ssl | SecurityProtocol::SaslSsl)
    }

    pub fn uses_sasl(self) -> bool {
        matches!(
            self,
            SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl
        )
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
