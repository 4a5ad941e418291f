// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Bearer tokens for the OAUTHBEARER SASL mechanism.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use kafscope_types::config::SaslConfig;

/// Refresh tokens this long before they actually expire.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(30);
/// Lifetime given to statically configured tokens.
pub const STATIC_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
/// Used when the token endpoint does not report `expires_in`.
const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("token endpoint {url} responded with {status}: {body}")]
    Endpoint {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("token endpoint returned an empty access token")]
    EmptyToken,
    #[error("OAUTHBEARER requires either 'token' or 'clientID', 'clientSecret' and 'tokenURL'")]
    MissingCredentials,
    #[error("cannot wait for an OAUTHBEARER token on a current-thread runtime")]
    CurrentThreadRuntime,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub principal: String,
    pub expires_at: SystemTime,
}

impl Token {
    pub fn new(value: impl Into<String>, principal: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            value: value.into(),
            principal: principal.into(),
            expires_at: SystemTime::now() + lifetime,
        }
    }

    /// Whether the token expires within `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        SystemTime::now() + margin >= self.expires_at
    }

    /// Expiry as milliseconds since epoch, the representation librdkafka expects.
    pub fn expires_at_millis(&self) -> i64 {
        self.expires_at
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[REDACTED]")
            .field("principal", &self.principal)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Where a [`TokenProvider`] gets fresh tokens from.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Token, TokenError>;
}

/// Re-issues a pre-configured token with a fixed lifetime.
pub struct StaticTokenSource {
    token: String,
    principal: String,
    lifetime: Duration,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            principal: principal.into(),
            lifetime: STATIC_TOKEN_LIFETIME,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch(&self) -> Result<Token, TokenError> {
        Ok(Token::new(&self.token, &self.principal, self.lifetime))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 client-credentials grant against a token endpoint.
pub struct ClientCredentialsTokenSource {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
}

impl ClientCredentialsTokenSource {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scopes: Vec<String>,
    ) -> Result<Self, TokenError> {
        let http = reqwest::Client::builder()
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes,
        })
    }
}

#[async_trait::async_trait]
impl TokenSource for ClientCredentialsTokenSource {
    async fn fetch(&self) -> Result<Token, TokenError> {
        let scope = self.scopes.join(" ");
        let mut form = vec![("grant_type", "client_credentials")];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        debug!(token_url = %self.token_url, client_id = %self.client_id, "Requesting OAuth token");
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Endpoint {
                url: self.token_url.clone(),
                status,
                body,
            });
        }

        let response: TokenResponse = response.json().await?;
        if response.access_token.is_empty() {
            return Err(TokenError::EmptyToken);
        }

        let lifetime = response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_EXPIRES_IN);
        Ok(Token::new(response.access_token, &self.client_id, lifetime))
    }
}

/// Caches the current bearer token and refreshes it from a [`TokenSource`] when it is about
/// to expire.
///
/// Refreshes are serialized: callers arriving while a refresh is in flight wait for it and
/// observe its outcome instead of starting another one. A failed refresh leaves the previous
/// token in place.
#[derive(Clone)]
pub struct TokenProvider {
    inner: Arc<Inner>,
}

struct Inner {
    source: Box<dyn TokenSource>,
    refresh_margin: Duration,
    current: Mutex<Option<Token>>,
}

impl TokenProvider {
    pub fn new(source: impl TokenSource) -> Self {
        Self::with_refresh_margin(source, DEFAULT_REFRESH_MARGIN)
    }

    pub fn with_refresh_margin(source: impl TokenSource, refresh_margin: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: Box::new(source),
                refresh_margin,
                current: Mutex::new(None),
            }),
        }
    }

    /// Picks the token source matching the cluster's SASL settings. Client credentials win
    /// over a static token when both are configured.
    pub fn from_sasl_config(sasl: &SaslConfig) -> Result<Self, TokenError> {
        match (
            sasl.token_url.as_deref(),
            sasl.client_id.as_deref(),
            sasl.client_secret.as_deref(),
            sasl.token.as_deref(),
        ) {
            (Some(token_url), Some(client_id), Some(client_secret), _) => {
                Ok(Self::new(ClientCredentialsTokenSource::new(
                    token_url,
                    client_id,
                    client_secret,
                    sasl.scopes.clone(),
                )?))
            }
            (_, _, _, Some(token)) if !token.is_empty() => {
                let principal = sasl.username.clone().unwrap_or_default();
                Ok(Self::new(StaticTokenSource::new(token, principal)))
            }
            _ => Err(TokenError::MissingCredentials),
        }
    }

    /// Returns a valid token, refreshing it first if needed.
    pub async fn token(&self) -> Result<Token, TokenError> {
        let mut current = self.inner.current.lock().await;

        if let Some(token) = current.as_ref() {
            if !token.expires_within(self.inner.refresh_margin) {
                return Ok(token.clone());
            }
            debug!(principal = %token.principal, "OAuth token expired, refreshing");
        }

        match self.inner.source.fetch().await {
            Ok(token) => {
                info!(principal = %token.principal, "Obtained OAuth token");
                *current = Some(token.clone());
                Ok(token)
            }
            Err(err) => {
                warn!(%err, "Failed to refresh OAuth token");
                Err(err)
            }
        }
    }

    /// The last token obtained, possibly expired.
    pub async fn cached(&self) -> Option<Token> {
        self.inner.current.lock().await.clone()
    }
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("refresh_margin", &self.inner.refresh_margin)
            .finish_non_exhaustive()
    }
}
