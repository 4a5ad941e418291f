// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Client side of the SCRAM-SHA-256 / SCRAM-SHA-512 SASL exchange (RFC 5802, RFC 7677).
//!
//! ```text
//! Client                          Server
//!   |--- client-first ------------->|  n,,n=<user>,r=<client nonce>
//!   |<-- server-first --------------|  r=<nonce>,s=<salt>,i=<iterations>
//!   |--- client-final ------------->|  c=biws,r=<nonce>,p=<proof>
//!   |<-- server-final --------------|  v=<server signature> | e=<error>
//! ```

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, trace};

use kafscope_types::config::SaslMechanism;

const GS2_HEADER: &str = "n,,";
// base64 of the gs2 header, no channel binding
const CHANNEL_BINDING: &str = "biws";
const NONCE_LEN: usize = 24;
/// Highest iteration count Kafka brokers accept for SCRAM credentials.
pub const MAX_ITERATIONS: u32 = 16_384;

#[derive(Debug, thiserror::Error)]
pub enum ScramError {
    #[error("invalid server message: {0}")]
    InvalidServerMessage(String),
    #[error("server nonce does not start with the client nonce")]
    InvalidNonce,
    #[error("invalid iteration count: {0}")]
    InvalidIterations(String),
    #[error("invalid base64 in server message: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("server signature verification failed")]
    ServerVerificationFailed,
    #[error("authentication rejected by server: {0}")]
    ServerError(String),
    #[error("invalid key length for the hash primitive")]
    InvalidKeyLength,
    #[error("{0} is not a SCRAM mechanism")]
    UnsupportedMechanism(SaslMechanism),
    #[error("the handshake already finished")]
    Finished,
}

/// Hash primitive the SCRAM exchange is parameterized over.
pub trait ScramHash: Send + Sync + fmt::Debug {
    fn hash(&self, data: &[u8]) -> Vec<u8>;

    fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, ScramError>;

    /// `Hi(password, salt, iterations)`, i.e. PBKDF2 with HMAC over this hash.
    fn salted_password(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
    ) -> Result<Vec<u8>, ScramError>;
}

macro_rules! scram_hash {
    ($name:ident, $digest:ty) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl ScramHash for $name {
            fn hash(&self, data: &[u8]) -> Vec<u8> {
                <$digest as Digest>::digest(data).to_vec()
            }

            fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, ScramError> {
                let mut mac = Hmac::<$digest>::new_from_slice(key)
                    .map_err(|_| ScramError::InvalidKeyLength)?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }

            fn salted_password(
                &self,
                password: &[u8],
                salt: &[u8],
                iterations: u32,
            ) -> Result<Vec<u8>, ScramError> {
                let mut salted = vec![0u8; <$digest as Digest>::output_size()];
                pbkdf2::pbkdf2::<Hmac<$digest>>(password, salt, iterations, &mut salted)
                    .map_err(|_| ScramError::InvalidKeyLength)?;
                Ok(salted)
            }
        }
    };
}

scram_hash!(Sha256Hash, Sha256);
scram_hash!(Sha512Hash, Sha512);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScramMechanism {
    Sha256,
    Sha512,
}

impl ScramMechanism {
    pub fn name(&self) -> &'static str {
        match self {
            ScramMechanism::Sha256 => "SCRAM-SHA-256",
            ScramMechanism::Sha512 => "SCRAM-SHA-512",
        }
    }

    pub fn hash(&self) -> &'static dyn ScramHash {
        match self {
            ScramMechanism::Sha256 => &Sha256Hash,
            ScramMechanism::Sha512 => &Sha512Hash,
        }
    }
}

impl TryFrom<SaslMechanism> for ScramMechanism {
    type Error = ScramError;

    fn try_from(value: SaslMechanism) -> Result<Self, Self::Error> {
        match value {
            SaslMechanism::ScramSha256 => Ok(ScramMechanism::Sha256),
            SaslMechanism::ScramSha512 => Ok(ScramMechanism::Sha512),
            other => Err(ScramError::UnsupportedMechanism(other)),
        }
    }
}

impl fmt::Display for ScramMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Externally visible progress of a [`ScramClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramStage {
    Start,
    ClientFirstSent,
    /// Passed through while the client-final message is computed.
    ServerFirstReceived,
    ClientFinalSent,
    Done,
    Failed,
}

enum State {
    Start,
    ClientFirstSent {
        client_first_bare: String,
    },
    ServerFirstReceived {
        client_first_bare: String,
        server_first: String,
        nonce: String,
        salt: Vec<u8>,
        iterations: u32,
    },
    ClientFinalSent {
        server_signature: Vec<u8>,
    },
    Done,
    Failed,
}

impl State {
    fn stage(&self) -> ScramStage {
        match self {
            State::Start => ScramStage::Start,
            State::ClientFirstSent { .. } => ScramStage::ClientFirstSent,
            State::ServerFirstReceived { .. } => ScramStage::ServerFirstReceived,
            State::ClientFinalSent { .. } => ScramStage::ClientFinalSent,
            State::Done => ScramStage::Done,
            State::Failed => ScramStage::Failed,
        }
    }
}

/// One SCRAM handshake. A client is good for a single exchange; get a fresh one from the
/// [`ScramClientFactory`] for every connection attempt.
pub struct ScramClient {
    mechanism: ScramMechanism,
    username: String,
    password: String,
    client_nonce: String,
    state: State,
}

impl ScramClient {
    pub fn new(mechanism: ScramMechanism, username: &str, password: &str) -> Self {
        let nonce: [u8; NONCE_LEN] = rand::random();
        Self {
            mechanism,
            username: normalize_username(username),
            password: password.to_owned(),
            client_nonce: BASE64.encode(nonce),
            state: State::Start,
        }
    }

    #[cfg(test)]
    fn with_nonce(mut self, nonce: &str) -> Self {
        self.client_nonce = nonce.to_owned();
        self
    }

    pub fn mechanism(&self) -> ScramMechanism {
        self.mechanism
    }

    pub fn stage(&self) -> ScramStage {
        self.state.stage()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Advances the handshake with the server's last message and returns the next client
    /// message. The first call ignores `challenge`; the last one returns an empty response.
    ///
    /// Any error leaves the client in [`ScramStage::Failed`].
    pub fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>, ScramError> {
        if matches!(self.state, State::Done | State::Failed) {
            return Err(ScramError::Finished);
        }

        let state = std::mem::replace(&mut self.state, State::Failed);
        let (response, next) = match state {
            State::Start => self.client_first()?,
            State::ClientFirstSent { client_first_bare } => {
                let received = self.receive_server_first(client_first_bare, challenge)?;
                self.client_final(received)?
            }
            // only held within a single step
            State::ServerFirstReceived { .. } => self.client_final(state)?,
            State::ClientFinalSent { server_signature } => {
                self.verify_server_final(&server_signature, challenge)?
            }
            State::Done | State::Failed => return Err(ScramError::Finished),
        };

        trace!(mechanism = %self.mechanism, stage = ?next.stage(), "SCRAM step");
        self.state = next;
        Ok(response)
    }

    fn client_first(&self) -> Result<(Vec<u8>, State), ScramError> {
        let client_first_bare = format!("n={},r={}", self.username, self.client_nonce);
        let message = format!("{GS2_HEADER}{client_first_bare}");
        Ok((message.into_bytes(), State::ClientFirstSent { client_first_bare }))
    }

    fn receive_server_first(
        &self,
        client_first_bare: String,
        challenge: &[u8],
    ) -> Result<State, ScramError> {
        let server_first = as_str(challenge)?;
        if let Some(error) = server_first.strip_prefix("e=") {
            return Err(ScramError::ServerError(error.to_owned()));
        }

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for attribute in server_first.split(',') {
            if let Some(value) = attribute.strip_prefix("r=") {
                nonce = Some(value.to_owned());
            } else if let Some(value) = attribute.strip_prefix("s=") {
                salt = Some(BASE64.decode(value)?);
            } else if let Some(value) = attribute.strip_prefix("i=") {
                iterations = Some(
                    value
                        .parse::<u32>()
                        .map_err(|err| ScramError::InvalidIterations(err.to_string()))?,
                );
            }
        }

        let nonce = nonce.ok_or_else(|| missing("nonce"))?;
        let salt = salt.ok_or_else(|| missing("salt"))?;
        let iterations = iterations.ok_or_else(|| missing("iteration count"))?;

        if !nonce.starts_with(&self.client_nonce) {
            return Err(ScramError::InvalidNonce);
        }
        if iterations == 0 || iterations > MAX_ITERATIONS {
            return Err(ScramError::InvalidIterations(iterations.to_string()));
        }

        Ok(State::ServerFirstReceived {
            client_first_bare,
            server_first: server_first.to_owned(),
            nonce,
            salt,
            iterations,
        })
    }

    fn client_final(&self, state: State) -> Result<(Vec<u8>, State), ScramError> {
        let State::ServerFirstReceived {
            client_first_bare,
            server_first,
            nonce,
            salt,
            iterations,
        } = state
        else {
            return Err(ScramError::Finished);
        };

        let hash = self.mechanism.hash();
        let salted_password = hash.salted_password(self.password.as_bytes(), &salt, iterations)?;
        let client_key = hash.hmac(&salted_password, b"Client Key")?;
        let stored_key = hash.hash(&client_key);

        let client_final_without_proof = format!("c={CHANNEL_BINDING},r={nonce}");
        let auth_message =
            format!("{client_first_bare},{server_first},{client_final_without_proof}");

        let client_signature = hash.hmac(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(key, signature)| key ^ signature)
            .collect();

        let server_key = hash.hmac(&salted_password, b"Server Key")?;
        let server_signature = hash.hmac(&server_key, auth_message.as_bytes())?;

        let message = format!("{client_final_without_proof},p={}", BASE64.encode(proof));
        Ok((
            message.into_bytes(),
            State::ClientFinalSent { server_signature },
        ))
    }

    fn verify_server_final(
        &self,
        expected: &[u8],
        challenge: &[u8],
    ) -> Result<(Vec<u8>, State), ScramError> {
        let server_final = as_str(challenge)?;
        // extensions may follow the first attribute
        let attribute = server_final.split(',').next().unwrap_or_default();

        if let Some(error) = attribute.strip_prefix("e=") {
            return Err(ScramError::ServerError(error.to_owned()));
        }
        let signature = attribute
            .strip_prefix("v=")
            .ok_or_else(|| missing("server signature"))?;
        let signature = BASE64.decode(signature)?;

        if !constant_time_eq(&signature, expected) {
            return Err(ScramError::ServerVerificationFailed);
        }

        debug!(mechanism = %self.mechanism, "SCRAM handshake completed");
        Ok((Vec::new(), State::Done))
    }
}

impl fmt::Debug for ScramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramClient")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("stage", &self.stage())
            .finish_non_exhaustive()
    }
}

/// Hands out a fresh [`ScramClient`] for each connection attempt of a cluster.
#[derive(Clone)]
pub struct ScramClientFactory {
    mechanism: ScramMechanism,
    username: String,
    password: String,
}

impl ScramClientFactory {
    pub fn new(
        mechanism: ScramMechanism,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            mechanism,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn mechanism(&self) -> ScramMechanism {
        self.mechanism
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn new_client(&self) -> ScramClient {
        ScramClient::new(self.mechanism, &self.username, &self.password)
    }
}

impl fmt::Debug for ScramClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramClientFactory")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn normalize_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

fn as_str(message: &[u8]) -> Result<&str, ScramError> {
    std::str::from_utf8(message).map_err(|err| ScramError::InvalidServerMessage(err.to_string()))
}

fn missing(what: &str) -> ScramError {
    ScramError::InvalidServerMessage(format!("missing {what}"))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
