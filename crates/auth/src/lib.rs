// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! SASL credential handling: the SCRAM challenge-response client and the OAUTHBEARER token
//! provider.

mod oauth;
mod scram;

pub use oauth::{
    ClientCredentialsTokenSource, DEFAULT_REFRESH_MARGIN, STATIC_TOKEN_LIFETIME,
    StaticTokenSource, Token, TokenError, TokenProvider, TokenSource,
};
pub use scram::{
    MAX_ITERATIONS, ScramClient, ScramClientFactory, ScramError, ScramHash, ScramMechanism,
    ScramStage, Sha256Hash, Sha512Hash,
};
