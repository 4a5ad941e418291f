// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Schema lookups against a Confluent compatible schema registry.

mod cache;
mod client;
mod wire;

pub use cache::SchemaCache;
pub use client::{SchemaRegistryClient, record_name};
pub use wire::{MAGIC_BYTE, WIRE_HEADER_LEN, schema_id};

use kafscope_types::{SchemaId, SchemaInfo};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("schema registry request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("schema registry {url} responded with {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("cannot build schema registry client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Resolves schema ids to schemas.
///
/// `Ok(None)` means the registry does not know the id (or returned something unusable);
/// `Err` is reserved for failures reaching the registry.
#[async_trait::async_trait]
pub trait SchemaResolver: Send + Sync + 'static {
    async fn resolve(&self, id: SchemaId) -> Result<Option<SchemaInfo>, RegistryError>;
}
