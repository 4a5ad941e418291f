// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Schema registry identifier, as embedded in Confluent-framed payloads.
pub type SchemaId = u32;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum SchemaType {
    /// The registry omits the type for Avro schemas.
    #[default]
    Avro,
    Json,
    Protobuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    pub id: SchemaId,
    pub subject: String,
    pub version: i32,
    /// Fully qualified record name (`namespace.name` for Avro), empty if unknown.
    pub record_name: String,
    pub schema_type: SchemaType,
    /// Raw schema definition as returned by the registry.
    pub schema: String,
}

/// Schemas of a message's key and value. Data sources return `None` instead of a value
/// with both sides empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSchemaInfo {
    pub key_schema: Option<Arc<SchemaInfo>>,
    pub value_schema: Option<Arc<SchemaInfo>>,
}

impl MessageSchemaInfo {
    pub fn new(
        key_schema: Option<Arc<SchemaInfo>>,
        value_schema: Option<Arc<SchemaInfo>>,
    ) -> Option<Self> {
        if key_schema.is_none() && value_schema.is_none() {
            return None;
        }
        Some(Self {
            key_schema,
            value_schema,
        })
    }
}
