// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use kafscope_types::SchemaId;

/// First byte of a Confluent-framed payload.
pub const MAGIC_BYTE: u8 = 0x00;
/// Magic byte plus the big-endian schema id.
pub const WIRE_HEADER_LEN: usize = 5;

/// Extracts the schema id from a payload in the Confluent wire format, `None` for anything
/// else.
pub fn schema_id(payload: &[u8]) -> Option<SchemaId> {
    match payload {
        [MAGIC_BYTE, a, b, c, d, ..] => Some(SchemaId::from_be_bytes([*a, *b, *c, *d])),
        _ => None,
    }
}
