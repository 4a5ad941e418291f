// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroup {
    pub name: String,
    /// State as reported by the group coordinator, e.g. `Stable` or `Empty`.
    pub state: String,
    pub members: usize,
    pub protocol_type: String,
}

impl ConsumerGroup {
    pub fn new(name: impl Into<String>, state: impl Into<String>, members: usize) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
            members,
            protocol_type: "consumer".to_owned(),
        }
    }
}
