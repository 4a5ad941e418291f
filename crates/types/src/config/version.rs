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
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid kafka version '{input}': {reason}")]
pub struct InvalidKafkaVersion {
    input: String,
    reason: &'static str,
}

/// A Kafka protocol version, `major.minor.patch` with an optional fourth component as
/// used by pre-1.0 releases (`0.10.2.0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KafkaVersion {
    major: u16,
    minor: u16,
    patch: u16,
    build: Option<u16>,
}

impl KafkaVersion {
    /// Assumed when a cluster does not configure a version.
    pub const DEFAULT: KafkaVersion = KafkaVersion::new(1, 0, 0);

    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
            build: None,
        }
    }

    pub fn major(&self) -> u16 {
        self.major
    }

    pub fn minor(&self) -> u16 {
        self.minor
    }
}

impl Default for KafkaVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for KafkaVersion {
    type Err = InvalidKafkaVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| InvalidKafkaVersion {
            input: s.to_owned(),
            reason,
        };

        let mut components = Vec::with_capacity(4);
        for part in s.trim().split('.') {
            let value = part
                .parse::<u16>()
                .map_err(|_| invalid("components must be non-negative integers"))?;
            components.push(value);
        }

        match components.as_slice() {
            [major, minor, patch] => Ok(KafkaVersion::new(*major, *minor, *patch)),
            [major, minor, patch, build] => Ok(KafkaVersion {
                major: *major,
                minor: *minor,
                patch: *patch,
                build: Some(*build),
            }),
            _ => Err(invalid("expected 3 or 4 dot separated components")),
        }
    }
}

impl fmt::Display for KafkaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(build) = self.build {
            write!(f, ".{build}")?;
        }
        Ok(())
    }
}
