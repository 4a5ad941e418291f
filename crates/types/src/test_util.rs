// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::config::{
    ClusterConfig, Credentials, ExplorerConfig, SaslConfig, SaslMechanism, TlsConfig,
};

/// Three clusters named like the simulated contexts, `kafka-dev` being the current one.
///
/// `kafka-test` authenticates with SCRAM and has a schema registry, `kafka-prod` uses TLS.
/// Building clients for them never connects.
pub fn sample_config() -> ExplorerConfig {
    let dev = ClusterConfig::new("kafka-dev", vec!["localhost:9092".to_owned()]);

    let mut test = ClusterConfig::new(
        "kafka-test",
        vec!["test-1:9092".to_owned(), "test-2:9092".to_owned()],
    );
    test.version = Some("2.8.0".to_owned());
    test.sasl = Some(SaslConfig {
        mechanism: Some(SaslMechanism::ScramSha256),
        username: Some("explorer".to_owned()),
        password: Some("explorer-secret".to_owned()),
        ..Default::default()
    });
    test.schema_registry_url = Some("http://registry.test:8081".to_owned());
    test.schema_registry_credentials = Some(Credentials {
        username: "registry".to_owned(),
        password: "registry-secret".to_owned(),
    });

    let mut prod = ClusterConfig::new("kafka-prod", vec!["prod-1:9093".to_owned()]);
    prod.tls = Some(TlsConfig {
        insecure: true,
        ..Default::default()
    });

    ExplorerConfig {
        current_cluster: "kafka-dev".to_owned(),
        cluster_override: None,
        clusters: vec![dev, test, prod],
        log: None,
    }
}
