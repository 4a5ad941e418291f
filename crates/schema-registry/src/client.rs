// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use kafscope_types::config::Credentials;
use kafscope_types::{SchemaId, SchemaInfo, SchemaType};

use crate::{RegistryError, SchemaResolver};

const ACCEPT: &str = "application/vnd.schemaregistry.v1+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct GetSchemaResponse {
    schema: String,
    #[serde(rename = "schemaType", default)]
    schema_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubjectVersion {
    subject: String,
    version: i32,
}

/// Client for the REST API of a Confluent compatible schema registry.
#[derive(Clone)]
pub struct SchemaRegistryClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl SchemaRegistryClient {
    pub fn new(base_url: &str, credentials: Option<Credentials>) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RegistryError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GETs `path`, returning the body of a successful response and `None` on 404.
    async fn get(&self, path: &str) -> Result<Option<String>, RegistryError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http.get(&url).header(reqwest::header::ACCEPT, ACCEPT);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let network = |source| RegistryError::Network {
            url: url.clone(),
            source,
        };
        let response = request.send().await.map_err(network)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                url: url.clone(),
                status,
                body,
            });
        }

        response.text().await.map(Some).map_err(network)
    }

    async fn subject_version(&self, id: SchemaId) -> Option<SubjectVersion> {
        let body = match self.get(&format!("/schemas/ids/{id}/versions")).await {
            Ok(body) => body?,
            Err(err) => {
                debug!(schema_id = id, %err, "Cannot look up the subject of schema");
                return None;
            }
        };

        serde_json::from_str::<Vec<SubjectVersion>>(&body)
            .ok()?
            .into_iter()
            .next()
    }
}

#[async_trait::async_trait]
impl SchemaResolver for SchemaRegistryClient {
    async fn resolve(&self, id: SchemaId) -> Result<Option<SchemaInfo>, RegistryError> {
        let Some(body) = self.get(&format!("/schemas/ids/{id}")).await? else {
            debug!(schema_id = id, "Schema not found in registry");
            return Ok(None);
        };

        let response: GetSchemaResponse = match serde_json::from_str(&body) {
            Ok(response) => response,
            Err(err) => {
                warn!(schema_id = id, %err, "Ignoring malformed schema registry response");
                return Ok(None);
            }
        };

        let schema_type = response
            .schema_type
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or_default();

        // subject and version are informational only
        let (subject, version) = self
            .subject_version(id)
            .await
            .map(|sv| (sv.subject, sv.version))
            .unwrap_or_default();

        Ok(Some(SchemaInfo {
            id,
            subject,
            version,
            record_name: record_name(schema_type, &response.schema),
            schema_type,
            schema: response.schema,
        }))
    }
}

/// Logical record name of a schema definition: `namespace.name` for Avro records, the
/// `title` of a JSON schema, `package.Message` for the first Protobuf message. Empty when the
/// definition does not name a record.
pub fn record_name(schema_type: SchemaType, schema: &str) -> String {
    match schema_type {
        SchemaType::Avro => avro_record_name(schema),
        SchemaType::Json => serde_json::from_str::<serde_json::Value>(schema)
            .ok()
            .and_then(|value| value.get("title")?.as_str().map(str::to_owned))
            .unwrap_or_default(),
        SchemaType::Protobuf => protobuf_record_name(schema),
    }
}

fn avro_record_name(schema: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(schema) else {
        return String::new();
    };
    let Some(name) = value.get("name").and_then(|n| n.as_str()) else {
        return String::new();
    };

    // a dotted name is already fully qualified
    match value.get("namespace").and_then(|n| n.as_str()) {
        Some(namespace) if !namespace.is_empty() && !name.contains('.') => {
            format!("{namespace}.{name}")
        }
        _ => name.to_owned(),
    }
}

fn protobuf_record_name(schema: &str) -> String {
    let mut package = None;
    let mut tokens = schema
        .split(|c: char| c.is_whitespace() || c == ';' || c == '{')
        .filter(|t| !t.is_empty());

    while let Some(token) = tokens.next() {
        match token {
            "package" => package = tokens.next(),
            "message" => {
                let Some(message) = tokens.next() else {
                    break;
                };
                return match package {
                    Some(package) => format!("{package}.{message}"),
                    None => message.to_owned(),
                };
            }
            _ => {}
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Arc;

    use googletest::prelude::*;
    use parking_lot::Mutex;
    use test_log::test;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const ORDER_SCHEMA: &str =
        r#"{"schema":"{\"type\":\"record\",\"name\":\"Order\",\"namespace\":\"shop\"}"}"#;

    /// A request as seen by the registry: path and `Authorization` header.
    type Seen = (String, Option<String>);

    /// Registry answering every path with a canned status and body; unknown paths get 404.
    struct CannedRegistry {
        url: String,
        seen: Arc<Mutex<Vec<Seen>>>,
    }

    impl CannedRegistry {
        async fn start(routes: &[(&str, u16, &str)]) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let routes: Arc<HashMap<String, (u16, String)>> = Arc::new(
                routes
                    .iter()
                    .map(|(path, status, body)| ((*path).to_owned(), (*status, (*body).to_owned())))
                    .collect(),
            );
            let seen = Arc::new(Mutex::new(Vec::new()));

            let recorded = Arc::clone(&seen);
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let routes = Arc::clone(&routes);
                    let recorded = Arc::clone(&recorded);
                    tokio::spawn(async move {
                        let mut request = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => request.extend_from_slice(&chunk[..n]),
                            }
                        }
                        let request = String::from_utf8_lossy(&request).into_owned();
                        let path = request
                            .split_whitespace()
                            .nth(1)
                            .unwrap_or_default()
                            .to_owned();
                        let authorization = request.lines().find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("authorization")
                                .then(|| value.trim().to_owned())
                        });
                        recorded.lock().push((path.clone(), authorization));

                        let (status, body) = routes
                            .get(&path)
                            .cloned()
                            .unwrap_or((404, r#"{"error_code":40403}"#.to_owned()));
                        let response = format!(
                            "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
            });

            Self { url, seen }
        }

        fn client(&self, credentials: Option<Credentials>) -> SchemaRegistryClient {
            SchemaRegistryClient::new(&self.url, credentials).unwrap()
        }

        fn paths(&self) -> Vec<String> {
            self.seen.lock().iter().map(|(path, _)| path.clone()).collect()
        }
    }

    #[test(tokio::test)]
    async fn resolves_schema_with_subject_and_version() -> anyhow::Result<()> {
        let registry = CannedRegistry::start(&[
            ("/schemas/ids/7", 200, ORDER_SCHEMA),
            (
                "/schemas/ids/7/versions",
                200,
                r#"[{"subject":"orders-value","version":3}]"#,
            ),
        ])
        .await;

        let schema = registry.client(None).resolve(7).await?.unwrap();
        assert_that!(schema.id, eq(7));
        assert_that!(schema.subject, eq("orders-value"));
        assert_that!(schema.version, eq(3));
        assert_that!(schema.schema_type, eq(SchemaType::Avro));
        assert_that!(schema.record_name, eq("shop.Order"));
        assert_that!(
            registry.paths(),
            elements_are![eq("/schemas/ids/7"), eq("/schemas/ids/7/versions")]
        );
        Ok(())
    }

    #[test(tokio::test)]
    async fn schema_type_is_taken_from_the_response() -> anyhow::Result<()> {
        let registry = CannedRegistry::start(&[(
            "/schemas/ids/9",
            200,
            r#"{"schemaType":"PROTOBUF","schema":"package shop; message Payment {}"}"#,
        )])
        .await;

        let schema = registry.client(None).resolve(9).await?.unwrap();
        assert_that!(schema.schema_type, eq(SchemaType::Protobuf));
        assert_that!(schema.record_name, eq("shop.Payment"));
        Ok(())
    }

    #[test(tokio::test)]
    async fn unknown_id_is_none() -> anyhow::Result<()> {
        let registry = CannedRegistry::start(&[]).await;
        assert_that!(registry.client(None).resolve(404).await?, none());
        // no subject lookup for a missing schema
        assert_that!(registry.paths(), elements_are![eq("/schemas/ids/404")]);
        Ok(())
    }

    #[test(tokio::test)]
    async fn server_errors_are_reported() {
        let registry =
            CannedRegistry::start(&[("/schemas/ids/1", 500, r#"{"message":"boom"}"#)]).await;

        let err = registry.client(None).resolve(1).await.unwrap_err();
        match err {
            RegistryError::Status { status, body, .. } => {
                assert_that!(status, eq(StatusCode::INTERNAL_SERVER_ERROR));
                assert_that!(body, contains_substring("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test(tokio::test)]
    async fn failed_subject_lookup_keeps_the_schema() -> anyhow::Result<()> {
        let registry = CannedRegistry::start(&[
            ("/schemas/ids/7", 200, ORDER_SCHEMA),
            ("/schemas/ids/7/versions", 500, "oops"),
        ])
        .await;

        let schema = registry.client(None).resolve(7).await?.unwrap();
        assert_that!(schema.record_name, eq("shop.Order"));
        assert_that!(schema.subject, eq(""));
        assert_that!(schema.version, eq(0));
        Ok(())
    }

    #[test(tokio::test)]
    async fn malformed_body_is_none() -> anyhow::Result<()> {
        let registry = CannedRegistry::start(&[("/schemas/ids/3", 200, "<html>")]).await;
        assert_that!(registry.client(None).resolve(3).await?, none());
        Ok(())
    }

    #[test(tokio::test)]
    async fn sends_basic_auth() -> anyhow::Result<()> {
        let registry = CannedRegistry::start(&[("/schemas/ids/7", 200, ORDER_SCHEMA)]).await;
        let credentials = Credentials {
            username: "alice".to_owned(),
            password: "s3cr3t".to_owned(),
        };

        registry.client(Some(credentials)).resolve(7).await?;

        let seen = registry.seen.lock();
        assert!(!seen.is_empty());
        for (path, authorization) in seen.iter() {
            assert_eq!(
                authorization.as_deref(),
                Some("Basic YWxpY2U6czNjcjN0"),
                "{path}"
            );
        }
        Ok(())
    }

    #[test(tokio::test)]
    async fn unreachable_registry_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = SchemaRegistryClient::new(&url, None).unwrap();
        assert!(matches!(
            client.resolve(1).await,
            Err(RegistryError::Network { .. })
        ));
    }

    #[test]
    fn avro_record_names() {
        let schema = r#"{"type":"record","name":"Order","namespace":"com.shop","fields":[]}"#;
        assert_eq!(record_name(SchemaType::Avro, schema), "com.shop.Order");

        let schema = r#"{"type":"record","name":"com.shop.Order","namespace":"ignored"}"#;
        assert_eq!(record_name(SchemaType::Avro, schema), "com.shop.Order");

        let schema = r#"{"type":"record","name":"Order"}"#;
        assert_eq!(record_name(SchemaType::Avro, schema), "Order");

        assert_eq!(record_name(SchemaType::Avro, r#""string""#), "");
        assert_eq!(record_name(SchemaType::Avro, "not json"), "");
    }

    #[test]
    fn json_schema_title() {
        let schema = r#"{"$schema":"http://json-schema.org/draft-07/schema#","title":"Payment","type":"object"}"#;
        assert_eq!(record_name(SchemaType::Json, schema), "Payment");
        assert_eq!(record_name(SchemaType::Json, r#"{"type":"object"}"#), "");
    }

    #[test]
    fn protobuf_first_message() {
        let schema = "syntax = \"proto3\";\npackage shop.v1;\n\nmessage Order {\n  string id = 1;\n}\nmessage Other {}";
        assert_eq!(record_name(SchemaType::Protobuf, schema), "shop.v1.Order");
        assert_eq!(
            record_name(SchemaType::Protobuf, "message Bare{ int32 x = 1; }"),
            "Bare"
        );
    }

    #[test]
    fn base_url_is_normalized() {
        let client = SchemaRegistryClient::new("http://registry:8081/", None).unwrap();
        assert_eq!(client.base_url(), "http://registry:8081");
    }
}
