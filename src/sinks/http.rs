//! HTTP-backed spreadsheet and blob collaborators
//!
//! Both talk JSON to a small bridge service that owns the real credentials:
//!
//! - `GET  {base}/destinations` → `["INGRESOS_F", ...]`
//! - `POST {base}/append` with `{"destination", "row"}`
//! - `POST {base}/upload` with `{"url"}` → `{"link"}`

use super::{BlobStore, Sink};
use crate::error::LedgerError;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
struct BridgeClient {
    client: Client,
    base_url: String,
}

impl BridgeClient {
    fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::read_json(path, response).await
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value> {
        let response = self
            .client
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        Self::read_json(path, response).await
    }

    async fn read_json(path: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(LedgerError::SinkFailure(format!(
                "bridge returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }
}

#[derive(Serialize)]
struct AppendRequest<'a> {
    destination: &'a str,
    row: &'a [String],
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    link: String,
}

/// Spreadsheet sink behind the bridge service
pub struct HttpSink {
    api: BridgeClient,
}

impl HttpSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api: BridgeClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait::async_trait]
impl Sink for HttpSink {
    async fn known_destinations(&self) -> Result<HashSet<String>> {
        let body = self.api.get_json("/destinations").await?;
        let names: Vec<String> = serde_json::from_value(body)?;
        Ok(names.into_iter().collect())
    }

    async fn append(&self, destination: &str, row: &[String]) -> Result<()> {
        debug!(destination, cells = row.len(), "Appending row");
        self.api
            .post_json("/append", &AppendRequest { destination, row })
            .await
            .map_err(|e| match e {
                LedgerError::SinkFailure(_) => e,
                other => LedgerError::SinkFailure(other.to_string()),
            })?;
        Ok(())
    }
}

/// Blob store behind the bridge service
pub struct HttpBlobStore {
    api: BridgeClient,
}

impl HttpBlobStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api: BridgeClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, remote_url: &str) -> Result<String> {
        let body = self
            .api
            .post_json("/upload", &UploadRequest { url: remote_url })
            .await
            .map_err(|e| LedgerError::UploadFailure(e.to_string()))?;

        let parsed: UploadResponse = serde_json::from_value(body)
            .map_err(|e| LedgerError::UploadFailure(format!("invalid upload response: {}", e)))?;

        if parsed.link.trim().is_empty() {
            return Err(LedgerError::UploadFailure("empty link".to_string()));
        }
        Ok(parsed.link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    /// Bridge stand-in: knows `A` and `B`, rejects appends to `B`, returns an
    /// empty link for urls containing `empty`.
    async fn spawn_bridge() -> String {
        async fn destinations() -> Json<Value> {
            Json(json!(["A", "B"]))
        }

        async fn append(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            if body["destination"] == "B" {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "quota"})))
            } else {
                (StatusCode::OK, Json(json!({"ok": true})))
            }
        }

        async fn upload(Json(body): Json<Value>) -> Json<Value> {
            let url = body["url"].as_str().unwrap_or_default();
            if url.contains("empty") {
                Json(json!({"link": ""}))
            } else {
                Json(json!({"link": "https://files.example/1"}))
            }
        }

        let router = Router::new()
            .route("/destinations", get(destinations))
            .route("/append", post(append))
            .route("/upload", post(upload));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_sink_against_bridge() {
        let base = spawn_bridge().await;
        let sink = HttpSink::new(&base, Duration::from_secs(2)).unwrap();

        let known = sink.known_destinations().await.unwrap();
        assert_eq!(known, ["A", "B"].into_iter().map(String::from).collect());

        assert!(sink.append("A", &["x".to_string()]).await.is_ok());

        match sink.append("B", &["x".to_string()]).await {
            Err(LedgerError::SinkFailure(reason)) => assert!(reason.contains("500"), "{}", reason),
            other => panic!("expected SinkFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_blob_store_against_bridge() {
        let base = spawn_bridge().await;
        let blobs = HttpBlobStore::new(&base, Duration::from_secs(2)).unwrap();

        assert_eq!(
            blobs.upload("https://media.example/ok.jpg").await.unwrap(),
            "https://files.example/1"
        );
        assert!(matches!(
            blobs.upload("https://media.example/empty.jpg").await,
            Err(LedgerError::UploadFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_a_sink_failure() {
        // nothing listens on the discard port
        let sink = HttpSink::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            sink.append("A", &[]).await,
            Err(LedgerError::SinkFailure(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = BridgeClient::new("http://localhost:9000/", Duration::from_secs(1));
        let client = match client {
            Ok(c) => c,
            Err(e) => panic!("client should build: {}", e),
        };
        assert_eq!(client.url("/append"), "http://localhost:9000/append");
    }

    #[test]
    fn test_append_request_shape() {
        let row = vec!["ID: F".to_string()];
        let json = serde_json::to_value(AppendRequest {
            destination: "CODIGOS_F",
            row: &row,
        });
        assert_eq!(
            json.ok(),
            Some(serde_json::json!({"destination": "CODIGOS_F", "row": ["ID: F"]}))
        );
    }
}
