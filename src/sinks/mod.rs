//! Spreadsheet and blob collaborators
//!
//! The engine only ever sees the two traits below. The in-memory sink backs
//! the console driver and tests; HTTP clients live in [`http`].

use crate::error::LedgerError;
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod http;
pub use http::{HttpBlobStore, HttpSink};

/// Append-only row store keyed by destination (sheet/tab) name.
///
/// At-least-once: nothing here deduplicates rows.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn known_destinations(&self) -> Result<HashSet<String>>;
    async fn append(&self, destination: &str, row: &[String]) -> Result<()>;
}

/// Re-hosts a remote attachment and returns a shareable link.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, remote_url: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedRow {
    pub destination: String,
    pub row: Vec<String>,
}

/// In-memory sink
pub struct InMemorySink {
    known: HashSet<String>,
    failing: HashSet<String>,
    rows: Arc<RwLock<Vec<AppendedRow>>>,
}

impl InMemorySink {
    pub fn new<I, S>(destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: destinations.into_iter().map(Into::into).collect(),
            failing: HashSet::new(),
            rows: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Known destination whose appends always fail.
    pub fn with_failing(mut self, destination: &str) -> Self {
        self.known.insert(destination.to_string());
        self.failing.insert(destination.to_string());
        self
    }

    pub async fn rows(&self) -> Vec<AppendedRow> {
        self.rows.read().await.clone()
    }

    pub async fn rows_for(&self, destination: &str) -> Vec<Vec<String>> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|r| r.destination == destination)
            .map(|r| r.row.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Sink for InMemorySink {
    async fn known_destinations(&self) -> Result<HashSet<String>> {
        Ok(self.known.clone())
    }

    async fn append(&self, destination: &str, row: &[String]) -> Result<()> {
        if !self.known.contains(destination) {
            return Err(LedgerError::UnknownDestination(destination.to_string()));
        }
        if self.failing.contains(destination) {
            return Err(LedgerError::SinkFailure(format!(
                "{} rejected the row",
                destination
            )));
        }

        let mut rows = self.rows.write().await;
        rows.push(AppendedRow {
            destination: destination.to_string(),
            row: row.to_vec(),
        });
        Ok(())
    }
}

/// Used when no blob service is configured: every upload fails, which the
/// engine turns into an empty link.
pub struct DisabledBlobStore;

#[async_trait::async_trait]
impl BlobStore for DisabledBlobStore {
    async fn upload(&self, _remote_url: &str) -> Result<String> {
        Err(LedgerError::UploadFailure(
            "LEDGER_BLOB_URL is not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_sink_records_rows() {
        let sink = InMemorySink::new(["A", "B"]);
        let row = vec!["x".to_string(), "y".to_string()];

        assert!(sink.append("A", &row).await.is_ok());
        assert!(matches!(
            sink.append("Z", &row).await,
            Err(LedgerError::UnknownDestination(_))
        ));

        assert_eq!(sink.rows_for("A").await, vec![row]);
        assert!(sink.rows_for("B").await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_destination_is_known_but_rejects() {
        let sink = InMemorySink::new(["A"]).with_failing("B");
        let known = sink.known_destinations().await.unwrap_or_default();
        assert!(known.contains("B"));
        assert!(matches!(
            sink.append("B", &[]).await,
            Err(LedgerError::SinkFailure(_))
        ));
        assert!(sink.rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_blob_store_fails() {
        assert!(matches!(
            DisabledBlobStore.upload("https://example.com/a.jpg").await,
            Err(LedgerError::UploadFailure(_))
        ));
    }
}
