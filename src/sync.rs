//! Deferred delivery of work queued while offline.
//!
//! The queue does not persist anything itself: pending items come from a
//! `PendingStore`, and retries are left to whoever fires the next sync event.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::http::Request;
use crate::network::Network;

/// One unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSyncItem {
  pub id: String,
  /// URL the item is delivered to
  pub destination: String,
  #[serde(default = "default_method")]
  pub method: String,
  #[serde(default)]
  pub body: Option<String>,
}

fn default_method() -> String {
  "POST".to_string()
}

impl PendingSyncItem {
  fn to_request(&self) -> Request {
    let request = Request::new(self.method.as_str(), self.destination.as_str());
    match &self.body {
      Some(body) => request
        .with_header("content-type", "application/json")
        .with_body(body.as_bytes()),
      None => request,
    }
  }
}

/// Source of pending items.
#[async_trait]
pub trait PendingStore: Send + Sync {
  async fn get_pending_items(&self) -> Result<Vec<PendingSyncItem>>;
}

/// Placeholder source that never has pending work.
pub struct StubPendingStore;

#[async_trait]
impl PendingStore for StubPendingStore {
  async fn get_pending_items(&self) -> Result<Vec<PendingSyncItem>> {
    Ok(Vec::new())
  }
}

/// Pending items read from a JSON array on disk. A missing file means
/// nothing is pending.
pub struct JsonFilePendingStore {
  path: PathBuf,
}

impl JsonFilePendingStore {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }
}

#[async_trait]
impl PendingStore for JsonFilePendingStore {
  async fn get_pending_items(&self) -> Result<Vec<PendingSyncItem>> {
    let contents = match tokio::fs::read_to_string(&self.path).await {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => {
        return Err(eyre!(
          "Failed to read pending items {}: {}",
          self.path.display(),
          e
        ))
      }
    };

    serde_json::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse pending items {}: {}", self.path.display(), e))
  }
}

/// Result of one sync invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub attempted: usize,
  pub delivered: Vec<String>,
  pub failed: Vec<String>,
}

pub struct BackgroundSyncQueue {
  tag: String,
  pending: Arc<dyn PendingStore>,
  network: Arc<dyn Network>,
}

impl BackgroundSyncQueue {
  pub fn new(
    tag: impl Into<String>,
    pending: Arc<dyn PendingStore>,
    network: Arc<dyn Network>,
  ) -> Self {
    Self {
      tag: tag.into(),
      pending,
      network,
    }
  }

  pub fn tag(&self) -> &str {
    &self.tag
  }

  /// Whether a sync event with this tag is ours.
  pub fn handles(&self, tag: &str) -> bool {
    tag == self.tag
  }

  /// Deliver every pending item once. Failed items are reported, not retried.
  pub async fn run(&self) -> Result<SyncReport> {
    let items = self.pending.get_pending_items().await?;
    let mut report = SyncReport {
      attempted: items.len(),
      ..SyncReport::default()
    };

    if items.is_empty() {
      debug!(tag = %self.tag, "Nothing pending");
      return Ok(report);
    }

    for item in items {
      match self.network.fetch(&item.to_request()).await {
        Ok(response) if response.is_ok() => {
          debug!(id = %item.id, "Delivered pending item");
          report.delivered.push(item.id);
        }
        Ok(response) => {
          warn!(id = %item.id, status = response.status, "Pending item rejected");
          report.failed.push(item.id);
        }
        Err(e) => {
          warn!(id = %item.id, error = %e, "Pending item delivery failed");
          report.failed.push(item.id);
        }
      }
    }

    info!(
      tag = %self.tag,
      delivered = report.delivered.len(),
      failed = report.failed.len(),
      "Background sync finished"
    );
    Ok(report)
  }
}
