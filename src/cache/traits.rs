//! Core trait for the namespaced response store.

use async_trait::async_trait;
use color_eyre::Result;

use crate::http::{RequestIdentity, ResponseSnapshot};

/// Durable, namespaced key-value store for response snapshots.
///
/// Namespaces are created lazily on first `open` or write. Each namespace holds
/// at most one entry per request identity; writes overwrite (last write wins).
#[async_trait]
pub trait CacheStore: Send + Sync {
  /// Create the namespace if it does not exist yet.
  async fn open(&self, namespace: &str) -> Result<()>;

  /// Look up an identity across every namespace, oldest namespace first.
  async fn match_any(&self, identity: &RequestIdentity) -> Result<Option<ResponseSnapshot>>;

  /// Look up an identity within a single namespace.
  async fn match_in(
    &self,
    namespace: &str,
    identity: &RequestIdentity,
  ) -> Result<Option<ResponseSnapshot>>;

  /// Store a response, replacing any previous entry for the identity.
  async fn put(
    &self,
    namespace: &str,
    identity: &RequestIdentity,
    response: &ResponseSnapshot,
  ) -> Result<()>;

  /// Store several responses at once. Either all entries land or none do
  /// when the backend supports transactions.
  async fn put_all(
    &self,
    namespace: &str,
    entries: &[(RequestIdentity, ResponseSnapshot)],
  ) -> Result<()> {
    self.open(namespace).await?;
    for (identity, response) in entries {
      self.put(namespace, identity, response).await?;
    }
    Ok(())
  }

  /// Names of every existing namespace, in creation order.
  async fn list_namespaces(&self) -> Result<Vec<String>>;

  /// Drop a namespace and all its entries. Returns whether it existed.
  async fn delete(&self, namespace: &str) -> Result<bool>;

  /// Number of entries held by a namespace (0 if it does not exist).
  async fn entry_count(&self, namespace: &str) -> Result<usize>;
}
