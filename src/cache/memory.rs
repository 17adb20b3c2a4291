//! In-process cache store, lost when the process exits.

use async_trait::async_trait;
use color_eyre::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::traits::CacheStore;
use crate::http::{RequestIdentity, ResponseSnapshot};

struct Namespace {
  name: String,
  entries: HashMap<RequestIdentity, ResponseSnapshot>,
}

/// Cache store backed by process memory. Namespaces keep creation order.
#[derive(Default)]
pub struct MemoryStore {
  namespaces: RwLock<Vec<Namespace>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn position(namespaces: &[Namespace], name: &str) -> Option<usize> {
  namespaces.iter().position(|ns| ns.name == name)
}

fn ensure<'a>(namespaces: &'a mut Vec<Namespace>, name: &str) -> &'a mut Namespace {
  let index = match position(namespaces, name) {
    Some(index) => index,
    None => {
      namespaces.push(Namespace {
        name: name.to_string(),
        entries: HashMap::new(),
      });
      namespaces.len() - 1
    }
  };
  &mut namespaces[index]
}

#[async_trait]
impl CacheStore for MemoryStore {
  async fn open(&self, namespace: &str) -> Result<()> {
    ensure(&mut *self.namespaces.write().await, namespace);
    Ok(())
  }

  async fn match_any(&self, identity: &RequestIdentity) -> Result<Option<ResponseSnapshot>> {
    let namespaces = self.namespaces.read().await;
    Ok(
      namespaces
        .iter()
        .find_map(|ns| ns.entries.get(identity))
        .cloned(),
    )
  }

  async fn match_in(
    &self,
    namespace: &str,
    identity: &RequestIdentity,
  ) -> Result<Option<ResponseSnapshot>> {
    let namespaces = self.namespaces.read().await;
    Ok(
      position(&namespaces, namespace)
        .and_then(|index| namespaces[index].entries.get(identity))
        .cloned(),
    )
  }

  async fn put(
    &self,
    namespace: &str,
    identity: &RequestIdentity,
    response: &ResponseSnapshot,
  ) -> Result<()> {
    let mut namespaces = self.namespaces.write().await;
    ensure(&mut namespaces, namespace)
      .entries
      .insert(identity.clone(), response.clone());
    Ok(())
  }

  async fn put_all(
    &self,
    namespace: &str,
    entries: &[(RequestIdentity, ResponseSnapshot)],
  ) -> Result<()> {
    let mut namespaces = self.namespaces.write().await;
    let ns = ensure(&mut namespaces, namespace);
    for (identity, response) in entries {
      ns.entries.insert(identity.clone(), response.clone());
    }
    Ok(())
  }

  async fn list_namespaces(&self) -> Result<Vec<String>> {
    let namespaces = self.namespaces.read().await;
    Ok(namespaces.iter().map(|ns| ns.name.clone()).collect())
  }

  async fn delete(&self, namespace: &str) -> Result<bool> {
    let mut namespaces = self.namespaces.write().await;
    match position(&namespaces, namespace) {
      Some(index) => {
        namespaces.remove(index);
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn entry_count(&self, namespace: &str) -> Result<usize> {
    let namespaces = self.namespaces.read().await;
    Ok(
      position(&namespaces, namespace)
        .map(|index| namespaces[index].entries.len())
        .unwrap_or(0),
    )
  }
}
