//! Install and activate: pre-warming the static namespace, sweeping old
//! namespaces and taking control of traffic.

use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, try_join_all};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, Namespaces};
use crate::http::{Origin, Request};
use crate::network::Network;

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Constructed, nothing run yet
  Parsed,
  /// Pre-warming the static namespace
  Installing,
  /// Installed and ready to activate without waiting
  Installed,
  /// Sweeping old namespaces
  Activating,
  /// Controlling all in-scope traffic
  Activated,
  /// Install failed; the previous worker stays in control
  Redundant,
}

impl WorkerState {
  /// Whether fetches are routed through the caching strategies.
  pub fn controls_traffic(&self) -> bool {
    matches!(self, WorkerState::Activated)
  }
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub namespace: String,
  pub cached: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
  /// Namespaces removed by the sweep
  pub deleted: Vec<String>,
  /// Namespaces whose deletion failed and were left in place
  pub failed: Vec<String>,
}

pub struct LifecycleManager {
  store: Arc<dyn CacheStore>,
  network: Arc<dyn Network>,
  origin: Origin,
  namespaces: Namespaces,
  static_assets: Vec<String>,
  state: Mutex<WorkerState>,
}

impl LifecycleManager {
  pub fn new(
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    origin: Origin,
    namespaces: Namespaces,
    static_assets: Vec<String>,
  ) -> Self {
    Self {
      store,
      network,
      origin,
      namespaces,
      static_assets,
      state: Mutex::new(WorkerState::Parsed),
    }
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, next: WorkerState) {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    let current = *state;
    debug!(from = %current, to = %next, "Worker state change");
    *state = next;
  }

  /// Move to `next` if the current state is `expected`.
  fn transition(&self, expected: WorkerState, next: WorkerState) -> Result<()> {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    let current = *state;
    if current != expected {
      return Err(eyre!("Cannot move to {} from {}", next, current));
    }
    debug!(from = %current, to = %next, "Worker state change");
    *state = next;
    Ok(())
  }

  /// Pick up a worker of this build that was activated by an earlier run.
  ///
  /// Returns true when the static namespace already exists, in which case
  /// the worker controls traffic straight away.
  pub async fn resume(&self) -> Result<bool> {
    let existing = self.store.list_namespaces().await?;
    if existing.contains(&self.namespaces.static_assets) {
      self.transition(WorkerState::Parsed, WorkerState::Activated)?;
      info!(namespace = %self.namespaces.static_assets, "Resumed active worker");
      Ok(true)
    } else {
      Ok(false)
    }
  }

  /// Pre-warm the static namespace with every static asset.
  ///
  /// All-or-nothing: if any asset fails to fetch (or answers non-2xx) nothing
  /// is written and the worker becomes redundant.
  pub async fn install(&self) -> Result<InstallReport> {
    self.transition(WorkerState::Parsed, WorkerState::Installing)?;

    match self.precache().await {
      Ok(cached) => {
        // Skip waiting: ready to activate without draining the old worker
        self.set_state(WorkerState::Installed);
        info!(namespace = %self.namespaces.static_assets, cached, "Installed");
        Ok(InstallReport {
          namespace: self.namespaces.static_assets.clone(),
          cached,
        })
      }
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        warn!(error = %e, "Install failed, previous worker stays in control");
        Err(e)
      }
    }
  }

  async fn precache(&self) -> Result<usize> {
    let fetches = self.static_assets.iter().map(|url| {
      let network = Arc::clone(&self.network);
      let request = Request::get(url.as_str());
      let identity = self.origin.identity(&request);
      async move {
        let response = network.fetch(&request).await?;
        if !response.is_ok() {
          return Err(eyre!(
            "Static asset {} answered {} {}",
            url,
            response.status,
            response.status_text
          ));
        }
        Ok::<_, color_eyre::Report>((identity, response))
      }
    });

    let entries = try_join_all(fetches).await?;

    self.store.open(&self.namespaces.static_assets).await?;
    self
      .store
      .put_all(&self.namespaces.static_assets, &entries)
      .await?;

    Ok(entries.len())
  }

  /// Delete every namespace outside the allow-list, then claim clients.
  ///
  /// Deletions run concurrently and are best-effort; only a failure to list
  /// namespaces fails activation.
  pub async fn activate(&self) -> Result<ActivateReport> {
    self.transition(WorkerState::Installed, WorkerState::Activating)?;

    let existing = match self.store.list_namespaces().await {
      Ok(existing) => existing,
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        return Err(e);
      }
    };

    let stale: Vec<String> = existing
      .into_iter()
      .filter(|name| !self.namespaces.contains(name))
      .collect();

    let results = join_all(stale.iter().map(|name| self.store.delete(name))).await;

    let mut report = ActivateReport {
      deleted: Vec::new(),
      failed: Vec::new(),
    };
    for (name, result) in stale.into_iter().zip(results) {
      match result {
        Ok(_) => {
          info!(namespace = %name, "Deleted old namespace");
          report.deleted.push(name);
        }
        Err(e) => {
          warn!(namespace = %name, error = %e, "Failed to delete old namespace");
          report.failed.push(name);
        }
      }
    }

    // Claim clients: intercept from now on, no reload needed
    self.set_state(WorkerState::Activated);
    info!(deleted = report.deleted.len(), "Activated and claimed clients");

    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::http::{RequestIdentity, ResponseSnapshot};
  use crate::testing::{BrokenStore, FakeNetwork};

  fn namespaces(build: &str) -> Namespaces {
    Namespaces {
      static_assets: format!("static-{}", build),
      dynamic: "dynamic-v1".to_string(),
      api: "api-v1".to_string(),
    }
  }

  fn manager(
    store: Arc<dyn CacheStore>,
    network: Arc<FakeNetwork>,
    build: &str,
  ) -> LifecycleManager {
    LifecycleManager::new(
      store,
      network,
      Origin::parse("http://localhost:8080").unwrap(),
      namespaces(build),
      vec!["/".to_string(), "/index.html".to_string()],
    )
  }

  #[tokio::test]
  async fn test_install_precaches_every_asset() {
    let store = Arc::new(MemoryStore::new());
    let network = Arc::new(FakeNetwork::new());
    network.respond("/", 200, "root");
    network.respond("/index.html", 200, "index");
    let lifecycle = manager(store.clone(), network, "v1");

    let report = lifecycle.install().await.unwrap();

    assert_eq!(report.cached, 2);
    assert_eq!(lifecycle.state(), WorkerState::Installed);
    assert_eq!(store.entry_count("static-v1").await.unwrap(), 2);
    let root = store
      .match_in("static-v1", &RequestIdentity::new("GET", "http://localhost:8080/"))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(root.text(), "root");
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let store = Arc::new(MemoryStore::new());
    let network = Arc::new(FakeNetwork::new());
    network.respond("/", 200, "root");
    network.fail("/index.html");
    let lifecycle = manager(store.clone(), network, "v1");

    assert!(lifecycle.install().await.is_err());
    assert_eq!(lifecycle.state(), WorkerState::Redundant);
    assert_eq!(store.entry_count("static-v1").await.unwrap(), 0);
    assert!(lifecycle.activate().await.is_err());
  }

  #[tokio::test]
  async fn test_install_rejects_error_status() {
    let store = Arc::new(MemoryStore::new());
    let network = Arc::new(FakeNetwork::new());
    network.respond("/", 200, "root");
    // /index.html is unrouted and answers 404
    let lifecycle = manager(store.clone(), network, "v1");

    assert!(lifecycle.install().await.is_err());
    assert!(store.list_namespaces().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_activate_sweeps_old_namespaces() {
    let store = Arc::new(MemoryStore::new());
    let entry = ResponseSnapshot::new(200, "x");
    let id = RequestIdentity::new("GET", "/");
    store.put("static-v1", &id, &entry).await.unwrap();
    store.put("dynamic-v1", &id, &entry).await.unwrap();

    let network = Arc::new(FakeNetwork::new());
    network.respond("/", 200, "root");
    network.respond("/index.html", 200, "index");
    let lifecycle = manager(store.clone(), network, "v2");

    lifecycle.install().await.unwrap();
    let report = lifecycle.activate().await.unwrap();

    assert_eq!(report.deleted, vec!["static-v1"]);
    assert!(report.failed.is_empty());
    assert_eq!(
      store.list_namespaces().await.unwrap(),
      vec!["dynamic-v1", "static-v2"]
    );
    assert_eq!(lifecycle.state(), WorkerState::Activated);
    assert!(lifecycle.state().controls_traffic());
  }

  #[tokio::test]
  async fn test_activate_requires_install() {
    let lifecycle = manager(
      Arc::new(MemoryStore::new()),
      Arc::new(FakeNetwork::new()),
      "v1",
    );
    assert!(lifecycle.activate().await.is_err());
    assert_eq!(lifecycle.state(), WorkerState::Parsed);
  }

  #[tokio::test]
  async fn test_install_with_broken_store_fails() {
    let network = Arc::new(FakeNetwork::new());
    network.respond("/", 200, "root");
    network.respond("/index.html", 200, "index");
    let lifecycle = manager(Arc::new(BrokenStore), network, "v1");

    assert!(lifecycle.install().await.is_err());
    assert_eq!(lifecycle.state(), WorkerState::Redundant);
  }

  #[tokio::test]
  async fn test_resume_only_with_existing_static_namespace() {
    let store = Arc::new(MemoryStore::new());
    let network = Arc::new(FakeNetwork::new());

    let fresh = manager(store.clone(), network.clone(), "v1");
    assert!(!fresh.resume().await.unwrap());
    assert_eq!(fresh.state(), WorkerState::Parsed);

    store.open("static-v1").await.unwrap();
    let resumed = manager(store, network, "v1");
    assert!(resumed.resume().await.unwrap());
    assert_eq!(resumed.state(), WorkerState::Activated);
  }
}
