//! Cache layer that runs the three caching strategies against a store and
//! the network.

use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::traits::CacheStore;
use crate::classify::Strategy;
use crate::config::Config;
use crate::http::{
  FetchOutcome, Origin, Request, ResponseSnapshot, ResponseSource, OFFLINE_ASSET_BODY,
  OFFLINE_CONTENT_BODY,
};
use crate::network::Network;
use crate::tasks::BackgroundTasks;

/// Current namespace names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
  /// Pre-warmed at install, written by cache-first
  pub static_assets: String,
  /// Written by stale-while-revalidate
  pub dynamic: String,
  /// Written by network-first
  pub api: String,
}

impl Namespaces {
  pub fn from_config(config: &Config) -> Self {
    Self {
      static_assets: config.static_namespace(),
      dynamic: config.dynamic_namespace().to_string(),
      api: config.api_namespace().to_string(),
    }
  }

  pub fn contains(&self, name: &str) -> bool {
    name == self.static_assets || name == self.dynamic || name == self.api
  }
}

/// Cache layer that manages caching logic and network fetching.
///
/// Every method resolves to a response: network and store failures are
/// logged and turned into cache misses or synthesized offline responses.
pub struct CacheLayer {
  store: Arc<dyn CacheStore>,
  network: Arc<dyn Network>,
  origin: Origin,
  namespaces: Namespaces,
  tasks: BackgroundTasks,
}

impl CacheLayer {
  pub fn new(
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    origin: Origin,
    namespaces: Namespaces,
    tasks: BackgroundTasks,
  ) -> Self {
    Self {
      store,
      network,
      origin,
      namespaces,
      tasks,
    }
  }

  pub fn namespaces(&self) -> &Namespaces {
    &self.namespaces
  }

  /// Run the given strategy for a request.
  pub async fn handle(&self, strategy: Strategy, request: &Request) -> FetchOutcome {
    match strategy {
      Strategy::CacheFirst => self.cache_first(request).await,
      Strategy::NetworkFirst => self.network_first(request).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
    }
  }

  /// Serve from any namespace; on a miss fetch and store into the static
  /// namespace.
  ///
  /// A failed fetch, or a failed write of the fetched response, yields the
  /// offline asset response.
  pub async fn cache_first(&self, request: &Request) -> FetchOutcome {
    let identity = self.origin.identity(request);

    match self.store.match_any(&identity).await {
      Ok(Some(cached)) => {
        debug!(request = %identity, "Cache hit");
        return FetchOutcome::from_cache(cached);
      }
      Ok(None) => debug!(request = %identity, "Cache miss"),
      Err(e) => warn!(request = %identity, error = %e, "Cache lookup failed, treating as miss"),
    }

    let response = match self.network.fetch(request).await {
      Ok(response) => response,
      Err(e) => {
        warn!(request = %identity, error = %e, "Fetch failed, serving offline response");
        return FetchOutcome::offline(OFFLINE_ASSET_BODY);
      }
    };

    if response.is_ok() {
      if let Err(e) = self
        .store
        .put(&self.namespaces.static_assets, &identity, &response)
        .await
      {
        warn!(request = %identity, error = %e, "Failed to cache asset, serving offline response");
        return FetchOutcome::offline(OFFLINE_ASSET_BODY);
      }
    }

    FetchOutcome::from_network(response)
  }

  /// Always try the network first; the api namespace is only a fallback.
  pub async fn network_first(&self, request: &Request) -> FetchOutcome {
    let identity = self.origin.identity(request);

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          if let Err(e) = self
            .store
            .put(&self.namespaces.api, &identity, &response)
            .await
          {
            warn!(request = %identity, error = %e, "Failed to cache API response");
          }
        }
        FetchOutcome::from_network(response)
      }
      Err(e) => {
        info!(request = %identity, error = %e, "Fetch failed, falling back to cache");

        match self.store.match_in(&self.namespaces.api, &identity).await {
          Ok(Some(cached)) => FetchOutcome::from_cache(cached),
          Ok(None) => FetchOutcome::offline(OFFLINE_CONTENT_BODY),
          Err(e) => {
            warn!(request = %identity, error = %e, "Cache lookup failed");
            FetchOutcome::offline(OFFLINE_CONTENT_BODY)
          }
        }
      }
    }
  }

  /// Answer from the dynamic namespace when possible, refreshing it in the
  /// background either way.
  ///
  /// On a cold cache the caller gets the refresh fetch's own result.
  pub async fn stale_while_revalidate(&self, request: &Request) -> FetchOutcome {
    let identity = self.origin.identity(request);

    let cached = match self.store.match_in(&self.namespaces.dynamic, &identity).await {
      Ok(cached) => cached,
      Err(e) => {
        warn!(request = %identity, error = %e, "Cache lookup failed, treating as miss");
        None
      }
    };

    let fetched = self.spawn_revalidate(request.clone());

    if let Some(cached) = cached {
      debug!(request = %identity, "Serving cached copy while revalidating");
      return FetchOutcome::from_cache(cached);
    }

    match fetched.await {
      Ok(Some(response)) => FetchOutcome::from_network(response),
      _ => {
        warn!(request = %identity, "Cold cache and fetch failed, serving offline response");
        FetchOutcome::offline(OFFLINE_CONTENT_BODY)
      }
    }
  }

  /// Fetch and overwrite the dynamic entry in a tracked task. The fetched
  /// response (or `None` on failure) is handed to whoever still waits.
  ///
  /// Only a 2xx response replaces the entry: a 4xx or 5xx is handed to a
  /// cold-cache caller but never overwrites a stale copy.
  fn spawn_revalidate(&self, request: Request) -> oneshot::Receiver<Option<ResponseSnapshot>> {
    let (tx, rx) = oneshot::channel();
    let store = Arc::clone(&self.store);
    let network = Arc::clone(&self.network);
    let namespace = self.namespaces.dynamic.clone();
    let identity = self.origin.identity(&request);

    self.tasks.spawn("revalidate", async move {
      let response = match network.fetch(&request).await {
        Ok(response) => response,
        Err(e) => {
          // Ignore send errors - caller may have been served from cache
          let _ = tx.send(None);
          return Err(e);
        }
      };

      let _ = tx.send(Some(response.clone()));

      if response.is_ok() {
        store.put(&namespace, &identity, &response).await?;
        debug!(request = %identity, namespace = %namespace, "Revalidated");
      }
      Ok(())
    });

    rx
  }

  /// Forward a request untouched; used before the worker controls traffic.
  pub async fn passthrough(&self, request: &Request) -> FetchOutcome {
    match self.network.fetch(request).await {
      Ok(response) => FetchOutcome {
        response,
        source: ResponseSource::Passthrough,
      },
      Err(e) => {
        warn!(url = %request.url, error = %e, "Passthrough fetch failed");
        FetchOutcome::offline(OFFLINE_CONTENT_BODY)
      }
    }
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      network: Arc::clone(&self.network),
      origin: self.origin.clone(),
      namespaces: self.namespaces.clone(),
      tasks: self.tasks.clone(),
    }
  }
}
