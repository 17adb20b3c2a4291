//! The worker: one entry point routing typed events to the lifecycle,
//! caching strategies, background sync and push components.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheLayer, CacheStore, Namespaces};
use crate::classify::Classifier;
use crate::config::Config;
use crate::event::{EventOutcome, WorkerEvent};
use crate::http::{FetchOutcome, Request};
use crate::lifecycle::{LifecycleManager, WorkerState};
use crate::network::Network;
use crate::push::{Presenter, PushNotificationDispatcher};
use crate::sync::{BackgroundSyncQueue, PendingStore};
use crate::tasks::BackgroundTasks;

/// External collaborators the worker talks to.
pub struct Collaborators {
  pub store: Arc<dyn CacheStore>,
  pub network: Arc<dyn Network>,
  pub pending: Arc<dyn PendingStore>,
  pub presenter: Arc<dyn Presenter>,
}

pub struct Worker {
  config: Arc<Config>,
  store: Arc<dyn CacheStore>,
  classifier: Classifier,
  cache: CacheLayer,
  lifecycle: LifecycleManager,
  sync: BackgroundSyncQueue,
  push: PushNotificationDispatcher,
  tasks: BackgroundTasks,
}

impl Worker {
  pub fn new(config: Arc<Config>, collaborators: Collaborators) -> Result<Self> {
    let Collaborators {
      store,
      network,
      pending,
      presenter,
    } = collaborators;

    let origin = config.parsed_origin()?;
    let namespaces = Namespaces::from_config(&config);
    let tasks = BackgroundTasks::new();

    Ok(Self {
      classifier: Classifier::from_config(&config),
      cache: CacheLayer::new(
        Arc::clone(&store),
        Arc::clone(&network),
        origin.clone(),
        namespaces.clone(),
        tasks.clone(),
      ),
      lifecycle: LifecycleManager::new(
        Arc::clone(&store),
        Arc::clone(&network),
        origin,
        namespaces,
        config.static_assets.clone(),
      ),
      sync: BackgroundSyncQueue::new(config.sync.tag.clone(), pending, network),
      push: PushNotificationDispatcher::new(config.notifications.clone(), presenter),
      store,
      tasks,
      config,
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn state(&self) -> WorkerState {
    self.lifecycle.state()
  }

  /// Take over from an earlier run of the same build, if there was one.
  pub async fn resume(&self) -> Result<bool> {
    self.lifecycle.resume().await
  }

  /// Handle one event.
  ///
  /// Only install and activate can fail the worker itself; fetch always
  /// resolves to a response.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
    debug!(event = event.name(), state = %self.state(), "Dispatching event");

    match event {
      WorkerEvent::Install => Ok(EventOutcome::Installed(self.lifecycle.install().await?)),
      WorkerEvent::Activate => Ok(EventOutcome::Activated(self.lifecycle.activate().await?)),
      WorkerEvent::Fetch(request) => Ok(EventOutcome::Response(self.fetch(&request).await)),
      WorkerEvent::Sync { tag } => {
        if self.sync.handles(&tag) {
          Ok(EventOutcome::Synced(self.sync.run().await?))
        } else {
          info!(tag = %tag, "Ignoring sync event");
          Ok(EventOutcome::SyncIgnored { tag })
        }
      }
      WorkerEvent::Push { payload } => Ok(EventOutcome::Notified(
        self.push.on_push(payload.as_deref()).await?,
      )),
      WorkerEvent::NotificationClick { action } => Ok(EventOutcome::Clicked(
        self.push.on_click(action.as_deref()).await?,
      )),
    }
  }

  /// Satisfy a request. Before activation requests go straight to the
  /// network.
  pub async fn fetch(&self, request: &Request) -> FetchOutcome {
    if !self.state().controls_traffic() {
      return self.cache.passthrough(request).await;
    }

    let strategy = self.classifier.classify(request);
    debug!(url = %request.url, strategy = %strategy, "Classified request");
    self.cache.handle(strategy, request).await
  }

  /// Wait for background work (cache refreshes) to finish.
  pub async fn settle(&self) {
    self.tasks.settle().await;
  }

  /// Every namespace with its entry count.
  pub async fn namespaces(&self) -> Result<Vec<(String, usize)>> {
    let mut summary = Vec::new();
    for name in self.store.list_namespaces().await? {
      let count = self.store.entry_count(&name).await?;
      summary.push((name, count));
    }
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::http::{RequestIdentity, ResponseSnapshot, ResponseSource};
  use crate::push::ClickOutcome;
  use crate::sync::StubPendingStore;
  use crate::testing::{FakeNetwork, Presented, RecordingPresenter};

  struct Harness {
    store: Arc<MemoryStore>,
    network: Arc<FakeNetwork>,
    presenter: Arc<RecordingPresenter>,
    worker: Worker,
  }

  fn harness(yaml: &str) -> Harness {
    let config = Arc::new(Config::from_yaml(yaml).unwrap());
    let store = Arc::new(MemoryStore::new());
    let network = Arc::new(FakeNetwork::new());
    let presenter = Arc::new(RecordingPresenter::new());
    let worker = Worker::new(
      config,
      Collaborators {
        store: store.clone(),
        network: network.clone(),
        pending: Arc::new(StubPendingStore),
        presenter: presenter.clone(),
      },
    )
    .unwrap();
    Harness {
      store,
      network,
      presenter,
      worker,
    }
  }

  const CONFIG: &str = r#"
build: v2
static_assets: ["/", "/index.html"]
api_endpoints: ["https://api.example.com"]
"#;

  async fn activated() -> Harness {
    let h = harness(CONFIG);
    h.network.respond("/", 200, "root");
    h.network.respond("/index.html", 200, "index");
    h.worker.dispatch(WorkerEvent::Install).await.unwrap();
    h.worker.dispatch(WorkerEvent::Activate).await.unwrap();
    h
  }

  async fn fetch(worker: &Worker, url: &str) -> FetchOutcome {
    match worker
      .dispatch(WorkerEvent::Fetch(Request::get(url)))
      .await
      .unwrap()
    {
      EventOutcome::Response(outcome) => outcome,
      other => panic!("unexpected outcome {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_installed_root_is_served_without_network() {
    let h = activated().await;
    let calls_after_install = h.network.calls().len();

    let outcome = fetch(&h.worker, "/").await;

    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.response.text(), "root");
    assert_eq!(h.network.calls().len(), calls_after_install);
    assert_eq!(h.store.entry_count("static-v2").await.unwrap(), 2);
  }

  #[tokio::test]
  async fn test_installed_asset_served_offline_by_absolute_url() {
    let h = activated().await;
    h.network.set_offline(true);

    let index = fetch(&h.worker, "http://localhost:8080/index.html").await;
    let root = fetch(&h.worker, "http://localhost:8080/").await;

    assert_eq!(index.source, ResponseSource::Cache);
    assert_eq!(index.response.text(), "index");
    assert_eq!(root.source, ResponseSource::Cache);
    assert_eq!(root.response.text(), "root");
  }

  #[tokio::test]
  async fn test_invalid_origin_is_rejected() {
    let mut config = Config::default();
    config.origin = "not a url".to_string();

    let worker = Worker::new(
      Arc::new(config),
      Collaborators {
        store: Arc::new(MemoryStore::new()),
        network: Arc::new(FakeNetwork::new()),
        pending: Arc::new(StubPendingStore),
        presenter: Arc::new(RecordingPresenter::new()),
      },
    );

    assert!(worker.is_err());
  }

  #[tokio::test]
  async fn test_activation_leaves_only_current_namespaces() {
    let h = harness(CONFIG);
    let id = RequestIdentity::new("GET", "/");
    let entry = ResponseSnapshot::new(200, "old");
    h.store.put("static-v1", &id, &entry).await.unwrap();
    h.store.put("dynamic-v0", &id, &entry).await.unwrap();
    h.store.put("api-v1", &id, &entry).await.unwrap();
    h.network.respond("/", 200, "root");
    h.network.respond("/index.html", 200, "index");

    h.worker.dispatch(WorkerEvent::Install).await.unwrap();
    let outcome = h.worker.dispatch(WorkerEvent::Activate).await.unwrap();

    match outcome {
      EventOutcome::Activated(report) => {
        assert_eq!(report.deleted, vec!["static-v1", "dynamic-v0"])
      }
      other => panic!("unexpected outcome {:?}", other),
    }
    let names = h.store.list_namespaces().await.unwrap();
    assert!(names.iter().all(|n| h.worker.config().allow_list().contains(n)));
  }

  #[tokio::test]
  async fn test_fetch_before_activation_passes_through() {
    let h = harness(CONFIG);
    h.network.respond("/dashboard", 200, "live");

    let outcome = fetch(&h.worker, "/dashboard").await;

    assert_eq!(outcome.source, ResponseSource::Passthrough);
    assert!(h.store.list_namespaces().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_api_request_offline_without_cache() {
    let h = activated().await;
    h.network.fail("https://api.example.com/data");

    let outcome = fetch(&h.worker, "https://api.example.com/data").await;

    assert_eq!(outcome.response.status, 503);
    assert_eq!(outcome.response.text(), "Content not available offline");
  }

  #[tokio::test]
  async fn test_dashboard_stale_then_fresh() {
    let h = activated().await;
    h.store
      .put(
        "dynamic-v1",
        &RequestIdentity::new("GET", "http://localhost:8080/dashboard"),
        &ResponseSnapshot::new(200, "stale"),
      )
      .await
      .unwrap();
    h.network.respond("/dashboard", 200, "fresh");

    let first = fetch(&h.worker, "/dashboard").await;
    assert_eq!(first.response.text(), "stale");

    h.worker.settle().await;

    let second = fetch(&h.worker, "/dashboard").await;
    assert_eq!(second.response.text(), "fresh");
  }

  #[tokio::test]
  async fn test_sync_with_stub_has_no_work() {
    let h = activated().await;
    let calls = h.network.calls().len();

    let outcome = h
      .worker
      .dispatch(WorkerEvent::Sync {
        tag: "background-sync".to_string(),
      })
      .await
      .unwrap();

    match outcome {
      EventOutcome::Synced(report) => assert_eq!(report.attempted, 0),
      other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(h.network.calls().len(), calls);
  }

  #[tokio::test]
  async fn test_sync_with_other_tag_is_ignored() {
    let h = harness(CONFIG);

    let outcome = h
      .worker
      .dispatch(WorkerEvent::Sync {
        tag: "other".to_string(),
      })
      .await
      .unwrap();

    assert!(matches!(outcome, EventOutcome::SyncIgnored { tag } if tag == "other"));
  }

  #[tokio::test]
  async fn test_push_without_payload_shows_default_message() {
    let h = harness(CONFIG);

    let outcome = h
      .worker
      .dispatch(WorkerEvent::Push { payload: None })
      .await
      .unwrap();

    match outcome {
      EventOutcome::Notified(payload) => {
        assert_eq!(payload.body, h.worker.config().notifications.default_body);
        assert!(!payload.body.is_empty());
      }
      other => panic!("unexpected outcome {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_notification_click_view_focuses_root() {
    let h = harness(CONFIG);

    let outcome = h
      .worker
      .dispatch(WorkerEvent::NotificationClick {
        action: Some("view".to_string()),
      })
      .await
      .unwrap();

    assert!(matches!(outcome, EventOutcome::Clicked(ClickOutcome::Opened(_))));
    assert_eq!(
      h.presenter.log(),
      vec![Presented::Closed, Presented::Focused("/".to_string())]
    );
  }

  #[tokio::test]
  async fn test_namespaces_summary() {
    let h = activated().await;
    let summary = h.worker.namespaces().await.unwrap();
    assert_eq!(summary, vec![("static-v2".to_string(), 2)]);
  }

  #[tokio::test]
  async fn test_resume_controls_traffic() {
    let h = activated().await;

    let second = Worker::new(
      Arc::new(Config::from_yaml(CONFIG).unwrap()),
      Collaborators {
        store: h.store.clone(),
        network: h.network.clone(),
        pending: Arc::new(StubPendingStore),
        presenter: h.presenter.clone(),
      },
    )
    .unwrap();

    assert!(second.resume().await.unwrap());
    assert_eq!(fetch(&second, "/").await.source, ResponseSource::Cache);
  }
}
