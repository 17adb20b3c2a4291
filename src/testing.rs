//! Scripted collaborators shared by unit tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::cache::CacheStore;
use crate::http::{Request, RequestIdentity, ResponseSnapshot};
use crate::network::Network;
use crate::push::{NotificationPayload, Presenter};

/// Network answering from a route table. Unknown URLs get a 404.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, ResponseSnapshot>>,
  failing: Mutex<HashSet<String>>,
  hanging: Mutex<HashSet<String>>,
  calls: Mutex<Vec<Request>>,
  offline: AtomicBool,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, status: u16, body: &str) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), ResponseSnapshot::new(status, body.as_bytes()));
  }

  /// Make fetches of one URL fail at the transport level.
  pub fn fail(&self, url: &str) {
    self.failing.lock().unwrap().insert(url.to_string());
  }

  /// Make fetches of one URL never resolve.
  pub fn hang(&self, url: &str) {
    self.hanging.lock().unwrap().insert(url.to_string());
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<Request> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, url: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url == url)
      .count()
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot> {
    self.calls.lock().unwrap().push(request.clone());

    let hang = self.hanging.lock().unwrap().contains(&request.url);
    if hang {
      std::future::pending::<()>().await;
    }

    let failing = self.failing.lock().unwrap().contains(&request.url);
    if failing || self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable: {}", request.url));
    }

    let route = self.routes.lock().unwrap().get(&request.url).cloned();
    Ok(route.unwrap_or_else(|| ResponseSnapshot::new(404, "not found")))
  }
}

/// Store whose every operation fails.
pub struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
  async fn open(&self, _namespace: &str) -> Result<()> {
    Err(eyre!("store unavailable"))
  }

  async fn match_any(&self, _identity: &RequestIdentity) -> Result<Option<ResponseSnapshot>> {
    Err(eyre!("store unavailable"))
  }

  async fn match_in(
    &self,
    _namespace: &str,
    _identity: &RequestIdentity,
  ) -> Result<Option<ResponseSnapshot>> {
    Err(eyre!("store unavailable"))
  }

  async fn put(
    &self,
    _namespace: &str,
    _identity: &RequestIdentity,
    _response: &ResponseSnapshot,
  ) -> Result<()> {
    Err(eyre!("store unavailable"))
  }

  async fn list_namespaces(&self) -> Result<Vec<String>> {
    Err(eyre!("store unavailable"))
  }

  async fn delete(&self, _namespace: &str) -> Result<bool> {
    Err(eyre!("store unavailable"))
  }

  async fn entry_count(&self, _namespace: &str) -> Result<usize> {
    Err(eyre!("store unavailable"))
  }
}

/// What a presenter was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Presented {
  Shown(NotificationPayload),
  Closed,
  Focused(String),
}

#[derive(Default)]
pub struct RecordingPresenter {
  log: Mutex<Vec<Presented>>,
}

impl RecordingPresenter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn log(&self) -> Vec<Presented> {
    self.log.lock().unwrap().clone()
  }
}

#[async_trait]
impl Presenter for RecordingPresenter {
  async fn show_notification(&self, payload: &NotificationPayload) -> Result<()> {
    self
      .log
      .lock()
      .unwrap()
      .push(Presented::Shown(payload.clone()));
    Ok(())
  }

  async fn close_notification(&self) -> Result<()> {
    self.log.lock().unwrap().push(Presented::Closed);
    Ok(())
  }

  async fn focus_or_open(&self, url: &str) -> Result<()> {
    self
      .log
      .lock()
      .unwrap()
      .push(Presented::Focused(url.to_string()));
    Ok(())
  }
}
