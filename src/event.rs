use crate::http::{FetchOutcome, Request};
use crate::lifecycle::{ActivateReport, InstallReport};
use crate::push::{ClickOutcome, NotificationPayload};
use crate::sync::SyncReport;

/// Events the worker reacts to
#[derive(Debug, Clone)]
pub enum WorkerEvent {
  /// Pre-warm the static namespace
  Install,
  /// Sweep old namespaces and take control of traffic
  Activate,
  /// An outbound request to satisfy
  Fetch(Request),
  /// Connectivity restored; only the configured tag does anything
  Sync { tag: String },
  /// Push message with an optional payload
  Push { payload: Option<Vec<u8>> },
  /// Click on a shown notification; `None` is a plain click/close
  NotificationClick { action: Option<String> },
}

impl WorkerEvent {
  pub fn name(&self) -> &'static str {
    match self {
      WorkerEvent::Install => "install",
      WorkerEvent::Activate => "activate",
      WorkerEvent::Fetch(_) => "fetch",
      WorkerEvent::Sync { .. } => "sync",
      WorkerEvent::Push { .. } => "push",
      WorkerEvent::NotificationClick { .. } => "notificationclick",
    }
  }
}

/// Result of handling one event
#[derive(Debug, Clone)]
pub enum EventOutcome {
  Installed(InstallReport),
  Activated(ActivateReport),
  Response(FetchOutcome),
  Synced(SyncReport),
  /// Sync event with a tag nobody handles
  SyncIgnored { tag: String },
  Notified(NotificationPayload),
  Clicked(ClickOutcome),
}
