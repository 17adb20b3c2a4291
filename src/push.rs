//! Push payload rendering and notification click routing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::NotificationConfig;

/// Action offered on every notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
  View,
  Dismiss,
}

impl NotificationAction {
  pub fn id(&self) -> &'static str {
    match self {
      NotificationAction::View => "view",
      NotificationAction::Dismiss => "dismiss",
    }
  }

  pub fn title(&self) -> &'static str {
    match self {
      NotificationAction::View => "View Dashboard",
      NotificationAction::Dismiss => "Dismiss",
    }
  }

  /// Parse a click's action id. Unknown or missing ids mean dismiss.
  pub fn from_click(action: Option<&str>) -> Self {
    match action {
      Some("view") => NotificationAction::View,
      _ => NotificationAction::Dismiss,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub timestamp: DateTime<Utc>,
  pub actions: Vec<NotificationAction>,
}

/// What happened on a notification click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// Notification closed and the root view focused or opened
  Opened(String),
  /// Notification closed, nothing else
  Closed,
}

/// User-facing surface for notifications.
#[async_trait]
pub trait Presenter: Send + Sync {
  async fn show_notification(&self, payload: &NotificationPayload) -> Result<()>;

  async fn close_notification(&self) -> Result<()>;

  async fn focus_or_open(&self, url: &str) -> Result<()>;
}

/// Presenter that writes notifications to the log.
pub struct LogPresenter;

#[async_trait]
impl Presenter for LogPresenter {
  async fn show_notification(&self, payload: &NotificationPayload) -> Result<()> {
    let actions: Vec<&str> = payload.actions.iter().map(|a| a.id()).collect();
    info!(
      title = %payload.title,
      body = %payload.body,
      icon = %payload.icon,
      actions = ?actions,
      "Notification shown"
    );
    Ok(())
  }

  async fn close_notification(&self) -> Result<()> {
    debug!("Notification closed");
    Ok(())
  }

  async fn focus_or_open(&self, url: &str) -> Result<()> {
    info!(url, "Focus or open window");
    Ok(())
  }
}

pub struct PushNotificationDispatcher {
  config: NotificationConfig,
  presenter: Arc<dyn Presenter>,
}

impl PushNotificationDispatcher {
  pub fn new(config: NotificationConfig, presenter: Arc<dyn Presenter>) -> Self {
    Self { config, presenter }
  }

  /// Build the notification for a push payload.
  ///
  /// Missing, blank or non-UTF-8 payloads get the default body.
  pub fn render(&self, payload: Option<&[u8]>) -> NotificationPayload {
    let body = payload
      .and_then(|bytes| std::str::from_utf8(bytes).ok())
      .map(str::trim)
      .filter(|text| !text.is_empty())
      .map(String::from)
      .unwrap_or_else(|| self.config.default_body.clone());

    NotificationPayload {
      title: self.config.title.clone(),
      body,
      icon: self.config.icon.clone(),
      badge: self.config.badge.clone(),
      timestamp: Utc::now(),
      actions: vec![NotificationAction::View, NotificationAction::Dismiss],
    }
  }

  pub async fn on_push(&self, payload: Option<&[u8]>) -> Result<NotificationPayload> {
    let notification = self.render(payload);
    self.presenter.show_notification(&notification).await?;
    Ok(notification)
  }

  pub async fn on_click(&self, action: Option<&str>) -> Result<ClickOutcome> {
    self.presenter.close_notification().await?;

    match NotificationAction::from_click(action) {
      NotificationAction::View => {
        self.presenter.focus_or_open(&self.config.root_url).await?;
        Ok(ClickOutcome::Opened(self.config.root_url.clone()))
      }
      NotificationAction::Dismiss => Ok(ClickOutcome::Closed),
    }
  }
}
