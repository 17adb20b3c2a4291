//! Fire-and-forget work that keeps the worker alive until it finishes.

use color_eyre::Result;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::warn;

/// Tracks spawned background tasks.
///
/// Failures are logged here rather than dropped. `settle()` waits for every
/// task spawned so far, including ones spawned while waiting.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
  handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Spawn a named task. Errors are logged with the task name.
  pub fn spawn<F>(&self, name: &'static str, future: F)
  where
    F: Future<Output = Result<()>> + Send + 'static,
  {
    let handle = tokio::spawn(async move {
      if let Err(e) = future.await {
        warn!(task = name, error = %e, "Background task failed");
      }
    });

    let mut handles = self.lock();
    handles.retain(|h| !h.is_finished());
    handles.push(handle);
  }

  /// Number of tasks that have not finished yet.
  pub fn pending(&self) -> usize {
    self.lock().iter().filter(|h| !h.is_finished()).count()
  }

  /// Wait until no tracked task is running.
  pub async fn settle(&self) {
    loop {
      let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.lock());
      if handles.is_empty() {
        break;
      }
      for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
          warn!(error = %e, "Background task panicked or was cancelled");
        }
      }
    }
  }

  fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
    // Handles stay valid even if another thread panicked mid-push.
    self.handles.lock().unwrap_or_else(|e| e.into_inner())
  }
}
