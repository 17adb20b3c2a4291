use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

use offline_worker::cache::{CacheStore, MemoryStore, NoopStore, SqliteStore};
use offline_worker::config::{Config, StorageBackend};
use offline_worker::network::HttpNetwork;
use offline_worker::push::LogPresenter;
use offline_worker::sync::{JsonFilePendingStore, PendingStore, StubPendingStore};
use offline_worker::{logging, Collaborators, EventOutcome, Request, Worker, WorkerEvent};

#[derive(Parser, Debug)]
#[command(name = "offline-worker")]
#[command(about = "Offline-first request orchestrator with namespaced response caches")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-worker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log to stderr instead of the log file in the data directory
  #[arg(long)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-warm the static namespace, then activate
  Install {
    /// Stop after install; leave old namespaces in place
    #[arg(long)]
    no_activate: bool,
  },
  /// Fetch a URL through the worker
  Fetch {
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// Fire a sync event
  Sync {
    #[arg(long)]
    tag: Option<String>,
  },
  /// Deliver a push message
  Push { text: Option<String> },
  /// Click a notification action (view, dismiss)
  Click { action: Option<String> },
  /// List cache namespaces and their entry counts
  Namespaces,
  /// Install, activate, then fetch each URL
  Run { urls: Vec<String> },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Arc::new(Config::load(args.config.as_deref())?);

  let _log_guard = if args.log_stderr {
    logging::init_stderr()?;
    None
  } else {
    Some(logging::init_file(&Config::data_dir()?.join("logs"))?)
  };

  let worker = Worker::new(Arc::clone(&config), collaborators(&config)?)?;

  match args.command {
    Command::Install { no_activate } => {
      print_outcome(&worker.dispatch(WorkerEvent::Install).await?);
      if !no_activate {
        print_outcome(&worker.dispatch(WorkerEvent::Activate).await?);
      }
    }
    Command::Fetch { url, method } => {
      worker.resume().await?;
      let outcome = worker
        .dispatch(WorkerEvent::Fetch(Request::new(method, url)))
        .await?;
      print_outcome(&outcome);
    }
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| config.sync.tag.clone());
      print_outcome(&worker.dispatch(WorkerEvent::Sync { tag }).await?);
    }
    Command::Push { text } => {
      let payload = text.map(String::into_bytes);
      print_outcome(&worker.dispatch(WorkerEvent::Push { payload }).await?);
    }
    Command::Click { action } => {
      print_outcome(&worker.dispatch(WorkerEvent::NotificationClick { action }).await?);
    }
    Command::Namespaces => {
      for (name, count) in worker.namespaces().await? {
        println!("{}\t{}", name, count);
      }
    }
    Command::Run { urls } => {
      if !worker.resume().await? {
        print_outcome(&worker.dispatch(WorkerEvent::Install).await?);
        print_outcome(&worker.dispatch(WorkerEvent::Activate).await?);
      }
      for url in urls {
        print_outcome(&worker.dispatch(WorkerEvent::Fetch(Request::get(url))).await?);
      }
    }
  }

  // Background refreshes must land before the process exits
  worker.settle().await;

  Ok(())
}

fn collaborators(config: &Config) -> Result<Collaborators> {
  let store: Arc<dyn CacheStore> = match config.storage.backend {
    StorageBackend::Sqlite => match &config.storage.path {
      Some(path) => Arc::new(SqliteStore::open_at(path)?),
      None => Arc::new(SqliteStore::open_default()?),
    },
    StorageBackend::Memory => Arc::new(MemoryStore::new()),
    StorageBackend::Disabled => Arc::new(NoopStore),
  };

  let pending: Arc<dyn PendingStore> = match &config.sync.pending_file {
    Some(path) => Arc::new(JsonFilePendingStore::new(path.clone())),
    None => Arc::new(StubPendingStore),
  };

  Ok(Collaborators {
    store,
    network: Arc::new(HttpNetwork::new(&config.origin, config.network_timeout())?),
    pending,
    presenter: Arc::new(LogPresenter),
  })
}

fn print_outcome(outcome: &EventOutcome) {
  match outcome {
    EventOutcome::Installed(report) => {
      println!("installed {} ({} assets)", report.namespace, report.cached)
    }
    EventOutcome::Activated(report) => {
      println!("activated, deleted {:?}", report.deleted);
      if !report.failed.is_empty() {
        println!("could not delete {:?}", report.failed);
      }
    }
    EventOutcome::Response(fetched) => {
      println!(
        "{} {} ({:?}, {} bytes)",
        fetched.response.status,
        fetched.response.status_text,
        fetched.source,
        fetched.response.body.len()
      );
    }
    EventOutcome::Synced(report) => println!(
      "sync: {} attempted, {} delivered, {} failed",
      report.attempted,
      report.delivered.len(),
      report.failed.len()
    ),
    EventOutcome::SyncIgnored { tag } => println!("sync tag {} ignored", tag),
    EventOutcome::Notified(payload) => println!("notification: {}: {}", payload.title, payload.body),
    EventOutcome::Clicked(click) => println!("click: {:?}", click),
  }
}
