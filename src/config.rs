use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::Origin;

/// Tag that triggers the background sync queue.
pub const DEFAULT_SYNC_TAG: &str = "background-sync";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL that relative asset URLs are resolved against
  pub origin: String,
  /// Build identifier, versions the static namespace
  pub build: String,
  pub namespaces: NamespaceConfig,
  /// Critical assets pre-warmed at install (order preserved)
  pub static_assets: Vec<String>,
  /// Origin prefixes routed through network-first
  pub api_endpoints: Vec<String>,
  pub network: NetworkConfig,
  pub notifications: NotificationConfig,
  pub storage: StorageConfig,
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
  /// Combined with `build` to form the static namespace name
  pub static_prefix: String,
  pub dynamic: String,
  pub api: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  /// Shown when a push arrives without usable text
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  /// Opened or focused on a `view` click
  pub root_url: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
  /// SQLite file in the data directory
  #[default]
  Sqlite,
  /// Process-local, lost on exit
  Memory,
  /// Caching disabled - every read misses
  Disabled,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  pub backend: StorageBackend,
  /// Override for the SQLite file location
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub tag: String,
  /// JSON file of pending items; without it nothing is ever pending
  pub pending_file: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      build: "v1".to_string(),
      namespaces: NamespaceConfig::default(),
      static_assets: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/manifest.json".to_string(),
        "/favicon.ico".to_string(),
      ],
      api_endpoints: vec!["https://api.example.com".to_string()],
      network: NetworkConfig::default(),
      notifications: NotificationConfig::default(),
      storage: StorageConfig::default(),
      sync: SyncConfig::default(),
    }
  }
}

impl Default for NamespaceConfig {
  fn default() -> Self {
    Self {
      static_prefix: "static".to_string(),
      dynamic: "dynamic-v1".to_string(),
      api: "api-v1".to_string(),
    }
  }
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self { timeout_secs: 30 }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "Analytics Dashboard".to_string(),
      default_body: "New update available".to_string(),
      icon: "/icon-192x192.png".to_string(),
      badge: "/badge-72x72.png".to_string(),
      root_url: "/".to_string(),
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: DEFAULT_SYNC_TAG.to_string(),
      pending_file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-worker/config.yaml
  ///
  /// Falls back to the built-in defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("offline-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-worker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    self.parsed_origin()?;
    let names = self.allow_list();
    if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
      return Err(eyre!("Namespace names must be distinct: {:?}", names));
    }
    if self.static_assets.iter().any(|a| a.is_empty()) {
      return Err(eyre!("static_assets must not contain empty entries"));
    }
    if self.api_endpoints.iter().any(|a| a.is_empty()) {
      return Err(eyre!("api_endpoints must not contain empty entries"));
    }
    Ok(())
  }

  pub fn parsed_origin(&self) -> Result<Origin> {
    Origin::parse(&self.origin)
  }

  /// Name of the pre-warmed namespace, e.g. `static-v2`.
  pub fn static_namespace(&self) -> String {
    format!("{}-{}", self.namespaces.static_prefix, self.build)
  }

  pub fn dynamic_namespace(&self) -> &str {
    &self.namespaces.dynamic
  }

  pub fn api_namespace(&self) -> &str {
    &self.namespaces.api
  }

  /// Namespaces that survive activation.
  pub fn allow_list(&self) -> [String; 3] {
    [
      self.static_namespace(),
      self.namespaces.dynamic.clone(),
      self.namespaces.api.clone(),
    ]
  }

  pub fn network_timeout(&self) -> Duration {
    Duration::from_secs(self.network.timeout_secs)
  }

  /// Directory holding the cache database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offline-worker"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_build_versioned_names() {
    let config = Config::default();
    assert_eq!(config.static_namespace(), "static-v1");
    assert_eq!(
      config.allow_list(),
      [
        "static-v1".to_string(),
        "dynamic-v1".to_string(),
        "api-v1".to_string()
      ]
    );
    assert_eq!(config.sync.tag, DEFAULT_SYNC_TAG);
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      r#"
build: v2
static_assets: ["/", "/index.html"]
storage:
  backend: memory
"#,
    )
    .unwrap();

    assert_eq!(config.static_namespace(), "static-v2");
    assert_eq!(config.static_assets, vec!["/", "/index.html"]);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.api_namespace(), "api-v1");
    assert_eq!(config.network_timeout(), Duration::from_secs(30));
  }

  #[test]
  fn test_colliding_namespaces_rejected() {
    let result = Config::from_yaml(
      r#"
namespaces:
  dynamic: shared
  api: shared
"#,
    );
    assert!(result.is_err());
  }

  #[test]
  fn test_relative_origin_rejected() {
    assert!(Config::from_yaml("origin: /app").is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let result = Config::load(Some(Path::new("/definitely/not/here.yaml")));
    assert!(result.is_err());
  }
}
