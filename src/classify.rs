//! Static routing of intercepted requests to a caching strategy.

use url::Url;

use crate::config::Config;
use crate::http::Request;

/// How a request is satisfied from cache vs. network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  CacheFirst,
  NetworkFirst,
  StaleWhileRevalidate,
}

impl std::fmt::Display for Strategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Strategy::CacheFirst => "cache-first",
      Strategy::NetworkFirst => "network-first",
      Strategy::StaleWhileRevalidate => "stale-while-revalidate",
    };
    f.write_str(name)
  }
}

/// Assigns every request to exactly one strategy. First match wins:
/// static asset → cache-first, API endpoint → network-first, anything
/// else → stale-while-revalidate.
#[derive(Debug, Clone)]
pub struct Classifier {
  static_assets: Vec<String>,
  api_endpoints: Vec<String>,
}

impl Classifier {
  pub fn new(static_assets: Vec<String>, api_endpoints: Vec<String>) -> Self {
    Self {
      static_assets,
      api_endpoints,
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(config.static_assets.clone(), config.api_endpoints.clone())
  }

  pub fn classify(&self, request: &Request) -> Strategy {
    if self
      .static_assets
      .iter()
      .any(|asset| matches_asset(&request.url, asset))
    {
      Strategy::CacheFirst
    } else if self
      .api_endpoints
      .iter()
      .any(|endpoint| request.url.contains(endpoint.as_str()))
    {
      Strategy::NetworkFirst
    } else {
      Strategy::StaleWhileRevalidate
    }
  }
}

/// Substring match, except the bare root `/` which only matches the root
/// path (every URL contains a slash).
fn matches_asset(url: &str, asset: &str) -> bool {
  if asset == "/" {
    request_path(url) == "/"
  } else {
    url.contains(asset)
  }
}

fn request_path(url: &str) -> String {
  match Url::parse(url) {
    Ok(parsed) => parsed.path().to_string(),
    Err(_) => {
      let end = url.find(['?', '#']).unwrap_or(url.len());
      url[..end].to_string()
    }
  }
}
