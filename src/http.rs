//! Request and response snapshots exchanged between the worker, the cache
//! store and the network.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

/// Body returned when a cache-first asset is neither cached nor reachable.
pub const OFFLINE_ASSET_BODY: &str = "Offline content not available";

/// Body returned when network-first or cold stale-while-revalidate fails.
pub const OFFLINE_CONTENT_BODY: &str = "Content not available offline";

/// An outbound request intercepted by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: String,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      method: method.into().to_uppercase(),
      url: url.into(),
      headers: BTreeMap::new(),
      body: None,
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new("GET", url)
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into().to_lowercase(), value.into());
    self
  }
}

/// Base URL that relative request URLs are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin(Url);

impl Origin {
  pub fn parse(origin: &str) -> Result<Self> {
    let url = Url::parse(origin).map_err(|e| eyre!("Invalid origin {}: {}", origin, e))?;
    Ok(Self(url))
  }

  pub fn resolve(&self, url: &str) -> Result<Url> {
    self
      .0
      .join(url)
      .map_err(|e| eyre!("Invalid request URL {}: {}", url, e))
  }

  /// Cache key for a request, with the URL made absolute so `/index.html`
  /// and `http://host/index.html` share one entry. URLs that cannot be
  /// resolved are keyed as given.
  pub fn identity(&self, request: &Request) -> RequestIdentity {
    match self.resolve(&request.url) {
      Ok(url) => RequestIdentity::new(&request.method, url.as_str()),
      Err(_) => RequestIdentity::new(&request.method, &request.url),
    }
  }
}

/// Normalized cache key: method + full URL, query string included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestIdentity {
  method: String,
  url: String,
}

impl RequestIdentity {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.trim().to_uppercase(),
      url: url.trim().to_string(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// SHA256 hash for stable, fixed-length storage keys
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl std::fmt::Display for RequestIdentity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Stored or live response: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
  pub status: u16,
  pub status_text: String,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl ResponseSnapshot {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: reason_phrase(status).to_string(),
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into().to_lowercase(), value.into());
    self
  }

  /// Synthesized service-unavailable response.
  pub fn offline(body: &str) -> Self {
    Self::new(503, body.as_bytes()).with_header("content-type", "text/plain")
  }

  /// 2xx, the only responses written to cache.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

fn reason_phrase(status: u16) -> &'static str {
  match status {
    200 => "OK",
    201 => "Created",
    204 => "No Content",
    304 => "Not Modified",
    400 => "Bad Request",
    404 => "Not Found",
    500 => "Internal Server Error",
    503 => "Service Unavailable",
    _ => "",
  }
}

/// Where a response handed back to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Live network response
  Network,
  /// Served from a cache namespace
  Cache,
  /// Synthesized because neither network nor cache could answer
  Offline,
  /// Forwarded untouched because the worker does not control traffic yet
  Passthrough,
}

/// Response produced for one intercepted request.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
  pub response: ResponseSnapshot,
  pub source: ResponseSource,
}

impl FetchOutcome {
  pub fn from_network(response: ResponseSnapshot) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  pub fn from_cache(response: ResponseSnapshot) -> Self {
    Self {
      response,
      source: ResponseSource::Cache,
    }
  }

  pub fn offline(body: &str) -> Self {
    Self {
      response: ResponseSnapshot::offline(body),
      source: ResponseSource::Offline,
    }
  }
}
