//! Network fetch primitive.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::http::{Origin, Request, ResponseSnapshot};

/// Something that can put a request on the wire.
///
/// `Err` means the fetch itself failed (offline, DNS, timeout). Any HTTP
/// status, including 4xx and 5xx, is a successful fetch.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot>;
}

/// HTTP network client.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Origin,
}

impl HttpNetwork {
  pub fn new(origin: &str, timeout: Duration) -> Result<Self> {
    let origin = Origin::parse(origin)?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  /// Resolve a possibly relative URL against the origin.
  pub fn resolve(&self, url: &str) -> Result<Url> {
    self.origin.resolve(url)
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot> {
    let url = self.resolve(&request.url)?;
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status();
    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(ResponseSnapshot {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resolve_relative_and_absolute() {
    let network = HttpNetwork::new("http://localhost:8080", Duration::from_secs(1)).unwrap();

    assert_eq!(
      network.resolve("/index.html").unwrap().as_str(),
      "http://localhost:8080/index.html"
    );
    assert_eq!(
      network
        .resolve("https://api.example.com/data?x=1")
        .unwrap()
        .as_str(),
      "https://api.example.com/data?x=1"
    );
  }

  #[test]
  fn test_invalid_origin() {
    assert!(HttpNetwork::new("not a url", Duration::from_secs(1)).is_err());
  }
}
