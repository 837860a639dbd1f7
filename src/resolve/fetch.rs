//! Remote fetching behind a small trait so runs can be driven without a network.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::debug;

use crate::config::MirrorConfig;
use crate::error::{MirrorError, MirrorResult};

/// Source of remote bytes.
pub trait Fetcher: Send + Sync {
  /// Download `url` in full. A non-success status is an error.
  fn fetch(&self, url: &str) -> MirrorResult<Vec<u8>>;
}

/// Blocking HTTP client with a bounded per-request timeout.
pub struct HttpFetcher {
  client: Client,
}

impl HttpFetcher {
  /// Build a client using the configured timeout and user agent.
  pub fn new(config: &MirrorConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(config.fetch_timeout())
      .user_agent(config.user_agent.clone())
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, url: &str) -> MirrorResult<Vec<u8>> {
    let failure = |reason: String| MirrorError::FetchFailure {
      url: url.to_string(),
      reason,
    };

    debug!("GET {}", url);
    let response = self
      .client
      .get(url)
      .send()
      .map_err(|err| failure(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(failure(format!("HTTP {status}")));
    }

    let body = response.bytes().map_err(|err| failure(err.to_string()))?;
    Ok(body.to_vec())
  }
}
