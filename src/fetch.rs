//! Trust-list download
//!
//! [`TrustListFetcher`] is the seam the syncer depends on; [`HttpFetcher`] is
//! the production implementation using `reqwest` in blocking mode, which fits
//! the background refresh thread.

use crate::error::{PkiError, Result};
use reqwest::blocking::Client;
use std::time::Duration;
use url::Url;

/// Trust-list payloads are a few megabytes; anything far beyond is refused
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

pub trait TrustListFetcher: Send + Sync {
    /// Download the raw container at `url`
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_size: usize,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        Self::with_max_size(timeout_secs, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_size(timeout_secs: u64, max_size: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PkiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_size,
            timeout_secs,
        })
    }
}

impl TrustListFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url)
            .map_err(|e| PkiError::Config(format!("Invalid trust list URL {}: {}", url, e)))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(PkiError::Config(format!(
                    "Unsupported URL scheme '{}' (must be http or https)",
                    scheme
                )))
            }
        }

        let response = self.client.get(parsed).send().map_err(|e| {
            if e.is_timeout() {
                PkiError::Network(format!("GET {} timed out after {}s", url, self.timeout_secs))
            } else {
                PkiError::Network(format!("GET {} failed: {}", url, e))
            }
        })?;

        if !response.status().is_success() {
            return Err(PkiError::Network(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_size {
                return Err(PkiError::Network(format!(
                    "Trust list of {} bytes exceeds limit of {} bytes",
                    length, self.max_size
                )));
            }
        }

        let bytes = response
            .bytes()
            .map_err(|e| PkiError::Network(format!("Failed to read response: {}", e)))?;
        if bytes.len() > self.max_size {
            return Err(PkiError::Network(format!(
                "Trust list of {} bytes exceeds limit of {} bytes",
                bytes.len(),
                self.max_size
            )));
        }

        Ok(bytes.to_vec())
    }
}
