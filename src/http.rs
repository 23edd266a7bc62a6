//! HTTP access for file downloads.
//!
//! [`HttpClient`] is the seam between the fetch pipeline and the network, so
//! tests can count and delay requests without a server. [`ReqwestClient`] is
//! the production implementation: one connection pool shared by every
//! concurrent fetch, `Accept: identity` on every request, and retry of
//! failures to connect.

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::fetch_with_retry;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, HeaderValue};
use url::Url;

/// Abstraction over downloading a whole file into memory
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` and return the body of a 2xx response
    ///
    /// Non-2xx responses are returned as [`Error::HttpStatus`].
    async fn get(&self, url: &str) -> Result<Bytes>;
}

/// Production [`HttpClient`] backed by `reqwest`
#[derive(Clone, Debug)]
pub struct ReqwestClient {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl ReqwestClient {
    /// Build a client from the harvester configuration
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.network.user_agent.as_str())
            .timeout(config.network.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config.network.retry.clone()))
    }

    /// Wrap an existing `reqwest::Client`
    pub fn with_client(client: reqwest::Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    async fn get_once(&self, url: &Url) -> Result<Bytes> {
        // Archives are already compressed; ask for the bytes as stored
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, HeaderValue::from_static("identity"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<Bytes> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        fetch_with_retry(&self.retry, || self.get_once(&parsed)).await
    }
}
