//! Trait abstractions for network operations to enable mocking in tests.
//!
//! The fetcher, catalog aggregator, update checker and OpenWebif reload all go
//! through [`HttpClient`], so tests can inject clients that simulate failures,
//! timeouts and specific payloads.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
#[cfg(test)]
use mockall::automock;

use mu_core::FetchError;

/// HTTP client trait for abstracting network operations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a GET request bounded by `timeout` and return the body.
    ///
    /// Non-2xx responses are errors.
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;

    /// Stream a GET response body into a new file at `destination` and
    /// return the number of bytes written.
    ///
    /// The body is never held in memory as a whole. On error the caller owns
    /// cleanup of whatever was written.
    async fn download(
        &self,
        url: &str,
        timeout: Duration,
        destination: &Path,
    ) -> Result<u64, FetchError>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("myupdater/", env!("CARGO_PKG_VERSION")))
                .pool_max_idle_per_host(4)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn map_reqwest_error(url: &str, timeout: Duration, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            after: timeout,
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

impl ReqwestHttpClient {
    async fn send(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, timeout, e))?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        self.send(url, timeout)
            .await?
            .bytes()
            .await
            .map(Vec::from)
            .map_err(|e| map_reqwest_error(url, timeout, e))
    }

    async fn download(
        &self,
        url: &str,
        timeout: Duration,
        destination: &Path,
    ) -> Result<u64, FetchError> {
        let response = self.send(url, timeout).await?;

        let write_error = |e: std::io::Error| FetchError::Staging {
            path: destination.to_path_buf(),
            message: e.to_string(),
        };

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(write_error)?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_reqwest_error(url, timeout, e))?;
            file.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(write_error)?;
        Ok(written)
    }
}
