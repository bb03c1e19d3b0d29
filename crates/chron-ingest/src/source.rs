//! Upstream request/response fetching.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

/// Why a fetch produced no document.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

/// Something that answers GET requests with JSON or text bodies.
///
/// The pollers are generic over this so tests can substitute canned
/// responses for the network.
pub trait JsonSource: Send + Sync {
    fn fetch_json(&self, url: &str) -> impl Future<Output = Result<Value, FetchError>> + Send;

    fn fetch_text(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// [`JsonSource`] over a shared `reqwest` client with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chron/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl JsonSource for HttpSource {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        self.get(url)
            .await?
            .json::<Value>()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })
    }

    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })
    }
}

/// Append `key=value` to `base`, respecting an existing query string.
#[must_use]
pub fn with_query(base: &str, key: &str, value: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{key}={value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_appends_with_right_separator() {
        assert_eq!(
            with_query("http://x/database/players", "ids", "a,b"),
            "http://x/database/players?ids=a,b"
        );
        assert_eq!(
            with_query("http://x/players?v=2", "ids", "a"),
            "http://x/players?v=2&ids=a"
        );
    }

    #[test]
    fn status_error_names_url() {
        let err = FetchError::Status {
            url: "http://x/teams".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "http://x/teams answered with status 503");
    }
}
