//! HTTP client and configuration.

use crate::error::InvalidHeaderError;
use crate::feed::ChangesFeed;
use crate::transport::HttpTransport;
use reqwest::header::HeaderMap;
use std::time::Duration;

/// A client for one database server.
///
/// The client is cloneable and can be shared across threads.
/// It manages connection pooling.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) default_headers: HeaderMap,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .finish()
    }
}

impl Client {
    /// Create a new client with default settings.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client fails to build. Use `Client::builder(..).build()`
    /// for fallible construction.
    pub fn new(base_url: impl Into<String>) -> Self {
        ClientBuilder::new(base_url)
            .build()
            .expect("Failed to build default HTTP client")
    }

    /// Create a client builder for customization.
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// Create a changes-feed handle for the given database.
    ///
    /// No network request is made until the feed is started.
    pub fn changes(&self, database: impl Into<String>) -> ChangesFeed<HttpTransport> {
        ChangesFeed::new(HttpTransport::new(self.clone()), database)
    }

    /// Server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Headers attached to every request.
    pub(crate) fn get_headers(&self) -> HeaderMap {
        self.default_headers.clone()
    }
}

/// Builder for configuring a Client.
#[must_use = "builders do nothing unless you call .build()"]
pub struct ClientBuilder {
    base_url: String,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Create a new client builder for the given server base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_headers: HeaderMap::new(),
            timeout: None,
        }
    }

    /// Add a default header for all requests.
    ///
    /// Invalid header names or values are silently ignored. Use
    /// [`try_default_header`](Self::try_default_header) if you need error handling.
    pub fn default_header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(val)) = (
            reqwest::header::HeaderName::from_bytes(key.as_bytes()),
            reqwest::header::HeaderValue::from_str(value),
        ) {
            self.default_headers.insert(name, val);
        }
        self
    }

    /// Add a default header, returning an error if the name or value is invalid.
    ///
    /// Use this instead of [`default_header`](Self::default_header) when you need
    /// to know if header configuration failed.
    pub fn try_default_header(
        mut self,
        key: &str,
        value: &str,
    ) -> std::result::Result<Self, InvalidHeaderError> {
        let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| InvalidHeaderError::InvalidName(key.to_string()))?;
        let val = reqwest::header::HeaderValue::from_str(value)
            .map_err(|_| InvalidHeaderError::InvalidValue(value.to_string()))?;
        self.default_headers.insert(name, val);
        Ok(self)
    }

    /// Set all default headers.
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Set a whole-request timeout applied to every exchange.
    ///
    /// Long-poll requests already get a per-request timeout of the poll
    /// window plus a grace period; a client-level timeout shorter than the
    /// poll window will cut long polls short (they surface as transient
    /// failures and are retried).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    ///
    /// Returns an error if the underlying HTTP client fails to build
    /// (e.g., due to TLS configuration issues).
    pub fn build(self) -> Result<Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let inner = builder.build()?;

        Ok(Client {
            inner,
            base_url: self.base_url,
            default_headers: self.default_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_headers() {
        let client = Client::builder("http://localhost:5984")
            .default_header("x-request-origin", "follower")
            .default_header("bad name", "dropped")
            .build()
            .unwrap();

        assert_eq!(client.base_url(), "http://localhost:5984");
        assert_eq!(client.get_headers().len(), 1);
    }

    #[test]
    fn test_try_default_header_rejects_invalid() {
        let result = Client::builder("http://localhost:5984").try_default_header("bad name", "v");
        assert!(matches!(result, Err(InvalidHeaderError::InvalidName(_))));
    }
}
