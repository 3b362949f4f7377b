//! Transport port: one request/response exchange per call.
//!
//! The poll loop talks to the server exclusively through the [`Transport`]
//! trait, which performs a single HTTP exchange and returns either a decoded
//! [`ChangesPage`] or a [`FeedError`]. No retry or interpretation logic lives
//! here; that is the loop's job. The trait keeps the loop testable against a
//! scripted transport and leaves room for non-reqwest implementations.

use crate::client::Client;
use crate::error::FeedError;
use crate::types::ChangesPage;
use http::Method;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Slack added on top of the server's long-poll window before the client
/// gives up on a request.
const LONG_POLL_GRACE: Duration = Duration::from_secs(5);

/// A transport performs one HTTP exchange against the database server.
pub trait Transport: Send + Sync + 'static {
    /// Issue a single request and decode the response.
    ///
    /// A failure carries the server's status code when one was received;
    /// a missing status code means the failure happened at the
    /// network/parse level.
    fn exchange(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> impl Future<Output = Result<ChangesPage, FeedError>> + Send;
}

/// Path of the changes endpoint for a database, with the database name
/// escaped as a single path segment.
pub(crate) fn changes_path(database: &str) -> String {
    format!("{}/_changes", urlencoding::encode(database))
}

/// Error body shape returned by the server alongside non-success statuses.
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    reason: Option<String>,
}

/// Production transport over [`reqwest`], built from a [`Client`].
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn exchange(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> impl Future<Output = Result<ChangesPage, FeedError>> + Send {
        let url = format!(
            "{}/{}",
            self.client.base_url().trim_end_matches('/'),
            path
        );

        let mut req = self.client.inner.request(method, &url).query(query);

        for (key, value) in self.client.get_headers().iter() {
            req = req.header(key.clone(), value.clone());
        }

        // A long poll is held open server-side for the `timeout` window;
        // only give up once that window plus some slack has elapsed.
        let poll_window = query
            .iter()
            .find(|(key, _)| *key == "timeout")
            .and_then(|(_, value)| value.parse::<u64>().ok());
        if let Some(ms) = poll_window {
            req = req.timeout(Duration::from_millis(ms) + LONG_POLL_GRACE);
        }

        let path = path.to_string();
        async move {
            let resp = req.send().await.map_err(FeedError::from)?;
            let status = resp.status().as_u16();

            if (200..300).contains(&status) {
                resp.json::<ChangesPage>().await.map_err(FeedError::from)
            } else {
                let reason = resp
                    .json::<ErrorBody>()
                    .await
                    .ok()
                    .and_then(|body| body.reason.or(body.error));
                Err(FeedError::from_status(status, &path, reason))
            }
        }
    }
}
