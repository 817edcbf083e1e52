use std::future::Future;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A single HTTP response, buffered in memory.
///
/// Mirror targets are index files and distribution archives, both small
/// enough to buffer; the engine never needs chunked access to a body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed `Last-Modified` header, if the server sent one.
    pub last_modified: Option<SystemTime>,
    /// Response body. Empty for non-success responses.
    pub body: Bytes,
}

/// Asynchronous HTTP client abstraction.
///
/// The minimal seam the mirror engine needs: one conditional GET. The
/// implementation owns redirect handling, TLS, and timeouts.
///
/// Returning `Err` means no response was obtained at all (DNS failure,
/// refused connection, timeout). HTTP error statuses are returned as
/// ordinary [`HttpResponse`] values so callers can distinguish the two.
pub trait HttpClient: Send + Sync {
    /// Error type for transport-level failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Perform a GET, conditional on `if_modified_since` when given.
    ///
    /// Servers that honor the precondition answer `304 Not Modified`
    /// with an empty body when the resource is unchanged.
    fn get(
        &self,
        url: &str,
        if_modified_since: Option<SystemTime>,
    ) -> impl Future<Output = std::result::Result<HttpResponse, Self::Error>> + Send;
}

/// Format a timestamp as an IMF-fixdate for conditional request headers.
pub(crate) fn format_http_date(t: SystemTime) -> String {
    DateTime::<Utc>::from(t)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Parse a `Last-Modified` header value. Returns `None` on anything
/// that is not a well-formed HTTP date.
pub(crate) fn parse_http_date(s: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(s).ok().map(SystemTime::from)
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;
    use crate::error::{Error, Result};
    use std::time::Duration;

    /// Production HTTP client backed by `reqwest`.
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        /// Build a client, applying the optional per-request timeout.
        ///
        /// No timeout means requests may block indefinitely; that is the
        /// configured default.
        pub fn new(timeout: Option<Duration>) -> Result<Self> {
            let mut builder = reqwest::Client::builder();
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }
            let client = builder.build().map_err(|e| Error::Client(e.to_string()))?;
            Ok(Self { client })
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn get(
            &self,
            url: &str,
            if_modified_since: Option<SystemTime>,
        ) -> std::result::Result<HttpResponse, Self::Error> {
            let mut request = self.client.get(url);
            if let Some(since) = if_modified_since {
                request = request.header(
                    reqwest::header::IF_MODIFIED_SINCE,
                    format_http_date(since),
                );
            }

            let response = request.send().await?;
            let status = response.status().as_u16();
            let last_modified = response
                .headers()
                .get(reqwest::header::LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_http_date);
            let body = if status == 200 {
                response.bytes().await?
            } else {
                Bytes::new()
            };

            Ok(HttpResponse {
                status,
                last_modified,
                body,
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn http_date_round_trip() {
        let t = UNIX_EPOCH + Duration::from_secs(784_111_777);
        let formatted = format_http_date(t);
        assert_eq!(formatted, "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(parse_http_date(&formatted), Some(t));
    }

    #[test]
    fn parse_http_date_rejects_garbage() {
        assert_eq!(parse_http_date("not a date"), None);
        assert_eq!(parse_http_date(""), None);
    }
}
