//! HTTP GET for the static resource check.
//!
//! Runs a single hyper HTTP/1 client connection over whatever stream the
//! dialer produced, so tests can serve the page from an in-memory pipe.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Limited};
use hyper::header::{ACCEPT, HOST};
use hyper::{HeaderMap, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::config::Limits;
use crate::error::{Error, Result};

/// A response to [`get`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    /// Header value as text; `None` when absent or not visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Send `GET path` over `io` and read the full response.
///
/// # Errors
///
/// `Error::Http` when the exchange fails or the body exceeds
/// `limits.max_message_size`.
pub async fn get<T>(io: T, host: &str, path: &str, limits: &Limits) -> Result<HttpResponse>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;
    let driver = tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "static page connection ended");
        }
    });

    let request = Request::get(path)
        .header(HOST, host)
        .header(ACCEPT, "text/html")
        .body(Empty::<Bytes>::new())
        .map_err(|e| Error::Http(e.to_string()))?;
    let (parts, body) = sender.send_request(request).await?.into_parts();

    let max = limits.max_message_size;
    let body = Limited::new(body, max)
        .collect()
        .await
        .map_err(|e| Error::Http(format!("reading body (limit {max} bytes): {e}")))?
        .to_bytes();
    driver.abort();

    Ok(HttpResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    })
}
