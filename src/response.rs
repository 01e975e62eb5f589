//! Outbound response sinks.
//!
//! A [`ResponseSink`] is where the chain's output goes. The server hands the
//! chain a [`Response`], which buffers status, headers and body and turns
//! into a hyper response once the chain returns. Tests can supply their own
//! sink to observe or fail writes.

use std::io;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use tracing::warn;

/// The wire-facing half of a response.
///
/// Follows HTTP ordering rules: the status line and headers go out before the
/// first body byte. Implementations decide what a late status or header
/// means; the buffered [`Response`] ignores it and logs a warning.
pub trait ResponseSink: Send {
    /// Sends the status line. Only the first call before any body byte counts.
    fn send_status(&mut self, status: StatusCode);

    /// Adds a header to the response. Ignored once the response is committed.
    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Writes body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Discards the status, headers and body produced so far, if none of it
    /// has reached the client. Returns `false` when that is no longer
    /// possible, which is the default for sinks that stream.
    fn reset(&mut self) -> bool {
        false
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A buffered response: the sink the server gives every request.
///
/// The response is *committed* by the first `send_status` or the first body
/// write, whichever comes first. A body write without a status commits 200.
#[derive(Debug, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// A committed response with the given status and no body.
    pub fn with_status(status: StatusCode) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    /// The committed status, or 200 if nothing was sent.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    fn is_committed(&self) -> bool {
        self.status.is_some() || !self.body.is_empty()
    }

    /// Converts into the type hyper writes to the connection.
    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let status = self.status();
        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseSink for Response {
    fn send_status(&mut self, status: StatusCode) {
        if self.is_committed() {
            warn!(
                current = self.status().as_u16(),
                ignored = status.as_u16(),
                "superfluous status write",
            );
            return;
        }
        self.status = Some(status);
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.is_committed() {
            warn!(header = %name, "header written after response was committed");
            return;
        }
        self.headers.append(name, value);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    /// Always succeeds: nothing is sent before the chain returns.
    fn reset(&mut self) -> bool {
        *self = Self::default();
        true
    }
}
