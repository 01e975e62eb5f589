//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, header};
use http_body_util::BodyExt;

use crate::error::Error;

/// An incoming HTTP request with its body fully buffered.
///
/// Middleware units and handlers only ever see `&Request`: the request is
/// read-only once it enters the chain.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Buffers the body of a hyper request and wraps it.
    pub(crate) async fn from_hyper(
        req: hyper::Request<hyper::body::Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Self, Error> {
        let (parts, body) = req.into_parts();
        let body = body.collect().await?.to_bytes();
        let mut req = Self::from_parts(parts, body);
        req.remote_addr = Some(remote_addr);
        Ok(req)
    }

    /// Builds a request from `http` parts and an already-buffered body.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr: None,
        }
    }

    /// Returns a copy carrying the path parameters a route matched.
    pub(crate) fn with_params(&self, params: HashMap<String, String>) -> Self {
        Self { params, ..self.clone() }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Non-UTF-8 values are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the value of the first cookie called `name`.
    ///
    /// Every `Cookie` header is searched; pairs are `;`-separated and
    /// surrounding whitespace is ignored. A cookie with an empty value is
    /// still reported as present.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"'))
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}
