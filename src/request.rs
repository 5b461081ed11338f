//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Uri};

/// Path variables captured by the route that matched this request.
#[derive(Clone, Debug, Default)]
pub(crate) struct PathParams(pub(crate) HashMap<String, String>);

/// Peer address of the TCP connection the request arrived on.
///
/// Inserted into the request extensions by [`Server`](crate::Server). Tests
/// that drive [`App::handle`](crate::App::handle) directly can insert it
/// themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// An incoming HTTP request with its body fully buffered.
///
/// This is what middleware sees and what a [`Context`](crate::Context) wraps.
/// The body is read off the wire before the middleware chain runs, so every
/// layer can inspect it without coordinating ownership.
#[derive(Debug)]
pub struct Request {
    inner: http::Request<Bytes>,
}

impl Request {
    pub fn new(inner: http::Request<Bytes>) -> Self {
        Self { inner }
    }

    pub fn method(&self) -> &http::Method { self.inner.method() }
    pub fn uri(&self) -> &Uri { self.inner.uri() }
    pub fn path(&self) -> &str { self.inner.uri().path() }
    pub fn headers(&self) -> &HeaderMap { self.inner.headers() }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { self.inner.headers_mut() }
    pub fn body(&self) -> &Bytes { self.inner.body() }
    pub fn extensions(&self) -> &http::Extensions { self.inner.extensions() }
    pub fn extensions_mut(&mut self) -> &mut http::Extensions { self.inner.extensions_mut() }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.inner
            .extensions()
            .get::<PathParams>()
            .and_then(|p| p.0.get(key))
            .map(String::as_str)
    }

    /// First value of a query-string parameter, percent-decoded.
    pub fn query(&self, key: &str) -> Option<String> {
        let query = self.inner.uri().query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Value of a cookie sent in the `Cookie` header(s).
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.inner
            .headers()
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.inner.extensions().get::<ClientAddr>().map(|a| a.0)
    }

    /// `true` when the `Content-Type` header names JSON.
    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.contains("application/json"))
    }

    pub fn into_inner(self) -> http::Request<Bytes> {
        self.inner
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.inner.extensions_mut().insert(PathParams(params));
    }

    /// Replaces the path, keeping the query string.
    pub(crate) fn set_path(&mut self, path: &str) {
        let rewritten = match self.inner.uri().query() {
            Some(q) => format!("{path}?{q}"),
            None => path.to_owned(),
        };
        if let Ok(uri) = rewritten.parse() {
            *self.inner.uri_mut() = uri;
        }
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(inner: http::Request<Bytes>) -> Self {
        Self::new(inner)
    }
}
