//! Middleware layer.
//!
//! Middleware wraps the route table and is the right place for cross-cutting
//! concerns: request ids, access logs, panic recovery, security headers, CORS,
//! CSRF, rate limiting, compression and metrics.
//!
//! A middleware receives the request and a [`Next`] handle to the rest of the
//! chain. It may answer on its own (a 403, a 429, a preflight 204), or call
//! `next.run(req)` and post-process the response:
//!
//! ```rust
//! use railyard::middleware::{Middleware, Next};
//! use railyard::{BoxFuture, Request, Response};
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             let mut res = next.run(req).await;
//!             res.headers_mut().insert("x-powered-by", "railyard".parse().unwrap());
//!             res
//!         })
//!     }
//! }
//! ```
//!
//! Layers run in registration order: the first one added to
//! [`AppBuilder::with`](crate::AppBuilder::with) sees the request first and
//! the response last.

use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::table::RouteTable;

pub mod compress;
pub mod cors;
pub mod csrf;
pub mod logger;
pub mod metrics;
pub mod rate_limit;
pub mod recovery;
pub mod request_id;
pub mod secure_headers;

pub use compress::Compress;
pub use cors::Cors;
pub use csrf::{Csrf, CsrfToken};
pub use logger::Logger;
pub use metrics::Metrics;
pub use rate_limit::{MemoryWindowStore, RateLimit, WindowStore, WindowStoreError};
pub use recovery::Recovery;
pub use request_id::RequestId;
pub use secure_headers::SecureHeaders;

/// A request interceptor.
pub trait Middleware: Send + Sync + 'static {
    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response>;
}

/// The remainder of the chain, ending at the route table.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    table: &'a RouteTable,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], table: &'a RouteTable) -> Self {
        Self { rest: chain, table }
    }

    /// Passes `req` to the next layer, or to the router after the last one.
    pub async fn run(self, req: Request) -> Response {
        match self.rest.split_first() {
            Some((layer, rest)) => layer.call(req, Next { rest, table: self.table }).await,
            None => self.table.handle(req).await,
        }
    }
}
