//! Request-id propagation.
//!
//! Keeps an inbound `X-Request-ID` (set by a proxy upstream) or generates a
//! UUID v4. The id is written back onto the request so later layers, actions
//! and the fault page see it, and echoed on the response so clients can quote
//! it in bug reports.

use http::HeaderValue;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest inbound id accepted as-is; longer ones are replaced.
const MAX_LEN: usize = 128;

#[derive(Clone, Debug, Default)]
pub struct RequestId;

impl RequestId {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for RequestId {
    fn call<'a>(&'a self, mut req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let id = match req.headers().get(REQUEST_ID_HEADER) {
                Some(v) if !v.is_empty() && v.len() <= MAX_LEN && v.to_str().is_ok() => v.clone(),
                _ => {
                    let generated = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string());
                    match generated {
                        Ok(v) => v,
                        Err(_) => return next.run(req).await,
                    }
                }
            };
            req.headers_mut().insert(REQUEST_ID_HEADER, id.clone());

            let mut res = next.run(req).await;
            res.headers_mut().insert(REQUEST_ID_HEADER, id);
            res
        })
    }
}
