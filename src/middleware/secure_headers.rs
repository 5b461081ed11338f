//! Fixed hardening headers, set on every response.

use http::HeaderValue;
use http::header::{HeaderName, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

const HEADERS: [(HeaderName, &str); 4] = [
    (X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (X_FRAME_OPTIONS, "DENY"),
    (X_XSS_PROTECTION, "1; mode=block"),
    (REFERRER_POLICY, "strict-origin-when-cross-origin"),
];

#[derive(Clone, Debug, Default)]
pub struct SecureHeaders;

impl SecureHeaders {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for SecureHeaders {
    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut res = next.run(req).await;
            for (name, value) in HEADERS {
                res.headers_mut().insert(name, HeaderValue::from_static(value));
            }
            res
        })
    }
}
