//! Double-submit-cookie CSRF protection.
//!
//! - Requests with a JSON `Content-Type` skip the check entirely: browsers
//!   cannot send one cross-site without a CORS preflight.
//! - Safe methods (`GET`, `HEAD`, `OPTIONS`) pass, and get a fresh
//!   `csrf_token` cookie if they did not send one.
//! - Every other method must repeat the cookie value in the `csrf_token` form
//!   field or the `X-CSRF-Token` header, or it is refused with `403`.
//!
//! Actions read the current token with
//! [`Context::csrf_token`](crate::Context::csrf_token) to embed it in forms.

use http::header::SET_COOKIE;
use http::{HeaderValue, StatusCode};
use tracing::{debug, warn};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_FIELD: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// The token in effect for this request, as a request extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Default)]
pub struct Csrf;

impl Csrf {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Csrf {
    fn call<'a>(&'a self, mut req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if req.is_json() {
                return next.run(req).await;
            }

            let cookie = req.cookie(CSRF_COOKIE).map(str::to_owned);
            let safe = Method::from_http(req.method()).is_some_and(Method::is_safe);

            if safe {
                let (token, issued) = match cookie {
                    Some(token) => (token, false),
                    None => (generate_token(), true),
                };
                req.extensions_mut().insert(CsrfToken(token.clone()));
                let mut res = next.run(req).await;
                if issued {
                    match HeaderValue::from_str(&format!("{CSRF_COOKIE}={token}; Path=/; SameSite=Lax")) {
                        Ok(value) => {
                            res.headers_mut().append(SET_COOKIE, value);
                        }
                        Err(e) => warn!(error = %e, "failed to build CSRF cookie"),
                    }
                }
                return res;
            }

            let Some(expected) = cookie else {
                debug!(path = req.path(), "CSRF cookie missing");
                return forbidden("CSRF token missing");
            };
            let matches = submitted_token(&req).is_some_and(|submitted| tokens_match(&submitted, &expected));
            if !matches {
                debug!(path = req.path(), "CSRF token mismatch");
                return forbidden("CSRF token invalid");
            }

            req.extensions_mut().insert(CsrfToken(expected));
            next.run(req).await
        })
    }
}

/// Form field first, then header.
fn submitted_token(req: &Request) -> Option<String> {
    let from_form = req
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .then(|| {
            url::form_urlencoded::parse(req.body())
                .find(|(k, _)| k == CSRF_FIELD)
                .map(|(_, v)| v.into_owned())
        })
        .flatten()
        .filter(|v| !v.is_empty());

    from_form.or_else(|| req.header(CSRF_HEADER).map(str::to_owned))
}

/// Compares in time that depends only on the lengths, never on where the
/// first differing byte is.
fn tokens_match(submitted: &str, expected: &str) -> bool {
    submitted.len() == expected.len()
        && submitted.bytes().zip(expected.bytes()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

/// 32 random bytes, hex encoded.
fn generate_token() -> String {
    rand::random::<[u8; 32]>().iter().map(|b| format!("{b:02x}")).collect()
}

fn forbidden(message: &str) -> Response {
    Response::builder().status(StatusCode::FORBIDDEN).text(message)
}
