//! Cross-origin resource sharing.
//!
//! Allowed origins are echoed back in `Access-Control-Allow-Origin`; `"*"`
//! in the allow-list admits any origin. Method, header and max-age policy is
//! sent on every response. `OPTIONS` requests are answered here with `204`
//! and never reach the router.

use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ORIGIN, VARY,
};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::warn;

use super::{Middleware, Next};
pub use crate::config::CorsConfig;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

pub struct Cors {
    origins: Vec<String>,
    any_origin: bool,
    /// Method, header and max-age headers, rendered once.
    policy: HeaderMap,
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        let defaults = CorsConfig::default();
        let methods = if config.allowed_methods.is_empty() { defaults.allowed_methods } else { config.allowed_methods };
        let headers = if config.allowed_headers.is_empty() { defaults.allowed_headers } else { config.allowed_headers };
        let max_age = if config.max_age == 0 { defaults.max_age } else { config.max_age };

        let mut policy = HeaderMap::new();
        for (name, value) in [
            (ACCESS_CONTROL_ALLOW_METHODS, methods.join(", ")),
            (ACCESS_CONTROL_ALLOW_HEADERS, headers.join(", ")),
            (ACCESS_CONTROL_MAX_AGE, max_age.to_string()),
        ] {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    policy.insert(name, value);
                }
                Err(_) => warn!(header = %name, value = %value, "ignoring invalid CORS policy value"),
            }
        }

        Self {
            any_origin: config.allowed_origins.iter().any(|o| o == "*"),
            origins: config.allowed_origins,
            policy,
        }
    }

    fn allows(&self, origin: &str) -> bool {
        self.any_origin || self.origins.iter().any(|o| o == origin)
    }

    fn decorate(&self, res: &mut Response, origin: Option<&HeaderValue>) {
        let headers = res.headers_mut();
        if let Some(origin) = origin {
            if origin.to_str().is_ok_and(|o| self.allows(o)) {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
                headers.append(VARY, HeaderValue::from_static("Origin"));
            }
        }
        for (name, value) in &self.policy {
            headers.insert(name, value.clone());
        }
    }
}

impl Middleware for Cors {
    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let origin = req.headers().get(ORIGIN).cloned();
            let mut res = if req.method() == http::Method::OPTIONS {
                Response::status(StatusCode::NO_CONTENT)
            } else {
                next.run(req).await
            };
            self.decorate(&mut res, origin.as_ref());
            res
        })
    }
}
