//! Access log.
//!
//! One `info` event per request, emitted after the rest of the chain has
//! produced a response:
//!
//! ```text
//! INFO railyard::middleware::logger: request method=GET path=/posts status=200
//!      duration_ms=1.42 request_id=3f0c… ip=10.0.0.7 user_agent=curl/8.5
//! ```
//!
//! Server errors are logged at `error`, client errors at `warn`.

use std::time::Instant;

use tracing::{error, info, warn};

use super::request_id::REQUEST_ID_HEADER;
use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

#[derive(Clone, Debug, Default)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Logger {
    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method().clone();
            let path = req.path().to_owned();
            let request_id = req.header(REQUEST_ID_HEADER).unwrap_or("-").to_owned();
            let ip = req.client_addr().map(|a| a.ip().to_string()).unwrap_or_else(|| "-".to_owned());
            let user_agent = req.header("user-agent").unwrap_or("-").to_owned();

            let res = next.run(req).await;

            let status = res.status_code().as_u16();
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
            macro_rules! access {
                ($level:ident) => {
                    $level!(
                        method = %method,
                        path = %path,
                        status,
                        duration_ms,
                        request_id = %request_id,
                        ip = %ip,
                        user_agent = %user_agent,
                        "request"
                    )
                };
            }
            match status {
                500.. => access!(error),
                400..=499 => access!(warn),
                _ => access!(info),
            }
            res
        })
    }
}
