//! Chain-level panic guard.
//!
//! The dispatcher already guards each action. `Recovery` catches what
//! escapes everywhere else: a panicking middleware below it, a mounted
//! endpoint, the router itself. It renders the same development page or terse
//! production 500 as the dispatcher.
//!
//! Register it near the top of the chain so the layers above it (request id,
//! access log) still see a response.
//!
//! The environment is the app's, read per request, unless pinned with
//! [`Recovery::with_env`].

use std::sync::Arc;

use super::{Middleware, Next};
use crate::app::Services;
use crate::config::Environment;
use crate::fault::{self, RequestHead};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

#[derive(Clone, Copy, Debug, Default)]
pub struct Recovery {
    env: Option<Environment>,
}

impl Recovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders for `env` whatever the app runs in.
    pub fn with_env(env: Environment) -> Self {
        Self { env: Some(env) }
    }

    /// Outside an [`App`](crate::App) there is no environment to read, and
    /// the terse production answer is used.
    fn env(&self, req: &Request) -> Environment {
        self.env
            .or_else(|| req.extensions().get::<Arc<Services>>().map(|services| services.env))
            .unwrap_or(Environment::Production)
    }
}

impl Middleware for Recovery {
    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let head = RequestHead::capture(&req);
            let env = self.env(&req);
            match fault::guard(next.run(req)).await {
                Ok(res) => res,
                Err(fault) => fault::respond(env, &head, &fault),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{App, Config};
    use bytes::Bytes;
    use http::StatusCode;

    struct Exploding;

    impl Middleware for Exploding {
        fn call<'a>(&'a self, _req: Request, _next: Next<'a>) -> BoxFuture<'a, Response> {
            Box::pin(async {
                if true {
                    panic!("middleware blew up");
                }
                Response::text("unreachable")
            })
        }
    }

    #[tokio::test]
    async fn catches_panics_outside_actions() {
        let app = App::builder(Config::default())
            .with(Recovery::with_env(Environment::Production))
            .with(Exploding)
            .build()
            .unwrap();

        let res = app.handle(http::Request::new(Bytes::new()).into()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body().as_ref(), br#"{"error":"Internal Server Error"}"#);
    }

    fn html_request() -> Request {
        http::Request::builder().header("accept", "text/html").body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn follows_an_environment_set_after_it_was_added() {
        let app = App::builder(Config::default())
            .with(Recovery::new())
            .with(Exploding)
            .env(Environment::Production)
            .build()
            .unwrap();

        let res = app.handle(html_request()).await;
        assert_eq!(res.body().as_ref(), br#"{"error":"Internal Server Error"}"#);
    }

    #[tokio::test]
    async fn development_apps_get_the_diagnostic_page() {
        let app = App::builder(Config::default())
            .env(Environment::Development)
            .with(Recovery::new())
            .with(Exploding)
            .build()
            .unwrap();

        let res = app.handle(html_request()).await;
        assert!(res.header("content-type").is_some_and(|ct| ct.starts_with("text/html")));
        assert!(std::str::from_utf8(res.body()).unwrap().contains("middleware blew up"));
    }
}
