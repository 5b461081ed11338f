//! Request metrics through the [`metrics`](::metrics) facade.
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `railyard_http_requests_total` | counter | `method`, `path`, `status` |
//! | `railyard_http_request_duration_seconds` | histogram | `method`, `path` |
//!
//! Nothing is exported until the application installs a recorder (for
//! example `metrics-exporter-prometheus`). Without one the macros are no-ops.
//!
//! The `path` label is the route pattern that matched (`/posts/{id}`, or
//! `/jobs/*` for a mount), never the raw path, so one series covers every id.
//! Requests no route matched share the label `unmatched`.
//! [`Metrics::without_path`] records every path as `*`.

use std::time::Instant;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::table::MatchedRoute;

pub const REQUESTS_TOTAL: &str = "railyard_http_requests_total";
pub const REQUEST_DURATION: &str = "railyard_http_request_duration_seconds";

#[derive(Clone, Debug)]
pub struct Metrics {
    label_path: bool,
}

impl Metrics {
    pub fn new() -> Self {
        Self { label_path: true }
    }

    /// Records every path as `*`.
    pub fn without_path(mut self) -> Self {
        self.label_path = false;
        self
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Metrics {
    fn call<'a>(&'a self, mut req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method().as_str().to_owned();
            let route = MatchedRoute::new();
            if self.label_path {
                req.extensions_mut().insert(route.clone());
            }

            let res = next.run(req).await;

            let path = match (self.label_path, route.get()) {
                (false, _) => "*".to_owned(),
                (true, Some(pattern)) => pattern.to_owned(),
                (true, None) => "unmatched".to_owned(),
            };

            let status = res.status_code().as_u16().to_string();
            ::metrics::counter!(
                REQUESTS_TOTAL,
                "method" => method.clone(),
                "path" => path.clone(),
                "status" => status
            )
            .increment(1);
            ::metrics::histogram!(REQUEST_DURATION, "method" => method, "path" => path)
                .record(start.elapsed().as_secs_f64());
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActionResult, App, Config, Context, Router};
    use bytes::Bytes;
    use metrics_exporter_prometheus::PrometheusBuilder;

    async fn ok(ctx: Context) -> ActionResult {
        ctx.text(http::StatusCode::OK, "ok")
    }

    fn get(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn series_are_labelled_by_route_pattern() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _local = ::metrics::set_default_local_recorder(&recorder);

        let app = App::builder(Config::default())
            .with(Metrics::new())
            .router(Router::new().get("/posts/{id}", ok))
            .build()
            .unwrap();
        for uri in ["/posts/1", "/posts/2", "/nope"] {
            app.handle(get(uri)).await;
        }

        let out = handle.render();
        assert!(
            out.contains(r#"railyard_http_requests_total{method="GET",path="/posts/{id}",status="200"} 2"#),
            "{out}"
        );
        assert!(out.contains(r#"path="unmatched",status="404"} 1"#), "{out}");
        assert!(!out.contains("/posts/1"), "{out}");
    }
}
