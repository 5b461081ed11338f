//! gzip response compression.
//!
//! Responses are fully buffered, so compression happens in one pass after the
//! chain returns. A response is compressed when the client lists `gzip` in
//! `Accept-Encoding`, the body is at least `min_size` bytes, and nothing
//! downstream has already set a `Content-Encoding`.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use http::HeaderValue;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, VARY};
use tracing::warn;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// Bodies smaller than this are not worth a gzip header.
const DEFAULT_MIN_SIZE: usize = 860;

#[derive(Clone, Debug)]
pub struct Compress {
    min_size: usize,
    level: Compression,
}

impl Compress {
    pub fn new() -> Self {
        Self { min_size: DEFAULT_MIN_SIZE, level: Compression::default() }
    }

    pub fn min_size(mut self, bytes: usize) -> Self {
        self.min_size = bytes;
        self
    }

    /// 0 (none) to 9 (best).
    pub fn level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    fn compress(&self, res: &mut Response) {
        let mut encoder = GzEncoder::new(Vec::with_capacity(res.body().len() / 2), self.level);
        let compressed = encoder.write_all(res.body()).and_then(|()| encoder.finish());
        match compressed {
            Ok(body) => {
                res.set_body(body);
                let headers = res.headers_mut();
                headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
                headers.remove(CONTENT_LENGTH);
            }
            Err(e) => warn!(error = %e, "gzip failed; sending uncompressed"),
        }
    }
}

impl Default for Compress {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Compress {
    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let accepts_gzip = req
                .headers()
                .get_all(ACCEPT_ENCODING)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(','))
                .any(|coding| {
                    let mut parts = coding.trim().split(';');
                    let name = parts.next().unwrap_or_default().trim();
                    let refused = parts.any(|p| matches!(p.trim(), "q=0" | "q=0.0" | "q=0.00" | "q=0.000"));
                    name.eq_ignore_ascii_case("gzip") && !refused
                });

            let mut res = next.run(req).await;
            if accepts_gzip
                && res.body().len() >= self.min_size.max(1)
                && !res.headers().contains_key(CONTENT_ENCODING)
            {
                self.compress(&mut res);
            }
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{App, Config, Context, Router};
    use bytes::Bytes;
    use flate2::read::GzDecoder;
    use http::StatusCode;
    use std::io::Read;

    async fn big(ctx: Context) -> crate::ActionResult {
        ctx.text(StatusCode::OK, "railyard ".repeat(200))
    }

    async fn small(ctx: Context) -> crate::ActionResult {
        ctx.text(StatusCode::OK, "tiny")
    }

    fn app() -> App {
        App::builder(Config::default())
            .with(Compress::new())
            .router(Router::new().get("/big", big).get("/small", small))
            .build()
            .unwrap()
    }

    fn get(uri: &str, encoding: &str) -> Request {
        http::Request::builder()
            .uri(uri)
            .header("accept-encoding", encoding)
            .body(Bytes::new())
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn compresses_large_bodies_for_gzip_clients() {
        let res = app().handle(get("/big", "br, gzip")).await;
        assert_eq!(res.header("content-encoding"), Some("gzip"));

        let mut decoded = String::new();
        GzDecoder::new(res.body().as_ref()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "railyard ".repeat(200));
    }

    #[tokio::test]
    async fn leaves_small_bodies_and_other_clients_alone() {
        let app = app();
        assert_eq!(app.handle(get("/small", "gzip")).await.header("content-encoding"), None);
        assert_eq!(app.handle(get("/big", "br")).await.header("content-encoding"), None);
        assert_eq!(app.handle(get("/big", "gzip;q=0")).await.header("content-encoding"), None);
    }
}
