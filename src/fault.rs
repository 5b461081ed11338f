//! Runtime fault capture and rendering.
//!
//! A panic inside an action must never take the connection down with it, and
//! must never produce a second response. Two guards exist: one around each
//! action (in the dispatcher) and one around the whole middleware chain
//! ([`Recovery`](crate::middleware::Recovery)). Both are a [`Guarded`] future
//! plus [`respond`].
//!
//! While a guarded future is being polled, a process-wide panic hook records
//! the panic location and a backtrace into a thread-local slot instead of
//! printing to stderr. Panics outside a guard go to whatever hook was
//! installed before.
//!
//! What the client sees depends on the environment:
//!
//! | | development | production / test |
//! |---|---|---|
//! | HTML client | diagnostic page (frames, source, request) | `{"error":"Internal Server Error"}` |
//! | JSON client | `{"error":"Internal Server Error"}` | `{"error":"Internal Server Error"}` |

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context as TaskContext, Poll};

use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::config::Environment;
use crate::http_error::ErrorBody;
use crate::middleware::request_id::REQUEST_ID_HEADER;
use crate::request::Request;
use crate::response::{ContentType, Response};

const PAGE: &str = include_str!("fault.html");
const MAX_FRAMES: usize = 64;
const SNIPPET_RADIUS: u32 = 5;

/// Crates whose frames are plumbing rather than application code.
const FRAMEWORK_CRATES: &[&str] = &[
    "alloc", "core", "std", "test",
    "futures_core", "futures_util", "http_body_util", "hyper", "hyper_util", "tokio",
    "railyard",
];

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<Captured>> = const { RefCell::new(None) };
}

struct Captured {
    location: Option<(String, u32)>,
    backtrace: Backtrace,
}

// ── Fault ─────────────────────────────────────────────────────────────────────

/// A panic caught by a guard.
#[derive(Debug)]
pub(crate) struct Fault {
    message: String,
    location: Option<(String, u32)>,
    backtrace: Option<Backtrace>,
}

impl Fault {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_owned()
        };
        let captured = LAST_PANIC.with(|slot| slot.borrow_mut().take());
        Self {
            message,
            location: captured.as_ref().and_then(|c| c.location.clone()),
            backtrace: captured.map(|c| c.backtrace),
        }
    }

    pub(crate) fn message(&self) -> &str {
        &self.message
    }

    fn origin(&self) -> Option<String> {
        self.location.as_ref().map(|(file, line)| format!("{file}:{line}"))
    }

    fn frames(&self) -> Vec<Frame> {
        let mut frames = self
            .backtrace
            .as_ref()
            .map(|bt| parse_frames(&bt.to_string()))
            .unwrap_or_default();

        // Unresolved symbols leave only the panic location to point at the
        // caller.
        if !frames.iter().any(|f| f.is_user) {
            if let Some((file, line)) = &self.location {
                if !is_dependency_file(file) {
                    frames.insert(0, Frame {
                        function: "<panic origin>".to_owned(),
                        file: Some(file.clone()),
                        line: Some(*line),
                        is_user: true,
                    });
                }
            }
        }
        frames
    }
}

// ── Guard ─────────────────────────────────────────────────────────────────────

/// Wraps `fut` so a panic while polling it resolves to `Err(Fault)`.
pub(crate) fn guard<F: Future>(fut: F) -> Guarded<F> {
    install_hook();
    Guarded { inner: Box::pin(fut) }
}

pub(crate) struct Guarded<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for Guarded<F> {
    type Output = Result<F::Output, Fault>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let inner = &mut self.inner;
        GUARD_DEPTH.with(|d| d.set(d.get() + 1));
        let polled = panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx)));
        GUARD_DEPTH.with(|d| d.set(d.get() - 1));

        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(out)) => Poll::Ready(Ok(out)),
            Err(payload) => Poll::Ready(Err(Fault::from_payload(payload))),
        }
    }
}

fn install_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let captured = Captured {
                location: info.location().map(|l| (l.file().to_owned(), l.line())),
                backtrace: Backtrace::force_capture(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(captured));
        }));
    });
}

// ── Request snapshot ──────────────────────────────────────────────────────────

/// The parts of a request the fault page shows, copied before the request is
/// handed off (and possibly lost to an unwind).
#[derive(Clone, Debug, Serialize)]
pub(crate) struct RequestHead {
    method: String,
    uri: String,
    headers: Vec<(String, String)>,
    request_id: Option<String>,
    #[serde(skip)]
    json_client: bool,
}

impl RequestHead {
    pub(crate) fn capture(req: &Request) -> Self {
        let accepts_json = req
            .header("accept")
            .is_some_and(|a| a.contains("application/json") && !a.contains("text/html"));
        Self {
            method: req.method().to_string(),
            uri: req.uri().to_string(),
            headers: req
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect(),
            request_id: req.header(REQUEST_ID_HEADER).map(str::to_owned),
            json_client: req.is_json() || accepts_json,
        }
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Logs `fault` in full and builds the client-facing 500.
pub(crate) fn respond(env: Environment, head: &RequestHead, fault: &Fault) -> Response {
    log(head, fault);

    if env.is_development() && !head.json_client {
        match render_page(env, head, fault) {
            Ok(page) => {
                return Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .bytes(ContentType::Html, page);
            }
            Err(e) => error!(error = %e, "failed to render fault page"),
        }
    }
    internal_error_json()
}

/// Server-side record of a fault: message, origin, request and backtrace.
pub(crate) fn log(head: &RequestHead, fault: &Fault) {
    error!(
        panic = fault.message(),
        origin = fault.origin().as_deref().unwrap_or("unknown"),
        method = %head.method,
        uri = %head.uri,
        request_id = head.request_id.as_deref().unwrap_or("-"),
        backtrace = %fault.backtrace.as_ref().map(ToString::to_string).unwrap_or_default(),
        "request panicked"
    );
}

/// `500` with the stock `{"error":"Internal Server Error"}` body.
pub(crate) fn internal_error_json() -> Response {
    let body = serde_json::to_vec(&ErrorBody::Message("Internal Server Error"))
        .unwrap_or_else(|_| br#"{"error":"Internal Server Error"}"#.to_vec());
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .json(body)
}

#[derive(Serialize)]
struct Page<'a> {
    error_type: &'static str,
    message: &'a str,
    origin: Option<String>,
    snippet: Vec<SnippetLine>,
    frames: Vec<Frame>,
    request: &'a RequestHead,
    env: &'static str,
    version: &'static str,
}

fn render_page(env: Environment, head: &RequestHead, fault: &Fault) -> Result<String, minijinja::Error> {
    let frames = fault.frames();
    let snippet = frames
        .iter()
        .find(|f| f.is_user)
        .and_then(|f| Some(source_snippet(f.file.as_deref()?, f.line?)))
        .unwrap_or_default();

    let page = Page {
        error_type: "panic",
        message: fault.message(),
        origin: fault.origin(),
        snippet,
        frames,
        request: head,
        env: env.as_str(),
        version: env!("CARGO_PKG_VERSION"),
    };

    let mut jinja = minijinja::Environment::new();
    jinja.add_template("fault.html", PAGE)?;
    jinja.get_template("fault.html")?.render(&page)
}

// ── Backtrace parsing ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Frame {
    function: String,
    file: Option<String>,
    line: Option<u32>,
    is_user: bool,
}

#[derive(Debug, Serialize)]
struct SnippetLine {
    number: u32,
    text: String,
    highlight: bool,
}

/// Parses the `Display` form of a std backtrace:
///
/// ```text
///    3: blog::posts::show::{{closure}}
///              at ./src/posts.rs:41:9
/// ```
fn parse_frames(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                if frame.file.is_none() {
                    let (file, line_no) = split_location(location);
                    frame.file = Some(file.to_owned());
                    frame.line = line_no;
                }
            }
            continue;
        }
        let Some((index, function)) = line.split_once(": ") else { continue };
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if frames.len() == MAX_FRAMES {
            break;
        }
        frames.push(Frame {
            function: function.to_owned(),
            file: None,
            line: None,
            is_user: false,
        });
    }
    for frame in &mut frames {
        frame.is_user = !is_framework(&frame.function, frame.file.as_deref());
    }
    frames
}

/// `path/to/file.rs:41:9` → (`path/to/file.rs`, `Some(41)`).
fn split_location(location: &str) -> (&str, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let col = parts.next();
    let line = parts.next();
    match (parts.next(), line, col) {
        (Some(file), Some(line), Some(_)) => (file, line.parse().ok()),
        _ => (location, None),
    }
}

fn is_framework(function: &str, file: Option<&str>) -> bool {
    if function == "<unknown>" || file.is_some_and(is_dependency_file) {
        return true;
    }
    let krate = owning_crate(function);
    FRAMEWORK_CRATES.contains(&krate)
        || krate.starts_with("__")
        || krate.starts_with("rust_")
        || matches!(krate, "_start" | "main" | "start_thread" | "clone" | "clone3")
}

fn is_dependency_file(file: &str) -> bool {
    file.starts_with("/rustc/") || file.contains("/.cargo/registry/") || file.contains("/.cargo/git/")
}

/// First path segment of the item a frame belongs to. For trait-impl frames
/// (`<A as B>::f`) that is `A`'s crate, or `B`'s when `A` is a bare type
/// parameter.
fn owning_crate(function: &str) -> &str {
    let name = function
        .trim_start_matches('<')
        .trim_start_matches("&mut ")
        .trim_start_matches('&');
    let name = match name.split_once(" as ") {
        Some((self_ty, trait_path)) if !self_ty.contains("::") => trait_path,
        Some((self_ty, _)) => self_ty,
        None => name,
    };
    name.split("::").next().unwrap_or(name)
}

fn source_snippet(file: &str, line: u32) -> Vec<SnippetLine> {
    let Ok(source) = std::fs::read_to_string(file) else {
        return Vec::new();
    };
    let first = line.saturating_sub(SNIPPET_RADIUS).max(1);
    source
        .lines()
        .zip(1u32..)
        .skip_while(|(_, n)| *n < first)
        .take_while(|(_, n)| *n <= line + SNIPPET_RADIUS)
        .map(|(text, number)| SnippetLine { number, text: text.to_owned(), highlight: number == line })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "   0: railyard::fault::install_hook::{{closure}}
             at ./src/fault.rs:120:29
   1: std::panicking::rust_panic_with_hook
             at /rustc/abc/library/std/src/panicking.rs:809:13
   2: blog::posts::show::{{closure}}
             at ./demos/blog.rs:41:9
   3: <core::pin::Pin<P> as core::future::future::Future>::poll
             at /rustc/abc/library/core/src/future/future.rs:123:9
   4: <F as railyard::handler::Endpoint>::call
   5: tokio::runtime::task::harness::poll_future
             at /home/u/.cargo/registry/src/index/tokio-1.40.0/src/runtime/task/harness.rs:473:19
   6: __libc_start_main
   7: <unknown>";

    #[test]
    fn parses_and_classifies_frames() {
        let frames = parse_frames(TRACE);
        assert_eq!(frames.len(), 8);

        let user: Vec<&str> = frames.iter().filter(|f| f.is_user).map(|f| f.function.as_str()).collect();
        assert_eq!(user, ["blog::posts::show::{{closure}}"]);

        let show = &frames[2];
        assert_eq!(show.file.as_deref(), Some("./demos/blog.rs"));
        assert_eq!(show.line, Some(41));
    }

    #[test]
    fn owning_crate_of_trait_impls() {
        assert_eq!(owning_crate("<alloc::boxed::Box<F,A> as core::ops::FnOnce<Args>>::call_once"), "alloc");
        assert_eq!(owning_crate("<F as railyard::handler::Endpoint>::call"), "railyard");
        assert_eq!(owning_crate("<&mut blog::Posts as Clone>::clone"), "blog");
        assert_eq!(owning_crate("blog::main"), "blog");
    }

    #[tokio::test]
    async fn guard_catches_panics_and_passes_values_through() {
        assert_eq!(guard(async { 7 }).await.unwrap(), 7);

        let fault = guard(async {
            if true {
                panic!("boom at {}", 42);
            }
        })
        .await
        .unwrap_err();
        assert_eq!(fault.message(), "boom at 42");
        assert!(fault.origin().unwrap().contains("fault.rs"));
    }

    #[test]
    fn production_response_is_terse() {
        let head = RequestHead {
            method: "GET".into(),
            uri: "/".into(),
            headers: Vec::new(),
            request_id: None,
            json_client: false,
        };
        let fault = Fault { message: "secret detail".into(), location: None, backtrace: None };
        let res = respond(Environment::Production, &head, &fault);
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body().as_ref(), br#"{"error":"Internal Server Error"}"#);
    }
}
