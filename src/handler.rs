//! Handler traits and type erasure.
//!
//! Two kinds of callables live in the route table:
//!
//! - **Actions**: `async fn(ctx: Context) -> ActionResult`. The dispatcher
//!   gives each one a fresh [`Context`] and maps its outcome to a response.
//! - **Endpoints**: `async fn(req: Request) -> impl IntoResponse`. Opaque
//!   request handlers for [`Router::mount`](crate::Router::mount). The
//!   dispatcher itself is an endpoint, which is what lets actions and mounts
//!   share one table.
//!
//! Both are stored behind `Arc<dyn ...>` so handlers of different concrete
//! types fit in one collection:
//!
//! ```text
//! async fn show(ctx: Context) -> ActionResult { … }   ← user writes this
//!        ↓ router.get("/posts/{id}", show)
//! show.into_boxed_handler()                           ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                           ← stored as BoxedHandler
//!        ↓
//! Dispatcher { handler, label }                       ← stored as Arc<dyn Endpoint>
//! ```
//!
//! The per-request cost is one `Arc` clone and one virtual call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::http_error::ActionResult;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future.
///
/// `Send` so tokio can move it between worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ── Actions ───────────────────────────────────────────────────────────────────

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture<'static, ActionResult>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid action.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with the shape:
///
/// ```text
/// async fn name(ctx: Context) -> ActionResult
/// ```
///
/// Sealed, so only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, ActionResult> {
        Box::pin((self.0)(ctx))
    }
}

/// Short display label for a handler type: the last two path segments of its
/// type name, closures collapsed. `blog::posts::index` becomes `posts::index`.
pub(crate) fn label_of<H>() -> String {
    let segments: Vec<&str> = std::any::type_name::<H>()
        .split("::")
        .filter(|s| *s != "{{closure}}")
        .collect();
    let start = segments.len().saturating_sub(2);
    segments[start..].join("::")
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

/// A raw request handler: the seam for mounting external applications
/// (admin panels, job dashboards, another router) under a path prefix.
///
/// Any `Fn(Request) -> impl Future<Output = impl IntoResponse>` is an
/// endpoint. Implement the trait directly for stateful handlers.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture<'static, Response>;
}

impl<F, Fut, R> Endpoint for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        let fut = (self)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
