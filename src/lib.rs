//! # railyard
//!
//! A convention-driven HTTP routing and dispatch core for Rust services.
//!
//! Register actions (`async fn(Context) -> ActionResult`) one by one or as
//! conventional CRUD [`Resource`]s, nest and namespace them, wrap the lot in
//! middleware, and railyard turns every request into exactly one response:
//!
//! - Radix-tree routing via [`matchit`], compiled once at boot
//! - A per-request [`Context`] that binds bodies, validates them, and writes
//!   the response exactly once
//! - Typed failures ([`HttpError`]) mapped to status codes and JSON or text
//!   bodies in one place
//! - Panics caught per action and per chain; a diagnostic page in
//!   development, a terse 500 in production
//! - Graceful shutdown on SIGTERM / Ctrl-C, draining in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use railyard::{ActionResult, App, Config, Context, Resource, Router, Server, StatusCode};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), railyard::Error> {
//!     let config = Config::default().with_env_overrides()?;
//!     railyard::logging::init(config.app.env)?;
//!
//!     let router = Router::new()
//!         .get("/healthz", railyard::health::liveness)
//!         .resource("posts", Resource::new("Posts").index(index).show(show));
//!
//!     let app = App::builder(config.clone())
//!         .default_middleware()
//!         .router(router)
//!         .build()?;
//!
//!     Server::bind(&config.app.bind_address)?.serve(app).await
//! }
//!
//! async fn index(ctx: Context) -> ActionResult {
//!     ctx.json(StatusCode::OK, &json!([{ "id": 1 }]))
//! }
//!
//! async fn show(ctx: Context) -> ActionResult {
//!     let id: u64 = ctx
//!         .param("id")
//!         .and_then(|id| id.parse().ok())
//!         .ok_or_else(|| ctx.bad_request("id must be a number"))?;
//!     if id != 1 {
//!         return Err(ctx.not_found("no such post"));
//!     }
//!     ctx.json(StatusCode::OK, &json!({ "id": id }))
//! }
//! ```

mod app;
mod bind;
mod config;
mod context;
mod dispatch;
mod error;
mod fault;
mod handler;
mod http_error;
mod method;
mod plugin;
mod render;
mod request;
mod resource;
mod response;
mod router;
mod server;
mod session;
mod table;

pub mod health;
pub mod inflect;
pub mod logging;
pub mod middleware;

pub use app::{App, AppBuilder};
pub use bind::Validate;
pub use config::{AppConfig, Config, ConfigError, CorsConfig, Environment, RateLimitConfig, SessionConfig};
pub use context::{Context, Principal};
pub use error::Error;
pub use handler::{BoxFuture, Endpoint, Handler};
pub use http::StatusCode;
pub use http_error::{ActionError, ActionResult, FieldErrors, HttpError};
pub use method::Method;
pub use plugin::{MetricsPlugin, Plugin, PluginError};
pub use render::{RenderError, Renderer};
pub use request::{ClientAddr, Request};
pub use resource::{Action, Resource};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{RouteEntry, Router};
pub use server::Server;
pub use session::{MemorySessionStore, Session, SessionError, SessionStore};
pub use table::MatchedRoute;
