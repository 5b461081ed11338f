//! Built-in health-check actions.
//!
//! | Probe | Suggested path | Body |
//! |---|---|---|
//! | **Liveness** | `/healthz` | `{"status":"ok"}` |
//! | **Readiness** | `/readyz` | `{"status":"ready"}` |
//!
//! ```rust
//! use railyard::{Router, health};
//!
//! let router = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! Replace `readiness` with your own action when traffic should wait for a
//! database or a warm cache.

use http::StatusCode;
use serde_json::json;

use crate::context::Context;
use crate::http_error::ActionResult;

/// Always `200 OK`. If the process can answer HTTP at all, it is alive.
pub async fn liveness(ctx: Context) -> ActionResult {
    ctx.json(StatusCode::OK, &json!({ "status": "ok" }))
}

/// `200 OK` as soon as the server is accepting requests.
pub async fn readiness(ctx: Context) -> ActionResult {
    ctx.json(StatusCode::OK, &json!({ "status": "ready" }))
}
