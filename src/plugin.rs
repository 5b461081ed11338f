//! Boot-time extensions.
//!
//! A [`Plugin`] bundles routes and middleware an application opts into with
//! [`AppBuilder::plugin`](crate::AppBuilder::plugin). Plugins boot in
//! registration order when the app is built. One whose `boot` fails is logged
//! and skipped: none of its routes or middleware are installed.
//!
//! Plugin routes are registered ahead of the application's, so on a clash the
//! application's route wins. Plugin middleware runs inside the application's.

use std::sync::Arc;

use http::StatusCode;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::Config;
use crate::context::Context;
use crate::method::Method;
use crate::middleware::{Metrics, Middleware};
use crate::router::Router;

/// Error returned by [`Plugin::boot`].
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// One-time setup against the final config.
    fn boot(&mut self, _config: &Config) -> Result<(), PluginError> {
        Ok(())
    }

    /// Adds the plugin's routes to `router`.
    fn routes(&self, router: Router) -> Router {
        router
    }

    /// Middleware to install, outermost first.
    fn middleware(&self) -> Vec<Arc<dyn Middleware>> {
        Vec::new()
    }
}

// ── MetricsPlugin ─────────────────────────────────────────────────────────────

/// Prometheus exposition of everything recorded through the
/// [`metrics`](::metrics) facade, served on `GET /metrics`, plus the
/// per-request [`Metrics`] middleware feeding it.
pub struct MetricsPlugin {
    handle: PrometheusHandle,
    path: String,
}

impl MetricsPlugin {
    /// Installs a Prometheus recorder as the process-global one. Fails when a
    /// recorder is already installed.
    pub fn install() -> Result<Self, PluginError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(Self::with_handle(handle))
    }

    /// Serves a recorder the application installed itself.
    pub fn with_handle(handle: PrometheusHandle) -> Self {
        Self { handle, path: "/metrics".to_owned() }
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_owned();
        self
    }
}

impl Plugin for MetricsPlugin {
    fn name(&self) -> &str {
        "metrics"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn routes(&self, router: Router) -> Router {
        let handle = self.handle.clone();
        router.on_named(Method::Get, &self.path, "Prometheus", move |ctx: Context| {
            let body = handle.render();
            async move { ctx.text(StatusCode::OK, body) }
        })
    }

    fn middleware(&self) -> Vec<Arc<dyn Middleware>> {
        vec![Arc::new(Metrics::new())]
    }
}
