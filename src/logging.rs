//! Process-wide tracing subscriber.
//!
//! Production logs are one JSON object per line for the log shipper;
//! everything else gets the human-readable pretty format. `RUST_LOG` always
//! wins over the per-environment default filter.

use tracing_subscriber::EnvFilter;

use crate::config::Environment;
use crate::error::Error;

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(env: Environment) -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(env)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if env.is_production() {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.pretty().try_init()
    };
    installed.map_err(Error::Logging)
}

fn default_filter(env: Environment) -> &'static str {
    match env {
        Environment::Development => "debug,hyper=info",
        Environment::Production  => "info",
        Environment::Test        => "warn",
    }
}
