//! Infrastructure error type.

use crate::config::ConfigError;

/// The error type returned by railyard's boot-time operations.
///
/// Request-level failures (404, 422, ...) are [`HttpError`](crate::HttpError)
/// values returned from actions, not `Error`s. This type covers the things
/// that stop an application from starting: an unusable address, a bad
/// route pattern, unreadable configuration, a logger that will not install.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    Addr(String),

    #[error("invalid route `{path}`: {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("logging: {0}")]
    Logging(#[source] Box<dyn std::error::Error + Send + Sync>),
}
