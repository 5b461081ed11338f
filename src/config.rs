//! Application configuration.
//!
//! Loaded from a TOML file with every key optional, then overridden from the
//! process environment:
//!
//! ```toml
//! [app]
//! name = "blog"
//! bind_address = "0.0.0.0:3000"
//! env = "production"
//!
//! [cors]
//! enabled = true
//! allowed_origins = ["https://blog.example"]
//!
//! [rate_limit]
//! enabled = true
//! limit = 60
//! window_secs = 60
//! ```
//!
//! | Variable | Overrides |
//! |---|---|
//! | `APP_ENV` | `app.env` |
//! | `BIND_ADDRESS` | `app.bind_address` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown environment `{0}` (expected development, production or test)")]
    UnknownEnvironment(String),
}

// ── Environment ───────────────────────────────────────────────────────────────

/// Deployment environment. Controls log format and how much a 500 reveals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production  => "production",
            Self::Test        => "test",
        }
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test"                => Ok(Self::Test),
            other                 => Err(ConfigError::UnknownEnvironment(other.to_owned())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub sessions: SessionConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub bind_address: String,
    pub env: Environment,
    /// Largest request body the server buffers, in bytes. Bigger bodies are
    /// refused with `413 Payload Too Large` before routing.
    pub max_body_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "railyard".to_owned(),
            bind_address: "0.0.0.0:3000".to_owned(),
            env: Environment::Development,
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// Cross-origin policy for [`Cors`](crate::middleware::Cors).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// Exact origins, or `"*"` for any.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    /// Seconds a preflight answer may be cached.
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            allowed_headers: ["Accept", "Authorization", "Content-Type", "X-CSRF-Token"]
                .map(String::from)
                .to_vec(),
            max_age: 86_400,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests allowed per client per window.
    pub limit: usize,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { enabled: false, limit: 60, window_secs: 60 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_secs: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { cookie_name: "railyard_session".to_owned(), ttl_secs: 86_400 }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl Config {
    /// Reads `path`, parses it and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_owned(), source })?;
        Self::from_toml(&text)?.with_env_overrides()
    }

    /// Parses TOML without looking at the environment.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `APP_ENV` and `BIND_ADDRESS` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(env) = lookup("APP_ENV").filter(|v| !v.is_empty()) {
            self.app.env = env.parse()?;
        }
        if let Some(addr) = lookup("BIND_ADDRESS").filter(|v| !v.is_empty()) {
            self.app.bind_address = addr;
        }
        Ok(self)
    }
}
