//! Session store contract and an in-process implementation.
//!
//! A [`Context`](crate::Context) never inspects session storage itself: it
//! asks the configured [`SessionStore`] for the request's [`Session`], lets
//! the action mutate `values` and flashes, and hands the session back to the
//! store to persist. Whatever the store returns as a `Set-Cookie` value is
//! attached to the response.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use http::HeaderValue;
use serde_json::Value;
use tracing::debug;

use crate::request::Request;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend: {0}")]
    Backend(String),
    #[error("invalid session cookie value")]
    Cookie(#[from] http::header::InvalidHeaderValue),
}

/// One client's session.
#[derive(Clone, Debug, Default)]
pub struct Session {
    id: String,
    /// Arbitrary application data.
    pub values: HashMap<String, Value>,
    flashes: HashMap<String, Vec<String>>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn add_flash(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.flashes.entry(key.into()).or_default().push(message.into());
    }

    /// Removes and returns every flash queued under `key`.
    pub fn take_flashes(&mut self, key: &str) -> Vec<String> {
        self.flashes.remove(key).unwrap_or_default()
    }
}

/// Pluggable session persistence.
pub trait SessionStore: Send + Sync + 'static {
    /// Returns the session for this request, or a fresh one.
    fn load(&self, req: &Request) -> Result<Session, SessionError>;

    /// Persists `session`. Returns the `Set-Cookie` value to send, if any.
    fn save(&self, session: &Session) -> Result<Option<HeaderValue>, SessionError>;
}

// ── MemorySessionStore ────────────────────────────────────────────────────────

struct Stored {
    session: Session,
    expires_at: Instant,
}

/// Sessions held in process memory, keyed by a random id in a cookie.
///
/// Suitable for development and single-instance deployments. Sessions are
/// lost on restart and are not shared between processes.
pub struct MemorySessionStore {
    cookie_name: String,
    ttl: Duration,
    sessions: DashMap<String, Stored>,
}

impl MemorySessionStore {
    pub fn new(cookie_name: impl Into<String>, ttl: Duration) -> Self {
        Self { cookie_name: cookie_name.into(), ttl, sessions: DashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn purge_expired(&self, now: Instant) {
        self.sessions.retain(|_, stored| stored.expires_at > now);
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new("railyard_session", Duration::from_secs(86_400))
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, req: &Request) -> Result<Session, SessionError> {
        let now = Instant::now();
        if let Some(id) = req.cookie(&self.cookie_name) {
            if let Some(stored) = self.sessions.get(id) {
                if stored.expires_at > now {
                    return Ok(stored.session.clone());
                }
            }
            debug!(session = id, "unknown or expired session, starting a new one");
        }
        Ok(Session::new(uuid::Uuid::new_v4().to_string()))
    }

    fn save(&self, session: &Session) -> Result<Option<HeaderValue>, SessionError> {
        let now = Instant::now();
        self.purge_expired(now);
        self.sessions.insert(
            session.id.clone(),
            Stored { session: session.clone(), expires_at: now + self.ttl },
        );
        let cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.cookie_name,
            session.id,
            self.ttl.as_secs()
        );
        Ok(Some(HeaderValue::from_str(&cookie)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request_with_cookie(cookie: &str) -> Request {
        http::Request::builder()
            .header("cookie", cookie)
            .body(Bytes::new())
            .unwrap()
            .into()
    }

    #[test]
    fn saved_sessions_are_loaded_back() {
        let store = MemorySessionStore::default();
        let mut session = store.load(&request_with_cookie("other=1")).unwrap();
        session.insert("user_id", 7);
        let cookie = store.save(&session).unwrap().unwrap();
        assert!(cookie.to_str().unwrap().starts_with("railyard_session="));

        let req = request_with_cookie(&format!("railyard_session={}", session.id()));
        let loaded = store.load(&req).unwrap();
        assert_eq!(loaded.get("user_id"), Some(&Value::from(7)));
    }

    #[test]
    fn flashes_are_consumed_once() {
        let mut session = Session::new("s");
        session.add_flash("notice", "Saved");
        assert_eq!(session.take_flashes("notice"), ["Saved"]);
        assert!(session.take_flashes("notice").is_empty());
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let store = MemorySessionStore::new("sid", Duration::ZERO);
        let session = store.load(&request_with_cookie("")).unwrap();
        store.save(&session).unwrap();
        let req = request_with_cookie(&format!("sid={}", session.id()));
        assert_ne!(store.load(&req).unwrap().id(), session.id());
    }
}
