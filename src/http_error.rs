//! Typed request failures.
//!
//! A handler signals "this request failed in a way the client should hear
//! about" by returning an [`HttpError`]. Everything else, from a database
//! driver error to a serialisation bug, is a generic failure and becomes a
//! terse 500. The dispatcher is the only code that turns either kind into
//! bytes on the wire.

use std::collections::BTreeMap;
use std::fmt;

use http::StatusCode;
use serde::Serialize;

// ── FieldErrors ───────────────────────────────────────────────────────────────

/// Validation messages keyed by field name.
///
/// Fields iterate in name order and each field keeps its messages in the
/// order they were added, so JSON error bodies are stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Adds every message of `other` this set does not already hold.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            let existing = self.0.entry(field).or_default();
            for message in messages {
                if !existing.contains(&message) {
                    existing.push(message);
                }
            }
        }
    }

    /// Records `"{field} is required"` unless `value` is present and non-blank.
    pub fn required(&mut self, field: &str, value: Option<&str>) {
        if value.is_none_or(|v| v.trim().is_empty()) {
            self.add(field, format!("{field} is required"));
        }
    }

    pub fn min_length(&mut self, field: &str, value: &str, min: usize) {
        if value.chars().count() < min {
            self.add(field, format!("{field} must be at least {min} characters"));
        }
    }

    pub fn max_length(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(field, format!("{field} must be at most {max} characters"));
        }
    }

    /// Shape check only: one `@` with something on both sides and a dot in
    /// the domain.
    pub fn email(&mut self, field: &str, value: &str) {
        let valid = value
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.split('.').count() >= 2
                    && domain.split('.').all(|part| !part.is_empty())
            });
        if !valid {
            self.add(field, format!("{field} must be a valid email address"));
        }
    }
}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// A failure with an explicit HTTP status and an optional per-field breakdown.
///
/// Usually built through the [`Context`](crate::Context) helpers
/// (`ctx.not_found("no such post")`) or produced by
/// [`Context::bind`](crate::Context::bind) when validation fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpError {
    code: StatusCode,
    message: String,
    field_errors: Option<FieldErrors>,
}

impl HttpError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), field_errors: None }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// `422` carrying field-level messages.
    pub fn unprocessable_entity(errors: FieldErrors) -> Self {
        Self {
            code: StatusCode::UNPROCESSABLE_ENTITY,
            message: "Validation failed".to_owned(),
            field_errors: Some(errors),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        self.field_errors.as_ref()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {}

// ── ActionError ───────────────────────────────────────────────────────────────

/// Everything an action can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// A typed failure; its status and message reach the client.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A second write was attempted on a context that already answered.
    /// This is a bug in the handler, not a client-facing failure.
    #[error("response already written")]
    AlreadyWritten,

    /// Any other failure. Logged in full, answered with a bare 500.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ActionError {
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Other(Box::new(e))
    }
}

impl From<std::io::Error> for ActionError {
    fn from(e: std::io::Error) -> Self {
        Self::Other(Box::new(e))
    }
}

/// What every action returns.
pub type ActionResult = Result<(), ActionError>;

// ── Wire shape ────────────────────────────────────────────────────────────────

/// JSON error body: `{"error": "..."}` or `{"errors": {"field": ["..."]}}`.
#[derive(Serialize)]
pub(crate) enum ErrorBody<'a> {
    #[serde(rename = "error")]
    Message(&'a str),
    #[serde(rename = "errors")]
    Fields(&'a FieldErrors),
}

impl<'a> ErrorBody<'a> {
    pub(crate) fn for_error(err: &'a HttpError) -> Self {
        match &err.field_errors {
            Some(fields) => Self::Fields(fields),
            None => Self::Message(&err.message),
        }
    }
}
