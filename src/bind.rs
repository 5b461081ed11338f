//! Request body decoding and validation.
//!
//! JSON bodies go straight through serde. Form bodies (and the query string)
//! are first collected into a JSON object, one key per field: a field sent
//! once becomes a string, a field sent several times becomes an array of
//! strings. The object is then decoded through the same serde path, so one
//! `#[derive(Deserialize)]` serves both.
//!
//! Form values are always strings. Numeric fields on a form target need
//! `#[serde(deserialize_with = ...)]` or a string type.
//!
//! A field the target requires but the body omits is a validation failure,
//! not a malformed body: it is reported as `"{field} is required"` in the
//! `422`, next to whatever [`Validate`] finds. Decoding retries with an empty
//! string in its place so the rest of the target still gets checked.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::http_error::{FieldErrors, HttpError};

/// Structural checks run after a successful decode.
///
/// The default implementation accepts everything.
///
/// ```rust
/// use railyard::{FieldErrors, Validate};
///
/// #[derive(serde::Deserialize)]
/// struct SignUp {
///     #[serde(rename = "Email")]
///     email: String,
/// }
///
/// impl Validate for SignUp {
///     fn validate(&self, errors: &mut FieldErrors) {
///         errors.email("Email", &self.email);
///     }
/// }
/// ```
pub trait Validate {
    fn validate(&self, _errors: &mut FieldErrors) {}
}

impl Validate for Value {}
impl Validate for Map<String, Value> {}

/// A decoded target plus the required fields the body left out.
pub(crate) struct Decoded<T> {
    value: T,
    missing: FieldErrors,
}

pub(crate) fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<Decoded<T>, HttpError> {
    let value = serde_json::from_slice(body).map_err(|e| HttpError::bad_request(format!("invalid JSON body: {e}")))?;
    decode_value(value, "JSON")
}

/// Decodes `application/x-www-form-urlencoded` pairs from `body`, then
/// `query`. Body values come first when a field appears in both.
pub(crate) fn decode_form<T: DeserializeOwned>(body: &[u8], query: Option<&str>) -> Result<Decoded<T>, HttpError> {
    let pairs = url::form_urlencoded::parse(body)
        .chain(url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()));

    let mut fields = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value.into_owned());
        match fields.get_mut(&*key) {
            None => {
                fields.insert(key.into_owned(), value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }

    decode_value(Value::Object(fields), "form")
}

fn decode_value<T: DeserializeOwned>(mut value: Value, kind: &str) -> Result<Decoded<T>, HttpError> {
    let mut missing = FieldErrors::new();
    loop {
        let err = match T::deserialize(&value) {
            Ok(decoded) => return Ok(Decoded { value: decoded, missing }),
            Err(e) => e,
        };
        let Some(field) = missing_field(&err) else {
            if missing.is_empty() {
                return Err(HttpError::bad_request(format!("invalid {kind} body: {err}")));
            }
            // The empty placeholder does not fit the field's type.
            return Err(HttpError::unprocessable_entity(missing));
        };
        let Some(object) = value.as_object_mut().filter(|o| !o.contains_key(&field)) else {
            return Err(HttpError::bad_request(format!("invalid {kind} body: {err}")));
        };
        missing.required(&field, None);
        object.insert(field, Value::String(String::new()));
    }
}

/// The field name out of serde's "missing field `name`" message.
fn missing_field(err: &serde_json::Error) -> Option<String> {
    let message = err.to_string();
    let rest = message.strip_prefix("missing field `")?;
    rest.split_once('`').map(|(field, _)| field.to_owned())
}

/// Runs [`Validate`]; any recorded message, or any missing field, turns into
/// a `422`.
pub(crate) fn validated<T: Validate>(decoded: Decoded<T>) -> Result<T, HttpError> {
    let Decoded { value, mut missing } = decoded;
    let mut errors = FieldErrors::new();
    value.validate(&mut errors);
    missing.merge(errors);
    if missing.is_empty() {
        Ok(value)
    } else {
        Err(HttpError::unprocessable_entity(missing))
    }
}
