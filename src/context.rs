//! The per-request façade handed to every action.
//!
//! A [`Context`] owns the request and is the only way an action produces
//! output. Every writer (`json`, `text`, `html`, `render`, `redirect`,
//! `status`) goes through one shared response slot that can be filled exactly
//! once: the first write wins, any later write is refused with
//! [`ActionError::AlreadyWritten`] and logged. The dispatcher writes its own
//! error responses through the same slot, so a handler that answered and then
//! failed keeps its answer.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use http::header::{CACHE_CONTROL, HeaderName, HeaderValue, LOCATION, REFERER, SET_COOKIE};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use crate::app::Services;
use crate::bind::{self, Validate};
use crate::config::Environment;
use crate::http_error::{ActionError, ActionResult, FieldErrors, HttpError};
use crate::middleware::csrf::CsrfToken;
use crate::middleware::request_id::REQUEST_ID_HEADER;
use crate::request::Request;
use crate::response::{ContentType, Response};
use crate::session::Session;

// ── Response slot ─────────────────────────────────────────────────────────────

/// Write-once holder for the response of one request.
#[derive(Default)]
pub(crate) struct ResponseSlot {
    written: AtomicBool,
    response: Mutex<Option<Response>>,
}

impl ResponseSlot {
    pub(crate) fn write(&self, res: Response) -> ActionResult {
        if self.written.swap(true, Ordering::AcqRel) {
            error!(status = res.status_code().as_u16(), "response already written; second write dropped");
            return Err(ActionError::AlreadyWritten);
        }
        *self.response.lock() = Some(res);
        Ok(())
    }

    pub(crate) fn is_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    pub(crate) fn take(&self) -> Option<Response> {
        self.response.lock().take()
    }

    fn status(&self) -> Option<StatusCode> {
        self.response.lock().as_ref().map(Response::status_code)
    }
}

// ── Principal ─────────────────────────────────────────────────────────────────

/// The authenticated identity of a request.
///
/// Authentication middleware inserts one into the request extensions; the
/// action reads it back, typed, with [`Context::current_principal`].
#[derive(Clone)]
pub struct Principal(Arc<dyn Any + Send + Sync>);

impl Principal {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Request data in, response out.
pub struct Context {
    request: Request,
    services: Arc<Services>,
    slot: Arc<ResponseSlot>,
    headers: HeaderMap,
    cache_ttl: Option<Duration>,
    principal: Option<Principal>,
    session: Option<Session>,
}

impl Context {
    pub(crate) fn new(request: Request, services: Arc<Services>, slot: Arc<ResponseSlot>) -> Self {
        let principal = request.extensions().get::<Principal>().cloned();
        Self {
            request,
            services,
            slot,
            headers: HeaderMap::new(),
            cache_ttl: None,
            principal,
            session: None,
        }
    }

    // ── Request data ──────────────────────────────────────────────────────────

    /// Path parameter captured by the route (`{id}` → `param("id")`).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    pub fn query(&self, name: &str) -> Option<String> {
        self.request.query(name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn is_json(&self) -> bool {
        self.request.is_json()
    }

    /// `true` for requests sent by htmx (`HX-Request: true`).
    pub fn is_htmx(&self) -> bool {
        self.request.header("hx-request") == Some("true")
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request.header(REQUEST_ID_HEADER)
    }

    /// Token to embed in forms, when [`Csrf`](crate::middleware::Csrf) is
    /// installed.
    pub fn csrf_token(&self) -> Option<&str> {
        self.request.extensions().get::<CsrfToken>().map(CsrfToken::as_str)
    }

    pub fn env(&self) -> Environment {
        self.services.env
    }

    // ── Binding ───────────────────────────────────────────────────────────────

    /// Decodes the body into `T` and validates it.
    ///
    /// JSON when the `Content-Type` says so, form-encoded otherwise. A body
    /// that does not decode is a `400`; a failed [`Validate`] is a `422`
    /// carrying the field messages.
    pub fn bind<T: DeserializeOwned + Validate>(&self) -> Result<T, HttpError> {
        if self.is_json() { self.bind_json() } else { self.bind_form() }
    }

    pub fn bind_json<T: DeserializeOwned + Validate>(&self) -> Result<T, HttpError> {
        bind::validated(bind::decode_json(self.request.body())?)
    }

    pub fn bind_form<T: DeserializeOwned + Validate>(&self) -> Result<T, HttpError> {
        bind::validated(bind::decode_form(self.request.body(), self.request.uri().query())?)
    }

    // ── Writers ───────────────────────────────────────────────────────────────

    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> ActionResult {
        let body = serde_json::to_vec(value)?;
        self.write(Response::builder().status(status).json(body))
    }

    pub fn text(&self, status: StatusCode, body: impl Into<String>) -> ActionResult {
        self.write(Response::builder().status(status).text(body))
    }

    pub fn html(&self, status: StatusCode, body: impl Into<String>) -> ActionResult {
        let body: String = body.into();
        self.write(Response::builder().status(status).bytes(ContentType::Html, body))
    }

    /// Renders `template` with the configured [`Renderer`](crate::Renderer).
    pub fn render<T: Serialize + ?Sized>(&self, template: &str, data: &T) -> ActionResult {
        let renderer = self
            .services
            .renderer
            .as_ref()
            .ok_or_else(|| ActionError::other("no renderer configured"))?;
        let data = serde_json::to_value(data)?;
        let mut out = Vec::new();
        renderer.render(&mut out, template, &data).map_err(ActionError::Other)?;
        self.write(Response::builder().bytes(ContentType::Html, out))
    }

    /// `302 Found` to `url`.
    pub fn redirect(&self, url: &str) -> ActionResult {
        let location = HeaderValue::from_str(url)
            .map_err(|_| HttpError::internal_error(format!("invalid redirect target `{url}`")))?;
        let mut res = Response::status(StatusCode::FOUND);
        res.headers_mut().insert(LOCATION, location);
        self.write(res)
    }

    /// Redirects to the `Referer`, or to `fallback` when there is none.
    pub fn redirect_back(&self, fallback: &str) -> ActionResult {
        let target = self.header(REFERER.as_str()).unwrap_or(fallback).to_owned();
        self.redirect(&target)
    }

    /// Answers with `code` and no body.
    pub fn status(&self, code: StatusCode) -> ActionResult {
        self.write(Response::status(code))
    }

    /// Adds a header to whichever response this action writes.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(header = name, "dropping invalid response header"),
        }
    }

    /// Marks a successful response as cacheable for `ttl`.
    pub fn cache_action(&mut self, ttl: Duration) {
        self.cache_ttl = Some(ttl);
    }

    pub fn written(&self) -> bool {
        self.slot.is_written()
    }

    /// Status of the written response; `200` until something is written.
    pub fn status_code(&self) -> StatusCode {
        self.slot.status().unwrap_or(StatusCode::OK)
    }

    fn write(&self, mut res: Response) -> ActionResult {
        for (name, value) in &self.headers {
            res.headers_mut().append(name, value.clone());
        }
        if let Some(ttl) = self.cache_ttl {
            if res.status_code().is_success() {
                let value = format!("public, max-age={}", ttl.as_secs());
                if let Ok(value) = HeaderValue::from_str(&value) {
                    res.headers_mut().insert(CACHE_CONTROL, value);
                }
            }
        }
        self.slot.write(res)
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    /// The request's session, loaded on first use. `None` without a session
    /// store.
    pub fn session(&mut self) -> Option<&mut Session> {
        if self.session.is_none() {
            let store = self.services.sessions.as_ref()?;
            match store.load(&self.request) {
                Ok(session) => self.session = Some(session),
                Err(e) => {
                    error!(error = %e, "failed to load session");
                    return None;
                }
            }
        }
        self.session.as_mut()
    }

    /// Persists the session and queues its cookie on the response.
    pub fn save_session(&mut self) -> ActionResult {
        let (Some(store), Some(session)) = (self.services.sessions.as_ref(), self.session.as_ref()) else {
            return Ok(());
        };
        let cookie = store.save(session).map_err(ActionError::other)?;
        if let Some(cookie) = cookie {
            if self.written() {
                warn!("session saved after the response was written; cookie not sent");
            }
            self.headers.insert(SET_COOKIE, cookie);
        }
        Ok(())
    }

    /// Queues a one-shot message for the next request that reads `key`.
    pub fn flash(&mut self, key: &str, message: impl Into<String>) -> ActionResult {
        let Some(session) = self.session() else { return Ok(()) };
        session.add_flash(key, message);
        self.save_session()
    }

    /// Takes the first message queued under `key`.
    pub fn get_flash(&mut self, key: &str) -> Option<String> {
        let message = self.session()?.take_flashes(key).into_iter().next();
        if message.is_some() {
            if let Err(e) = self.save_session() {
                error!(error = %e, "failed to save session after reading flash");
            }
        }
        message
    }

    // ── Identity ──────────────────────────────────────────────────────────────

    pub fn current_principal<T: Any>(&self) -> Option<&T> {
        self.principal.as_ref()?.downcast_ref()
    }

    pub fn set_current_principal<T: Any + Send + Sync>(&mut self, value: T) {
        let principal = Principal::new(value);
        self.request.extensions_mut().insert(principal.clone());
        self.principal = Some(principal);
    }

    // ── Errors ────────────────────────────────────────────────────────────────

    pub fn bad_request(&self, message: impl Into<String>) -> ActionError {
        HttpError::bad_request(message).into()
    }

    pub fn not_found(&self, message: impl Into<String>) -> ActionError {
        HttpError::not_found(message).into()
    }

    pub fn forbidden(&self, message: impl Into<String>) -> ActionError {
        HttpError::forbidden(message).into()
    }

    pub fn unprocessable_entity(&self, errors: FieldErrors) -> ActionError {
        HttpError::unprocessable_entity(errors).into()
    }

    pub fn internal_error(&self, message: impl Into<String>) -> ActionError {
        HttpError::internal_error(message).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use bytes::Bytes;

    fn context_with(services: Services, req: http::Request<Bytes>) -> (Context, Arc<ResponseSlot>) {
        let slot = Arc::new(ResponseSlot::default());
        (Context::new(req.into(), Arc::new(services), Arc::clone(&slot)), slot)
    }

    fn context() -> (Context, Arc<ResponseSlot>) {
        context_with(Services::default(), http::Request::new(Bytes::new()))
    }

    #[test]
    fn second_write_is_refused_and_first_response_stands() {
        let (ctx, slot) = context();
        ctx.json(StatusCode::CREATED, &serde_json::json!({"id": 1})).unwrap();
        let second = ctx.text(StatusCode::OK, "again");

        assert!(matches!(second, Err(ActionError::AlreadyWritten)));
        assert!(ctx.written());
        assert_eq!(ctx.status_code(), StatusCode::CREATED);
        let res = slot.take().unwrap();
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.body().as_ref(), br#"{"id":1}"#);
    }

    #[test]
    fn pending_headers_and_cache_ttl_are_merged() {
        let (mut ctx, slot) = context();
        ctx.set_header("x-total", "3");
        ctx.cache_action(Duration::from_secs(60));
        ctx.text(StatusCode::OK, "cached").unwrap();

        let res = slot.take().unwrap();
        assert_eq!(res.header("x-total"), Some("3"));
        assert_eq!(res.header("cache-control"), Some("public, max-age=60"));
    }

    #[test]
    fn redirect_back_prefers_the_referer() {
        let req = http::Request::builder().header("referer", "/posts/3").body(Bytes::new()).unwrap();
        let (ctx, slot) = context_with(Services::default(), req);
        ctx.redirect_back("/").unwrap();
        let res = slot.take().unwrap();
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/posts/3"));
    }

    #[test]
    fn principal_round_trips_by_type() {
        #[derive(Debug, PartialEq)]
        struct User(u32);

        let (mut ctx, _) = context();
        assert!(ctx.current_principal::<User>().is_none());
        ctx.set_current_principal(User(7));
        assert_eq!(ctx.current_principal::<User>(), Some(&User(7)));
        assert!(ctx.current_principal::<String>().is_none());
    }

    #[test]
    fn flashes_survive_into_the_next_request() {
        let store = Arc::new(MemorySessionStore::default());
        let services = || Services { sessions: Some(store.clone()), ..Services::default() };

        let (mut first, slot) = context_with(services(), http::Request::new(Bytes::new()));
        first.flash("notice", "Post created").unwrap();
        first.redirect("/posts").unwrap();
        let cookie = slot.take().unwrap().header("set-cookie").unwrap().to_owned();
        let pair = cookie.split(';').next().unwrap().to_owned();

        let req = http::Request::builder().header("cookie", pair).body(Bytes::new()).unwrap();
        let (mut second, _) = context_with(services(), req);
        assert_eq!(second.get_flash("notice").as_deref(), Some("Post created"));
        assert_eq!(second.get_flash("notice"), None);
    }

    #[test]
    fn session_helpers_are_inert_without_a_store() {
        let (mut ctx, _) = context();
        assert!(ctx.session().is_none());
        assert!(ctx.flash("notice", "ignored").is_ok());
        assert_eq!(ctx.get_flash("notice"), None);
    }
}
