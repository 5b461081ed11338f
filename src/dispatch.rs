//! Action dispatcher.
//!
//! Each action route in the table is a [`Dispatcher`]: it builds a fresh
//! [`Context`], runs the action inside a panic guard, and turns the outcome
//! into exactly one response.
//!
//! | Outcome | Already written | Response |
//! |---|---|---|
//! | `Ok(())` | yes | the written response |
//! | `Ok(())` | no | empty `200` |
//! | `Err(Http(e))` | no | `e.code()`, JSON body for JSON clients or field errors, else text |
//! | `Err(Other(_))` | no | `500`, cause logged only |
//! | panic | no | dev page or terse JSON `500`, see [`fault`](crate::fault) |
//! | any failure | yes | the written response; failure logged |

use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error, warn};

use crate::app::Services;
use crate::context::{Context, ResponseSlot};
use crate::fault::{self, RequestHead};
use crate::handler::{BoxFuture, BoxedHandler, Endpoint};
use crate::http_error::{ActionError, ErrorBody, HttpError};
use crate::request::Request;
use crate::response::Response;

pub(crate) struct Dispatcher {
    handler: BoxedHandler,
    label: Arc<str>,
}

impl Dispatcher {
    pub(crate) fn new(handler: BoxedHandler, label: String) -> Self {
        Self { handler, label: label.into() }
    }
}

impl Endpoint for Dispatcher {
    fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        Box::pin(dispatch(Arc::clone(&self.handler), Arc::clone(&self.label), req))
    }
}

async fn dispatch(handler: BoxedHandler, label: Arc<str>, req: Request) -> Response {
    let services = req.extensions().get::<Arc<Services>>().cloned().unwrap_or_default();
    let head = RequestHead::capture(&req);
    let json_client = req.is_json();
    let slot = Arc::new(ResponseSlot::default());

    let ctx = Context::new(req, Arc::clone(&services), Arc::clone(&slot));
    let outcome = fault::guard(async move { handler.call(ctx).await }).await;

    match outcome {
        Ok(Ok(())) => {
            if !slot.is_written() {
                debug!(action = %label, "action wrote no response; sending empty 200");
                let _ = slot.write(Response::status(StatusCode::OK));
            }
        }
        Ok(Err(ActionError::AlreadyWritten)) => {}
        Ok(Err(ActionError::Http(err))) => {
            if slot.is_written() {
                warn!(action = %label, error = %err, "typed error after the response was written; dropped");
            } else {
                let _ = slot.write(http_error_response(&err, json_client));
            }
        }
        Ok(Err(ActionError::Other(err))) => {
            error!(action = %label, error = %err, "action failed");
            if !slot.is_written() {
                let _ = slot.write(internal_error_response(json_client));
            }
        }
        Err(fault) => {
            if slot.is_written() {
                fault::log(&head, &fault);
            } else {
                let _ = slot.write(fault::respond(services.env, &head, &fault));
            }
        }
    }

    slot.take().unwrap_or_else(|| internal_error_response(json_client))
}

fn http_error_response(err: &HttpError, json_client: bool) -> Response {
    if json_client || err.field_errors().is_some() {
        if let Ok(body) = serde_json::to_vec(&ErrorBody::for_error(err)) {
            return Response::builder().status(err.code()).json(body);
        }
    }
    Response::builder().status(err.code()).text(err.message())
}

fn internal_error_response(json_client: bool) -> Response {
    if json_client {
        fault::internal_error_json()
    } else {
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .text("Internal Server Error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::handler::Handler;
    use crate::http_error::{ActionResult, FieldErrors};
    use bytes::Bytes;

    async fn run<H: Handler>(handler: H, json: bool) -> Response {
        let mut req = http::Request::builder();
        if json {
            req = req.header("content-type", "application/json");
        }
        let dispatcher = Dispatcher::new(handler.into_boxed_handler(), "test".to_owned());
        dispatcher.call(req.body(Bytes::new()).unwrap().into()).await
    }

    async fn silent(_ctx: Context) -> ActionResult {
        Ok(())
    }

    async fn missing(ctx: Context) -> ActionResult {
        Err(ctx.not_found("no such post"))
    }

    async fn invalid(ctx: Context) -> ActionResult {
        let mut errors = FieldErrors::new();
        errors.add("title", "title is required");
        Err(ctx.unprocessable_entity(errors))
    }

    async fn broken(_ctx: Context) -> ActionResult {
        Err(ActionError::other("database password is hunter2"))
    }

    async fn answered_then_failed(ctx: Context) -> ActionResult {
        ctx.text(StatusCode::ACCEPTED, "queued")?;
        Err(ctx.bad_request("too late"))
    }

    #[tokio::test]
    async fn silent_success_is_an_empty_200() {
        let res = run(silent, false).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(res.body().is_empty());
    }

    #[tokio::test]
    async fn typed_errors_follow_content_negotiation() {
        let text = run(missing, false).await;
        assert_eq!(text.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(text.body().as_ref(), b"no such post");

        let json = run(missing, true).await;
        assert_eq!(json.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(json.body().as_ref(), br#"{"error":"no such post"}"#);
    }

    #[tokio::test]
    async fn field_errors_are_always_json() {
        let res = run(invalid, false).await;
        assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.body().as_ref(), br#"{"errors":{"title":["title is required"]}}"#);
    }

    #[tokio::test]
    async fn generic_failures_hide_their_cause() {
        let res = run(broken, true).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body().as_ref(), br#"{"error":"Internal Server Error"}"#);

        let res = run(broken, false).await;
        assert_eq!(res.body().as_ref(), b"Internal Server Error");
    }

    #[tokio::test]
    async fn written_response_survives_a_later_failure() {
        let res = run(answered_then_failed, true).await;
        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        assert_eq!(res.body().as_ref(), b"queued");
    }
}
