use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use railyard::{
    ActionError, ActionResult, App, Config, Context, Environment, FieldErrors, RenderError, Renderer, Request,
    Response, Router, StatusCode, Validate,
};
use serde::Deserialize;
use serde_json::{Value, json};

fn get(uri: &str, accept: &str) -> Request {
    http::Request::builder()
        .uri(uri)
        .header("accept", accept)
        .body(Bytes::new())
        .unwrap()
        .into()
}

fn post_json(uri: &str, body: Value) -> Request {
    http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Bytes::from(body.to_string()))
        .unwrap()
        .into()
}

fn post_form(uri: &str, body: &'static str) -> Request {
    http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Bytes::from_static(body.as_bytes()))
        .unwrap()
        .into()
}

fn body(res: &Response) -> &str {
    std::str::from_utf8(res.body()).unwrap()
}

fn body_json(res: &Response) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

fn app(env: Environment, router: Router) -> App {
    App::builder(Config::default()).env(env).router(router).build().unwrap()
}

// ── Binding ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SignUp {
    name: String,
    email: Option<String>,
}

impl Validate for SignUp {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.required("Name", Some(&self.name));
        errors.required("Email", self.email.as_deref());
        if let Some(email) = &self.email {
            errors.email("Email", email);
        }
    }
}

static SIGN_UP_REACHED: AtomicBool = AtomicBool::new(false);

async fn sign_up(ctx: Context) -> ActionResult {
    let form: SignUp = ctx.bind()?;
    SIGN_UP_REACHED.store(true, Ordering::SeqCst);
    ctx.json(StatusCode::CREATED, &json!({ "name": form.name, "email": form.email }))
}

#[tokio::test]
async fn failed_validation_is_a_422_and_the_action_stops() {
    let app = app(Environment::Test, Router::new().post("/signup", sign_up));

    let res = app.handle(post_json("/signup", json!({ "Name": "Ann" }))).await;
    assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(&res), json!({ "errors": { "Email": ["Email is required"] } }));
    assert!(!SIGN_UP_REACHED.load(Ordering::SeqCst));
}

#[derive(Deserialize)]
struct Strict {
    name: String,
}

impl Validate for Strict {}

async fn strict(ctx: Context) -> ActionResult {
    let strict: Strict = ctx.bind()?;
    ctx.text(StatusCode::OK, strict.name)
}

#[tokio::test]
async fn omitted_fields_are_a_422_not_a_400() {
    let app = app(Environment::Test, Router::new().post("/strict", strict));

    let res = app.handle(post_json("/strict", json!({}))).await;
    assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(&res), json!({ "errors": { "name": ["name is required"] } }));

    let res = app.handle(post_form("/strict", "")).await;
    assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = app.handle(post_json("/strict", json!({ "name": "Ann" }))).await;
    assert_eq!(body(&res), "Ann");
}

#[tokio::test]
async fn undecodable_bodies_are_a_400() {
    let app = app(Environment::Test, Router::new().post("/signup", sign_up));

    let req: Request = http::Request::builder()
        .method("POST")
        .uri("/signup")
        .header("content-type", "application/json")
        .body(Bytes::from_static(b"{\"Name\":"))
        .unwrap()
        .into();
    let res = app.handle(req).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert!(body_json(&res)["error"].as_str().unwrap().starts_with("invalid JSON body"));
}

#[derive(Deserialize)]
struct Search {
    q: String,
    tag: Vec<String>,
}

impl Validate for Search {}

async fn search(ctx: Context) -> ActionResult {
    let search: Search = ctx.bind_form()?;
    ctx.text(StatusCode::OK, format!("{} [{}]", search.q, search.tag.join(",")))
}

#[tokio::test]
async fn forms_merge_body_and_query() {
    let app = app(Environment::Test, Router::new().post("/search", search));

    let res = app.handle(post_form("/search?tag=c", "q=rust+web&tag=a&tag=b")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(body(&res), "rust web [a,b,c]");
}

// ── Write-once ────────────────────────────────────────────────────────────────

async fn writes_twice(ctx: Context) -> ActionResult {
    ctx.json(StatusCode::CREATED, &json!({ "first": true }))?;
    match ctx.text(StatusCode::OK, "second") {
        Err(ActionError::AlreadyWritten) => Ok(()),
        other => other,
    }
}

async fn writes_then_fails(ctx: Context) -> ActionResult {
    ctx.text(StatusCode::ACCEPTED, "queued")?;
    Err(ctx.not_found("too late"))
}

#[tokio::test]
async fn the_first_write_wins() {
    let app = app(
        Environment::Test,
        Router::new().get("/twice", writes_twice).get("/late", writes_then_fails),
    );

    let res = app.handle(get("/twice", "*/*")).await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    assert_eq!(body_json(&res), json!({ "first": true }));

    let res = app.handle(get("/late", "*/*")).await;
    assert_eq!(res.status_code(), StatusCode::ACCEPTED);
    assert_eq!(body(&res), "queued");
}

async fn silent(_ctx: Context) -> ActionResult {
    Ok(())
}

#[tokio::test]
async fn silent_success_is_an_empty_200() {
    let app = app(Environment::Test, Router::new().get("/silent", silent));
    let res = app.handle(get("/silent", "*/*")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(res.body().is_empty());
}

// ── Error mapping ─────────────────────────────────────────────────────────────

async fn missing(ctx: Context) -> ActionResult {
    Err(ctx.not_found("no such widget"))
}

async fn broken(_ctx: Context) -> ActionResult {
    Err(ActionError::other("connection refused by db-primary:5432"))
}

#[tokio::test]
async fn typed_errors_follow_content_negotiation() {
    let app = app(Environment::Test, Router::new().get("/missing", missing));

    let res = app.handle(get("/missing", "text/html")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(body(&res), "no such widget");

    let mut req = get("/missing", "application/json");
    req.headers_mut().insert("content-type", http::HeaderValue::from_static("application/json"));
    let res = app.handle(req).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(&res), json!({ "error": "no such widget" }));
}

#[tokio::test]
async fn generic_errors_never_leak_their_cause() {
    let app = app(Environment::Development, Router::new().get("/broken", broken));

    let res = app.handle(get("/broken", "text/html")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body(&res).contains("db-primary"));
}

// ── Panics ────────────────────────────────────────────────────────────────────

async fn explode(ctx: Context) -> ActionResult {
    let id = ctx.param("id").unwrap_or_default().to_owned();
    if !id.is_empty() {
        panic!("widget {id} exploded");
    }
    Ok(())
}

async fn explode_after_write(ctx: Context) -> ActionResult {
    ctx.text(StatusCode::OK, "already sent")?;
    panic!("late failure");
}

#[tokio::test]
async fn development_panics_render_the_diagnostic_page() {
    let app = app(Environment::Development, Router::new().get("/widgets/{id}", explode));

    let res = app.handle(get("/widgets/7", "text/html")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.header("content-type").unwrap().starts_with("text/html"));

    let page = body(&res);
    assert!(page.contains("widget 7 exploded"));
    assert!(page.contains(r#"class="frame user""#));
}

#[tokio::test]
async fn development_panics_stay_terse_for_json_clients() {
    let app = app(Environment::Development, Router::new().get("/widgets/{id}", explode));

    let res = app.handle(get("/widgets/7", "application/json")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body(&res), r#"{"error":"Internal Server Error"}"#);
}

#[tokio::test]
async fn production_panics_are_a_terse_500() {
    let app = app(Environment::Production, Router::new().get("/widgets/{id}", explode));

    let res = app.handle(get("/widgets/7", "text/html")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.header("content-type").unwrap().starts_with("application/json"));
    assert_eq!(body(&res), r#"{"error":"Internal Server Error"}"#);
}

#[tokio::test]
async fn panics_after_a_write_keep_the_written_response() {
    let app = app(Environment::Development, Router::new().get("/late", explode_after_write));

    let res = app.handle(get("/late", "text/html")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(body(&res), "already sent");
}

#[tokio::test]
async fn a_panic_does_not_poison_later_requests() {
    let app = app(Environment::Production, Router::new().get("/widgets/{id}", explode).get("/ok", silent));

    let _ = app.handle(get("/widgets/1", "*/*")).await;
    assert_eq!(app.handle(get("/ok", "*/*")).await.status_code(), StatusCode::OK);
}

// ── Rendering ─────────────────────────────────────────────────────────────────

struct Greeter;

impl Renderer for Greeter {
    fn render(&self, out: &mut dyn Write, template: &str, data: &Value) -> Result<(), RenderError> {
        let name = data["name"].as_str().ok_or("name missing")?;
        write!(out, "<p>{template}: hello {name}</p>")?;
        Ok(())
    }
}

async fn greet(ctx: Context) -> ActionResult {
    ctx.render("greeting.html", &json!({ "name": "Ann" }))
}

#[tokio::test]
async fn render_goes_through_the_configured_renderer() {
    let app = App::builder(Config::default())
        .env(Environment::Test)
        .renderer(Greeter)
        .router(Router::new().get("/greet", greet))
        .build()
        .unwrap();

    let res = app.handle(get("/greet", "text/html")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(res.header("content-type").unwrap().starts_with("text/html"));
    assert_eq!(body(&res), "<p>greeting.html: hello Ann</p>");
}

#[tokio::test]
async fn render_without_a_renderer_is_a_500() {
    let app = app(Environment::Test, Router::new().get("/greet", greet));
    let res = app.handle(get("/greet", "text/html")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}
