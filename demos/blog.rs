//! A small blog: posts with nested comments, HTML through minijinja, JSON for
//! API clients, flash messages across redirects.
//!
//! ```text
//! cargo run --example blog
//! curl -H 'content-type: application/json' -d '{"title":"Hello","body":"First post"}' localhost:3000/posts
//! curl localhost:3000/posts/1/comments
//! curl localhost:3000/metrics
//! ```
//!
//! Reads `railyard.toml` from the working directory when present; `APP_ENV`
//! and `BIND_ADDRESS` override it.

use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use parking_lot::RwLock;
use railyard::middleware::{Compress, Csrf};
use railyard::{
    ActionResult, App, Config, Context, FieldErrors, MetricsPlugin, RenderError, Renderer, Request, Resource, Router,
    Server, StatusCode, Validate,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

// ── Storage ───────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize)]
struct Post {
    id: u64,
    title: String,
    body: String,
    comments: Vec<String>,
}

static POSTS: LazyLock<RwLock<Vec<Post>>> = LazyLock::new(|| {
    RwLock::new(vec![Post {
        id: 1,
        title: "Welcome".to_owned(),
        body: "railyard is up.".to_owned(),
        comments: Vec::new(),
    }])
});

fn find(ctx: &Context, name: &str) -> Result<Post, railyard::ActionError> {
    let id: u64 = ctx
        .param(name)
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| ctx.bad_request(format!("{name} must be a number")))?;
    POSTS
        .read()
        .iter()
        .find(|p| p.id == id)
        .cloned()
        .ok_or_else(|| ctx.not_found(format!("post {id} not found")))
}

// ── Forms ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PostForm {
    title: String,
    body: String,
}

impl Validate for PostForm {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.required("title", Some(&self.title));
        errors.max_length("title", &self.title, 120);
        errors.min_length("body", &self.body, 3);
    }
}

#[derive(Deserialize)]
struct CommentForm {
    text: String,
}

impl Validate for CommentForm {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.required("text", Some(&self.text));
    }
}

// ── Posts ─────────────────────────────────────────────────────────────────────

async fn index(mut ctx: Context) -> ActionResult {
    let posts = POSTS.read().clone();
    if ctx.is_json() {
        return ctx.json(StatusCode::OK, &posts);
    }
    let notice = ctx.get_flash("notice");
    ctx.render("posts/index.html", &json!({ "posts": posts, "notice": notice }))
}

async fn new_form(ctx: Context) -> ActionResult {
    let token = ctx.csrf_token().unwrap_or_default().to_owned();
    ctx.render("posts/new.html", &json!({ "csrf_token": token }))
}

async fn create(mut ctx: Context) -> ActionResult {
    let form: PostForm = ctx.bind()?;
    let post = {
        let mut posts = POSTS.write();
        let post = Post {
            id: posts.iter().map(|p| p.id).max().unwrap_or(0) + 1,
            title: form.title,
            body: form.body,
            comments: Vec::new(),
        };
        posts.push(post.clone());
        post
    };
    info!(post_id = post.id, "post created");

    if ctx.is_json() {
        return ctx.json(StatusCode::CREATED, &post);
    }
    ctx.flash("notice", format!("Created \"{}\"", post.title))?;
    ctx.redirect(&format!("/posts/{}", post.id))
}

async fn show(mut ctx: Context) -> ActionResult {
    let post = find(&ctx, "id")?;
    ctx.cache_action(std::time::Duration::from_secs(30));
    if ctx.is_json() {
        return ctx.json(StatusCode::OK, &post);
    }
    let notice = ctx.get_flash("notice");
    ctx.render("posts/show.html", &json!({ "post": post, "notice": notice }))
}

async fn destroy(ctx: Context) -> ActionResult {
    let post = find(&ctx, "id")?;
    POSTS.write().retain(|p| p.id != post.id);
    ctx.status(StatusCode::NO_CONTENT)
}

// ── Comments ──────────────────────────────────────────────────────────────────

async fn comments(ctx: Context) -> ActionResult {
    let post = find(&ctx, "post_id")?;
    ctx.json(StatusCode::OK, &post.comments)
}

async fn comment(ctx: Context) -> ActionResult {
    let post = find(&ctx, "post_id")?;
    let form: CommentForm = ctx.bind()?;
    if let Some(stored) = POSTS.write().iter_mut().find(|p| p.id == post.id) {
        stored.comments.push(form.text);
    }
    ctx.redirect_back(&format!("/posts/{}", post.id))
}

// ── Admin ─────────────────────────────────────────────────────────────────────

async fn stats(ctx: Context) -> ActionResult {
    let (posts, comments) = {
        let posts = POSTS.read();
        (posts.len(), posts.iter().map(|p| p.comments.len()).sum::<usize>())
    };
    ctx.json(StatusCode::OK, &json!({ "posts": posts, "comments": comments }))
}

async fn version(_req: Request) -> String {
    format!("blog {}", env!("CARGO_PKG_VERSION"))
}

// ── Templates ─────────────────────────────────────────────────────────────────

struct Templates(minijinja::Environment<'static>);

impl Templates {
    fn load() -> Result<Self, minijinja::Error> {
        let mut env = minijinja::Environment::new();
        env.add_template(
            "posts/index.html",
            r#"{% if notice %}<p class="notice">{{ notice }}</p>{% endif %}
<h1>Posts</h1>
<ul>{% for post in posts %}<li><a href="/posts/{{ post.id }}">{{ post.title }}</a></li>{% endfor %}</ul>
<a href="/posts/new">New post</a>"#,
        )?;
        env.add_template(
            "posts/new.html",
            r#"<form method="post" action="/posts">
<input type="hidden" name="csrf_token" value="{{ csrf_token }}">
<input name="title"><textarea name="body"></textarea><button>Create</button>
</form>"#,
        )?;
        env.add_template(
            "posts/show.html",
            r#"{% if notice %}<p class="notice">{{ notice }}</p>{% endif %}
<h1>{{ post.title }}</h1><p>{{ post.body }}</p>
<ul>{% for c in post.comments %}<li>{{ c }}</li>{% endfor %}</ul>"#,
        )?;
        Ok(Self(env))
    }
}

impl Renderer for Templates {
    fn render(&self, out: &mut dyn Write, template: &str, data: &serde_json::Value) -> Result<(), RenderError> {
        let html = self.0.get_template(template)?.render(data)?;
        out.write_all(html.as_bytes())?;
        Ok(())
    }
}

// ── Boot ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = Path::new("railyard.toml");
    let config = if path.exists() { Config::load(path)? } else { Config::default().with_env_overrides()? };
    railyard::logging::init(config.app.env)?;

    let router = Router::new()
        .get("/healthz", railyard::health::liveness)
        .get("/readyz", railyard::health::readiness)
        .nested_resource(
            "posts",
            Resource::new("PostsController")
                .index(index)
                .new_form(new_form)
                .create(create)
                .show(show)
                .destroy(destroy),
            |posts| posts.resource("comments", Resource::new("CommentsController").index(comments).create(comment)),
        )
        .namespace("/admin", |admin| admin.get("/stats", stats))
        .mount("/version", version);
    println!("{}", router.inspect());

    let app = App::builder(config.clone())
        .renderer(Templates::load()?)
        .plugin(MetricsPlugin::install()?)
        .default_middleware()
        .with(Csrf::new())
        .with(Compress::new())
        .router(router)
        .build()?;

    Server::bind(&config.app.bind_address)?.serve(app).await?;
    Ok(())
}
