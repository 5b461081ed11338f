//! Route registration.
//!
//! The [`Router`] is a boot-time builder. Every registration returns `self`,
//! so a whole application chains naturally. Nothing is matched here:
//! [`AppBuilder::build`](crate::AppBuilder::build) compiles the collected
//! bindings into a read-only table, and from then on the routes cannot change.

use std::fmt::Write as _;
use std::sync::Arc;

use http::StatusCode;

use crate::dispatch::Dispatcher;
use crate::handler::{BoxedHandler, Endpoint, Handler, label_of};
use crate::inflect::singularize;
use crate::method::Method;
use crate::request::Request;
use crate::resource::{Action, Resource};
use crate::table::Binding;

/// One row of the route listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    method: String,
    path: String,
    handler: String,
}

impl RouteEntry {
    /// Wire method, or `*` for mounts.
    pub fn method(&self) -> &str { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn handler(&self) -> &str { &self.handler }
}

/// The application router.
///
/// ```rust
/// use railyard::{ActionResult, Context, Method, Resource, Router};
/// # async fn home(ctx: Context) -> ActionResult { Ok(()) }
/// # async fn index(ctx: Context) -> ActionResult { Ok(()) }
/// # async fn show(ctx: Context) -> ActionResult { Ok(()) }
///
/// let router = Router::new()
///     .get("/", home)
///     .resource("posts", Resource::new("Posts").index(index).show(show))
///     .namespace("/admin", |admin| admin.on(Method::Get, "/stats", home));
///
/// println!("{}", router.inspect());
/// ```
#[derive(Default)]
pub struct Router {
    prefix: String,
    entries: Vec<RouteEntry>,
    bindings: Vec<Binding>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    fn scoped(prefix: String) -> Self {
        Self { prefix, ..Self::default() }
    }

    /// Registers an action for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and are read with
    /// [`Context::param`](crate::Context::param). A trailing `{*name}`
    /// captures the rest of the path.
    pub fn on<H: Handler>(self, method: Method, path: &str, handler: H) -> Self {
        let label = label_of::<H>();
        self.add(method, path, handler.into_boxed_handler(), label)
    }

    /// Like [`on`](Router::on), with the label [`inspect`](Router::inspect)
    /// shows given explicitly. Closures have no useful type name.
    pub fn on_named(self, method: Method, path: &str, label: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler.into_boxed_handler(), label.to_owned())
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    /// Registers the conventional routes for every action `resource` has,
    /// under `/{name}`.
    ///
    /// `GET /{name}/new` belongs to the `New` action even when it is absent:
    /// it answers 404 rather than reaching `Show` with an id of `"new"`.
    pub fn resource(mut self, name: &str, resource: Resource) -> Self {
        let base = format!("/{name}");
        for (action, handler) in resource.actions() {
            let label = format!("{}#{action}", resource.label());
            for (method, suffix) in action.routes() {
                self = self.add(*method, &format!("{base}{suffix}"), Arc::clone(handler), label.clone());
            }
        }
        if resource.has(Action::Show) && !resource.has(Action::New) {
            let path = self.full_path(&format!("{base}/new"));
            self.bindings.push(Binding {
                method: Some(Method::Get),
                path,
                endpoint: Arc::new(|_req: Request| async { StatusCode::NOT_FOUND }),
                fallback: true,
            });
        }
        self
    }

    /// Like [`resource`](Router::resource), then hands `nested` a router
    /// scoped to `/{name}/{<singular>_id}`.
    ///
    /// ```rust
    /// # use railyard::{ActionResult, Context, Resource, Router};
    /// # async fn h(ctx: Context) -> ActionResult { Ok(()) }
    /// let router = Router::new().nested_resource(
    ///     "posts",
    ///     Resource::new("Posts").show(h),
    ///     |posts| posts.resource("comments", Resource::new("Comments").index(h)),
    /// );
    /// assert_eq!(router.routes()[1].path(), "/posts/{post_id}/comments");
    /// ```
    pub fn nested_resource(
        self,
        name: &str,
        resource: Resource,
        nested: impl FnOnce(Router) -> Router,
    ) -> Self {
        let scope = format!("/{name}/{{{}_id}}", singularize(name));
        self.resource(name, resource).scope(&scope, nested)
    }

    /// Registers everything `routes` adds under a literal path prefix.
    pub fn namespace(self, prefix: &str, routes: impl FnOnce(Router) -> Router) -> Self {
        self.scope(prefix, routes)
    }

    /// Delegates every request on `path` or below it, any method, to
    /// `endpoint`. The endpoint sees the path with the prefix removed.
    pub fn mount(mut self, path: &str, endpoint: impl Endpoint) -> Self {
        let full = self.full_path(path);
        self.entries.push(RouteEntry {
            method: "*".to_owned(),
            path: format!("{}/*", full.trim_end_matches('/')),
            handler: "Mounted Handler".to_owned(),
        });
        self.bindings.push(Binding { method: None, path: full, endpoint: Arc::new(endpoint), fallback: false });
        self
    }

    /// Appends every route of `other`, keeping its paths as they are.
    pub fn merge(mut self, other: Router) -> Self {
        self.entries.extend(other.entries);
        self.bindings.extend(other.bindings);
        self
    }

    /// Every registered route, in registration order.
    pub fn routes(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Fixed-width route listing:
    ///
    /// ```text
    /// ┌────────────┬────────────────────────────────┬────────────────────────────────┐
    /// │ Method     │ Path                           │ Handler                        │
    /// ├────────────┼────────────────────────────────┼────────────────────────────────┤
    /// │ GET        │ /posts                         │ Posts#Index                    │
    /// └────────────┴────────────────────────────────┴────────────────────────────────┘
    /// Total: 1 routes
    /// ```
    pub fn inspect(&self) -> String {
        let rule = |left: char, mid: char, right: char| {
            format!("{left}{}{mid}{}{mid}{}{right}\n", "─".repeat(12), "─".repeat(32), "─".repeat(32))
        };

        let mut out = rule('┌', '┬', '┐');
        out.push_str(&format!("│ {:<10} │ {:<30} │ {:<30} │\n", "Method", "Path", "Handler"));
        out.push_str(&rule('├', '┼', '┤'));
        for entry in &self.entries {
            let _ = writeln!(out, "│ {:<10} │ {:<30} │ {:<30} │", entry.method, entry.path, entry.handler);
        }
        out.push_str(&rule('└', '┴', '┘'));
        let _ = writeln!(out, "Total: {} routes", self.entries.len());
        out
    }

    pub(crate) fn into_bindings(self) -> Vec<Binding> {
        self.bindings
    }

    fn scope(self, prefix: &str, routes: impl FnOnce(Router) -> Router) -> Self {
        let child = routes(Router::scoped(format!("{}{prefix}", self.prefix)));
        self.merge(child)
    }

    fn full_path(&self, path: &str) -> String {
        match (self.prefix.is_empty(), path) {
            (false, "" | "/") => self.prefix.clone(),
            _ => format!("{}{path}", self.prefix),
        }
    }

    fn add(mut self, method: Method, path: &str, handler: BoxedHandler, label: String) -> Self {
        let path = self.full_path(path);
        self.entries.push(RouteEntry {
            method: method.as_str().to_owned(),
            path: path.clone(),
            handler: label.clone(),
        });
        self.bindings.push(Binding {
            method: Some(method),
            path,
            endpoint: Arc::new(Dispatcher::new(handler, label)),
            fallback: false,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::http_error::ActionResult;

    async fn noop(_ctx: Context) -> ActionResult {
        Ok(())
    }

    fn listing(router: &Router) -> Vec<(&str, &str, &str)> {
        router.routes().iter().map(|r| (r.method(), r.path(), r.handler())).collect()
    }

    #[test]
    fn full_resource_expands_in_order() {
        let posts = Resource::new("Posts")
            .destroy(noop)
            .update(noop)
            .edit(noop)
            .show(noop)
            .new_form(noop)
            .create(noop)
            .index(noop);
        let router = Router::new().resource("posts", posts);

        assert_eq!(
            listing(&router),
            [
                ("GET", "/posts", "Posts#Index"),
                ("POST", "/posts", "Posts#Create"),
                ("GET", "/posts/new", "Posts#New"),
                ("GET", "/posts/{id}", "Posts#Show"),
                ("GET", "/posts/{id}/edit", "Posts#Edit"),
                ("PUT", "/posts/{id}", "Posts#Update"),
                ("PATCH", "/posts/{id}", "Posts#Update"),
                ("DELETE", "/posts/{id}", "Posts#Destroy"),
            ]
        );
    }

    #[test]
    fn nesting_and_namespaces_concatenate_prefixes() {
        let router = Router::new().namespace("/admin", |admin| {
            admin.get("/", noop).nested_resource(
                "categories",
                Resource::new("Categories").show(noop),
                |categories| categories.resource("items", Resource::new("Items").index(noop)),
            )
        });

        assert_eq!(
            listing(&router),
            [
                ("GET", "/admin", "tests::noop"),
                ("GET", "/admin/categories/{id}", "Categories#Show"),
                ("GET", "/admin/categories/{category_id}/items", "Items#Index"),
            ]
        );
    }

    #[test]
    fn mounts_are_listed_with_a_wildcard() {
        let router = Router::new().mount("/jobs", |_req: crate::Request| async { "jobs" });
        assert_eq!(listing(&router), [("*", "/jobs/*", "Mounted Handler")]);
    }

    #[test]
    fn inspect_renders_a_fixed_width_table() {
        let router = Router::new().get("/health", noop).post("/posts", noop);
        let table = router.inspect();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with('┌') && lines[0].ends_with('┐'));
        assert_eq!(lines[1], format!("│ {:<10} │ {:<30} │ {:<30} │", "Method", "Path", "Handler"));
        assert_eq!(lines[3], format!("│ {:<10} │ {:<30} │ {:<30} │", "GET", "/health", "tests::noop"));
        assert!(lines[4].contains("/posts"));
        assert_eq!(lines[6], "Total: 2 routes");
        assert!(lines.iter().take(6).all(|l| l.chars().count() == lines[0].chars().count()));
    }
}
