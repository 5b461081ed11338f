//! Compiled, read-only route table.
//!
//! One radix tree per HTTP method, plus one tree for mounted endpoints that
//! answers any method. O(path-length) lookup via [`matchit`].
//!
//! matchit refuses two parameters with different names at the same position
//! (`/posts/{id}` next to `/posts/{post_id}/comments`), which resource nesting
//! produces all the time. Patterns are therefore inserted with positional
//! placeholders (`/posts/{p0}`, `/posts/{p0}/comments`) and each slot keeps the
//! real names to restore on match.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use http::StatusCode;
use matchit::Router as MatchitRouter;
use tracing::{trace, warn};

use crate::error::Error;
use crate::handler::Endpoint;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

/// A compiled route, as handed over by [`Router`](crate::Router).
pub(crate) struct Binding {
    /// `None` for mounts.
    pub(crate) method: Option<Method>,
    pub(crate) path: String,
    pub(crate) endpoint: Arc<dyn Endpoint>,
    /// Yields silently to any other binding for the same method and path.
    pub(crate) fallback: bool,
}

struct Slot {
    endpoint: Arc<dyn Endpoint>,
    params: Vec<String>,
    mount: bool,
    fallback: bool,
    /// The registered pattern, real parameter names intact.
    route: Arc<str>,
}

/// Receives the pattern of the route a request matched.
///
/// A layer that runs outside the router inserts one into the request before
/// passing it on and reads it once the response comes back. It stays empty
/// when nothing matched.
#[derive(Clone, Debug, Default)]
pub struct MatchedRoute(Arc<OnceLock<Arc<str>>>);

impl MatchedRoute {
    pub fn new() -> Self {
        Self::default()
    }

    /// `/posts/{post_id}/comments/{id}`, or `/jobs/*` for a mount.
    pub fn get(&self) -> Option<&str> {
        self.0.get().map(|route| &**route)
    }
}

pub(crate) struct RouteTable {
    trees: HashMap<Method, MatchitRouter<usize>>,
    mounts: MatchitRouter<usize>,
    slots: Vec<Slot>,
}

impl RouteTable {
    pub(crate) fn compile(bindings: Vec<Binding>) -> Result<Self, Error> {
        let mut table = Self { trees: HashMap::new(), mounts: MatchitRouter::new(), slots: Vec::new() };
        let mut seen: HashMap<(Option<Method>, String), usize> = HashMap::new();

        for binding in bindings {
            let (pattern, params) = normalize(&binding.path);
            let mount = binding.method.is_none();
            let route: Arc<str> = if mount {
                format!("{}/*", binding.path.trim_end_matches('/')).into()
            } else {
                binding.path.as_str().into()
            };
            let slot = Slot { endpoint: binding.endpoint, params, mount, fallback: binding.fallback, route };

            if let Some(&index) = seen.get(&(binding.method, pattern.clone())) {
                if slot.fallback {
                    continue;
                }
                if !table.slots[index].fallback {
                    warn!(
                        method = binding.method.map_or("*", Method::as_str),
                        path = %binding.path,
                        "route registered twice; the later registration wins"
                    );
                }
                table.slots[index] = slot;
                continue;
            }

            let index = table.slots.len();
            let insert = |tree: &mut MatchitRouter<usize>, route: String| {
                tree.insert(route, index)
                    .map_err(|source| Error::Route { path: binding.path.clone(), source })
            };
            match binding.method {
                Some(method) => insert(table.trees.entry(method).or_insert_with(MatchitRouter::new), pattern.clone())?,
                None => {
                    let base = pattern.trim_end_matches('/');
                    let rest = format!("{base}/{{*p{}}}", slot.params.len());
                    if base.is_empty() {
                        insert(&mut table.mounts, "/".to_owned())?;
                    } else {
                        insert(&mut table.mounts, base.to_owned())?;
                        insert(&mut table.mounts, format!("{base}/"))?;
                    }
                    insert(&mut table.mounts, rest)?;
                }
            }
            seen.insert((binding.method, pattern), index);
            table.slots.push(slot);
        }
        Ok(table)
    }

    /// Routes one request. Unmatched requests get `404 Not Found`.
    pub(crate) async fn handle(&self, mut req: Request) -> Response {
        let path = req.path().to_owned();
        let Some((slot, matched)) = self.find(req.method(), &path) else {
            trace!(method = %req.method(), path = %path, "no route");
            return Response::builder().status(StatusCode::NOT_FOUND).text("Not Found");
        };

        if let Some(route) = req.extensions().get::<MatchedRoute>() {
            let _ = route.0.set(Arc::clone(&slot.route));
        }

        let mut params = HashMap::with_capacity(matched.len());
        let mut rest = None;
        for (key, value) in matched {
            match key.parse::<usize>().ok().and_then(|i| slot.params.get(i)) {
                Some(name) => {
                    params.insert(name.clone(), value);
                }
                None if slot.mount => rest = Some(value),
                None => {}
            }
        }
        if slot.mount {
            req.set_path(&format!("/{}", rest.unwrap_or_default()));
        }
        req.set_params(params);

        let endpoint = Arc::clone(&slot.endpoint);
        endpoint.call(req).await
    }

    /// Method tree first (`HEAD` falls back to `GET`), then mounts.
    fn find(&self, method: &http::Method, path: &str) -> Option<(&Slot, Vec<(String, String)>)> {
        let method = Method::from_http(method);
        let mut candidates = Vec::with_capacity(3);
        if let Some(m) = method {
            candidates.extend(self.trees.get(&m));
        }
        if method == Some(Method::Head) {
            candidates.extend(self.trees.get(&Method::Get));
        }
        candidates.push(&self.mounts);

        candidates.into_iter().find_map(|tree| {
            let matched = tree.at(path).ok()?;
            let params = matched
                .params
                .iter()
                .map(|(k, v)| (k.trim_start_matches('p').to_owned(), v.to_owned()))
                .collect();
            Some((&self.slots[*matched.value], params))
        })
    }
}

/// `/posts/{post_id}/comments/{*rest}` → (`/posts/{p0}/comments/{*p1}`,
/// `["post_id", "rest"]`).
fn normalize(path: &str) -> (String, Vec<String>) {
    let mut pattern = String::with_capacity(path.len());
    let mut names = Vec::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                pattern.push_str("{{");
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                pattern.push_str("}}");
            }
            '{' => {
                let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                let (star, name) = match name.strip_prefix('*') {
                    Some(name) => ("*", name),
                    None => ("", name.as_str()),
                };
                pattern.push_str(&format!("{{{star}p{}}}", names.len()));
                names.push(name.to_owned());
            }
            c => pattern.push(c),
        }
    }
    (pattern, names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn endpoint(body: &'static str) -> Arc<dyn Endpoint> {
        Arc::new(move |req: Request| async move {
            let params: Vec<String> = ["id", "post_id", "rest"]
                .iter()
                .filter_map(|k| req.param(k).map(|v| format!("{k}={v}")))
                .collect();
            format!("{body} {} {}", req.path(), params.join(","))
        })
    }

    fn bind(method: Option<Method>, path: &str, body: &'static str) -> Binding {
        Binding { method, path: path.to_owned(), endpoint: endpoint(body), fallback: false }
    }

    async fn hit(table: &RouteTable, method: http::Method, uri: &str) -> (StatusCode, String) {
        let req = http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap();
        let res = table.handle(req.into()).await;
        (res.status_code(), String::from_utf8_lossy(res.body()).into_owned())
    }

    #[test]
    fn normalizes_parameter_names() {
        assert_eq!(
            normalize("/posts/{post_id}/files/{*rest}"),
            ("/posts/{p0}/files/{*p1}".to_owned(), vec!["post_id".to_owned(), "rest".to_owned()])
        );
        assert_eq!(normalize("/{{literal}}").0, "/{{literal}}");
    }

    #[tokio::test]
    async fn sibling_parameters_with_different_names() {
        let table = RouteTable::compile(vec![
            bind(Some(Method::Get), "/posts/{id}", "show"),
            bind(Some(Method::Get), "/posts/{post_id}/comments", "comments"),
        ])
        .unwrap();

        assert_eq!(hit(&table, http::Method::GET, "/posts/7").await.1, "show /posts/7 id=7");
        assert_eq!(
            hit(&table, http::Method::GET, "/posts/7/comments").await.1,
            "comments /posts/7/comments post_id=7"
        );
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let table = RouteTable::compile(vec![
            bind(Some(Method::Get), "/a/{x}", "first"),
            bind(Some(Method::Get), "/a/{y}", "second"),
        ])
        .unwrap();
        assert!(hit(&table, http::Method::GET, "/a/1").await.1.starts_with("second"));
    }

    #[tokio::test]
    async fn fallbacks_yield_to_real_routes() {
        let reserved = Binding { fallback: true, ..bind(Some(Method::Get), "/w/new", "reserved") };
        let table = RouteTable::compile(vec![
            bind(Some(Method::Get), "/w/new", "explicit"),
            reserved,
            bind(Some(Method::Get), "/v/{id}", "show"),
            Binding { fallback: true, ..bind(Some(Method::Get), "/v/new", "reserved") },
        ])
        .unwrap();
        assert!(hit(&table, http::Method::GET, "/w/new").await.1.starts_with("explicit"));
        assert!(hit(&table, http::Method::GET, "/v/new").await.1.starts_with("reserved"));
        assert!(hit(&table, http::Method::GET, "/v/3").await.1.starts_with("show"));
    }

    #[tokio::test]
    async fn mounts_strip_their_prefix_and_accept_any_method() {
        let table = RouteTable::compile(vec![bind(None, "/admin", "admin")]).unwrap();
        assert_eq!(hit(&table, http::Method::DELETE, "/admin/jobs/3").await.1, "admin /jobs/3 ");
        assert_eq!(hit(&table, http::Method::GET, "/admin").await.1, "admin / ");
        assert_eq!(hit(&table, http::Method::GET, "/admin/").await.1, "admin / ");
        assert_eq!(hit(&table, http::Method::GET, "/administrator").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn the_matched_pattern_is_reported() {
        let table = RouteTable::compile(vec![
            bind(Some(Method::Get), "/posts/{post_id}/comments/{id}", "comment"),
            bind(None, "/jobs/", "jobs"),
        ])
        .unwrap();

        for (uri, expected) in [("/posts/1/comments/2", Some("/posts/{post_id}/comments/{id}")), ("/jobs/a/b", Some("/jobs/*")), ("/nope", None)] {
            let route = MatchedRoute::new();
            let mut req: Request = http::Request::builder().uri(uri).body(Bytes::new()).unwrap().into();
            req.extensions_mut().insert(route.clone());
            table.handle(req).await;
            assert_eq!(route.get(), expected, "{uri}");
        }
    }

    #[tokio::test]
    async fn head_falls_back_to_get() {
        let table = RouteTable::compile(vec![bind(Some(Method::Get), "/", "root")]).unwrap();
        assert_eq!(hit(&table, http::Method::HEAD, "/").await.0, StatusCode::OK);
        assert_eq!(hit(&table, http::Method::POST, "/").await.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_patterns_are_reported() {
        let err = RouteTable::compile(vec![bind(Some(Method::Get), "/files/{*rest}/tail", "bad")])
            .err()
            .unwrap();
        assert!(matches!(err, Error::Route { ref path, .. } if path == "/files/{*rest}/tail"));
    }
}
