//! Application assembly.
//!
//! An [`App`] is the frozen result of boot: the compiled route table, the
//! middleware chain, and the collaborators every [`Context`](crate::Context)
//! gets (environment, renderer, session store). It is built once and shared
//! by every connection behind an `Arc`.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{Config, Environment};
use crate::error::Error;
use crate::middleware::{Cors, Logger, Middleware, Next, RateLimit, Recovery, RequestId, SecureHeaders};
use crate::plugin::Plugin;
use crate::render::Renderer;
use crate::request::Request;
use crate::response::Response;
use crate::router::{RouteEntry, Router};
use crate::session::{MemorySessionStore, SessionStore};
use crate::table::RouteTable;

/// Collaborators threaded through to every action.
#[derive(Clone, Default)]
pub(crate) struct Services {
    pub(crate) env: Environment,
    pub(crate) renderer: Option<Arc<dyn Renderer>>,
    pub(crate) sessions: Option<Arc<dyn SessionStore>>,
}

/// A ready-to-serve application.
///
/// ```rust,no_run
/// use railyard::{App, Config, Router, Server};
/// # async fn home(ctx: railyard::Context) -> railyard::ActionResult { Ok(()) }
///
/// # async fn run() -> Result<(), railyard::Error> {
/// let config = Config::load("config/app.toml")?;
/// let app = App::builder(config.clone())
///     .default_middleware()
///     .router(Router::new().get("/", home))
///     .build()?;
///
/// Server::bind(&config.app.bind_address)?.serve(app).await
/// # }
/// ```
pub struct App {
    config: Config,
    services: Arc<Services>,
    chain: Vec<Arc<dyn Middleware>>,
    table: RouteTable,
    routes: Vec<RouteEntry>,
}

impl App {
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder {
            services: Services { env: config.app.env, ..Services::default() },
            config,
            chain: Vec::new(),
            router: Router::new(),
            plugins: Vec::new(),
        }
    }

    /// Runs one request through the middleware chain and the router.
    ///
    /// This is everything the server does per request minus the socket,
    /// which makes it the entry point for tests.
    pub async fn handle(&self, mut req: Request) -> Response {
        req.extensions_mut().insert(Arc::clone(&self.services));
        Next::new(&self.chain, &self.table).run(req).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn env(&self) -> Environment {
        self.services.env
    }

    /// Registered routes, in registration order.
    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }
}

/// Boot-time configuration of an [`App`].
pub struct AppBuilder {
    config: Config,
    services: Services,
    chain: Vec<Arc<dyn Middleware>>,
    router: Router,
    plugins: Vec<Box<dyn Plugin>>,
}

impl AppBuilder {
    /// Overrides the environment taken from the config.
    pub fn env(mut self, env: Environment) -> Self {
        self.config.app.env = env;
        self.services.env = env;
        self
    }

    pub fn renderer(mut self, renderer: impl Renderer) -> Self {
        self.services.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn session_store(mut self, store: impl SessionStore) -> Self {
        self.services.sessions = Some(Arc::new(store));
        self
    }

    /// Appends a middleware. The first one added runs outermost.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.chain.push(Arc::new(middleware));
        self
    }

    /// Registers a plugin, booted by [`build`](AppBuilder::build).
    pub fn plugin(mut self, plugin: impl Plugin) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// The standard stack, outermost first: request id, access log, panic
    /// recovery, security headers, then CORS and rate limiting when the
    /// config enables them. Also installs an in-memory session store if none
    /// is set.
    pub fn default_middleware(mut self) -> Self {
        self = self
            .with(RequestId::new())
            .with(Logger::new())
            .with(Recovery::new())
            .with(SecureHeaders::new());
        if self.config.cors.enabled {
            let cors = Cors::new(self.config.cors.clone());
            self = self.with(cors);
        }
        if self.config.rate_limit.enabled {
            let limit = RateLimit::from_config(&self.config.rate_limit);
            self = self.with(limit);
        }
        if self.services.sessions.is_none() {
            let sessions = &self.config.sessions;
            let store = MemorySessionStore::new(sessions.cookie_name.clone(), sessions.ttl());
            self = self.session_store(store);
        }
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Boots the plugins, then compiles the routes. Fails on a pattern the
    /// matcher rejects.
    pub fn build(mut self) -> Result<App, Error> {
        let mut router = Router::new();
        for mut plugin in std::mem::take(&mut self.plugins) {
            info!(plugin = plugin.name(), version = plugin.version(), "booting plugin");
            if let Err(e) = plugin.boot(&self.config) {
                error!(plugin = plugin.name(), error = %e, "plugin failed to boot; skipped");
                continue;
            }
            router = plugin.routes(router);
            self.chain.extend(plugin.middleware());
        }
        let router = router.merge(self.router);

        let routes = router.routes().to_vec();
        let table = RouteTable::compile(router.into_bindings())?;
        Ok(App {
            config: self.config,
            services: Arc::new(self.services),
            chain: self.chain,
            table,
            routes,
        })
    }
}
