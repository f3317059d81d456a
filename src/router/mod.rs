//! The flat router: method-keyed dispatch over a [`crate::pattern::PatternRegistry`], with
//! global/method/pattern middleware and a JSON task-handler contract.

mod dispatch;
pub mod middleware;
pub mod request_data;
pub mod response_proxy;

pub use middleware::{HttpMiddleware, Predicate, TaskMiddleware};
pub use request_data::{Input, ReqData};
pub use response_proxy::ResponseProxy;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use hyper::{Body, Method, Response};

use crate::error::RouterError;
use crate::marshal::{default_marshal_input, MarshalInputFn};
use crate::pattern::{PatternRegistry, PatternRegistryConfig};
use crate::BoxFuture;

/// A plain HTTP handler: given the request envelope, produces a response directly.
pub type HttpHandlerFn = Arc<dyn Fn(Arc<ReqData>) -> BoxFuture<Response<Body>> + Send + Sync>;

/// A task handler: given the request envelope, produces a JSON-serializable value or an error.
/// The router owns turning that into a response (success → JSON body, error → 500).
pub type TaskHandlerFn =
    Arc<dyn Fn(Arc<ReqData>) -> BoxFuture<Result<serde_json::Value, RouterError>> + Send + Sync>;

pub enum RouteKind {
    Http(HttpHandlerFn),
    Task(TaskHandlerFn),
}

/// A single registered endpoint: one method, one pattern, one handler, plus whatever
/// pattern-scoped middleware was registered alongside it.
pub struct Route {
    pub method: Method,
    pub pattern: String,
    pub kind: RouteKind,
    pub http_middlewares: Vec<HttpMiddleware>,
    pub task_middlewares: Vec<TaskMiddleware>,
    /// Whether this route's handler needs a decoded input at all (the "no input" sentinel
    /// skips `marshal_input` entirely when false).
    pub needs_input: bool,
}

struct MethodMatcher {
    registry: PatternRegistry,
    routes: HashMap<String, Arc<Route>>,
    http_middlewares: Vec<HttpMiddleware>,
    task_middlewares: Vec<TaskMiddleware>,
}

impl MethodMatcher {
    fn new(config: PatternRegistryConfig) -> Self {
        MethodMatcher {
            registry: PatternRegistry::new(config),
            routes: HashMap::new(),
            http_middlewares: Vec::new(),
            task_middlewares: Vec::new(),
        }
    }
}

/// Configuration accepted by [`Router::new`].
pub struct RouterConfig {
    /// Stripped from the front of every request path before matching. Normalized to `""` for
    /// `/` or to a `/x/` form (leading and trailing slash) otherwise.
    pub mount_root: String,
    pub registry_config: PatternRegistryConfig,
    /// When true, every route (not just ones whose handler asks for it) gets a `Ctx` attached
    /// even on the fast path, trading a small per-request allocation for uniformity.
    pub inject_tasks_ctx: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            mount_root: String::new(),
            registry_config: PatternRegistryConfig::default(),
            inject_tasks_ctx: false,
        }
    }
}

pub(crate) fn normalize_mount_root(raw: &str) -> String {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}/", trimmed)
    }
}

/// Method-keyed HTTP dispatcher: the JSON-task-handler, middleware-layered multiplexer at the
/// center of the crate.
pub struct Router {
    config: RouterConfig,
    marshal_input: MarshalInputFn,
    method_matchers: RwLock<HashMap<Method, MethodMatcher>>,
    global_http_middlewares: RwLock<Vec<HttpMiddleware>>,
    global_task_middlewares: RwLock<Vec<TaskMiddleware>>,
    not_found_handler: RwLock<Option<HttpHandlerFn>>,
}

impl Router {
    pub fn new(mut config: RouterConfig) -> Self {
        config.mount_root = normalize_mount_root(&config.mount_root);
        Router {
            config,
            marshal_input: Arc::new(default_marshal_input),
            method_matchers: RwLock::new(HashMap::new()),
            global_http_middlewares: RwLock::new(Vec::new()),
            global_task_middlewares: RwLock::new(Vec::new()),
            not_found_handler: RwLock::new(None),
        }
    }

    pub fn with_marshal_input(mut self, marshal_input: MarshalInputFn) -> Self {
        self.marshal_input = marshal_input;
        self
    }

    pub fn set_not_found_handler(&self, handler: HttpHandlerFn) {
        *self.not_found_handler.write().unwrap() = Some(handler);
    }

    pub fn use_global_http_middleware(&self, mw: HttpMiddleware) {
        self.global_http_middlewares.write().unwrap().push(mw);
    }

    pub fn use_global_task_middleware(&self, mw: TaskMiddleware) {
        self.global_task_middlewares.write().unwrap().push(mw);
    }

    pub fn use_method_http_middleware(&self, method: Method, mw: HttpMiddleware) {
        let mut matchers = self.method_matchers.write().unwrap();
        matchers
            .entry(method)
            .or_insert_with(|| MethodMatcher::new(self.config.registry_config.clone()))
            .http_middlewares
            .push(mw);
    }

    pub fn use_method_task_middleware(&self, method: Method, mw: TaskMiddleware) {
        let mut matchers = self.method_matchers.write().unwrap();
        matchers
            .entry(method)
            .or_insert_with(|| MethodMatcher::new(self.config.registry_config.clone()))
            .task_middlewares
            .push(mw);
    }

    /// Registers a plain HTTP handler. Panics if `pattern` is structurally invalid (e.g. a
    /// trailing slash in explicit-index mode) — duplicate registration is a logged warning,
    /// not a panic.
    pub fn register_handler(
        &self,
        method: Method,
        pattern: &str,
        handler: HttpHandlerFn,
        http_middlewares: Vec<HttpMiddleware>,
        task_middlewares: Vec<TaskMiddleware>,
    ) {
        self.register(method, pattern, RouteKind::Http(handler), http_middlewares, task_middlewares, false);
    }

    /// Registers a task handler whose return value is serialized as the JSON response body.
    pub fn register_task_handler(
        &self,
        method: Method,
        pattern: &str,
        handler: TaskHandlerFn,
        http_middlewares: Vec<HttpMiddleware>,
        task_middlewares: Vec<TaskMiddleware>,
        needs_input: bool,
    ) {
        self.register(method, pattern, RouteKind::Task(handler), http_middlewares, task_middlewares, needs_input);
    }

    fn register(
        &self,
        method: Method,
        pattern: &str,
        kind: RouteKind,
        http_middlewares: Vec<HttpMiddleware>,
        task_middlewares: Vec<TaskMiddleware>,
        needs_input: bool,
    ) {
        let mut matchers = self.method_matchers.write().unwrap();
        let matcher = matchers
            .entry(method.clone())
            .or_insert_with(|| MethodMatcher::new(self.config.registry_config.clone()));

        let registered = matcher
            .registry
            .register(pattern)
            .unwrap_or_else(|e| panic!("invalid route pattern {:?}: {}", pattern, e));

        let route = Route {
            method,
            pattern: pattern.to_string(),
            kind,
            http_middlewares,
            task_middlewares,
            needs_input,
        };
        matcher.routes.insert(registered.normalized_pattern, Arc::new(route));
    }
}
