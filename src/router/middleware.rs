//! HTTP and task middleware: the two kinds registerable at global, method, and pattern scope.

use std::sync::Arc;

use hyper::{Body, Response};

use crate::error::RouterError;
use crate::router::request_data::ReqData;
use crate::router::response_proxy::ResponseProxy;
use crate::BoxFuture;

/// Gates a middleware to only the requests it applies to. A missing predicate always applies.
pub type Predicate = Arc<dyn Fn(&ReqData) -> bool + Send + Sync>;

/// The continuation an [`HttpMiddleware`] calls to run the rest of the chain.
pub type Next = Arc<dyn Fn(Arc<ReqData>) -> BoxFuture<Response<Body>> + Send + Sync>;

/// A traditional wrap-style middleware: it receives the request data and a `next` continuation,
/// and decides whether/when/how to call it. HTTP middlewares run strictly sequentially,
/// outermost first, exactly like nested function calls.
#[derive(Clone)]
pub struct HttpMiddleware {
    pub predicate: Option<Predicate>,
    pub wrap: Arc<dyn Fn(Arc<ReqData>, Next) -> BoxFuture<Response<Body>> + Send + Sync>,
}

impl HttpMiddleware {
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(Arc<ReqData>, Next) -> BoxFuture<Response<Body>> + Send + Sync + 'static,
    {
        HttpMiddleware {
            predicate: None,
            wrap: Arc::new(wrap),
        }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ReqData) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    fn applies(&self, req_data: &ReqData) -> bool {
        self.predicate.as_ref().map(|p| p(req_data)).unwrap_or(true)
    }
}

/// A task-style middleware: it runs concurrently with its siblings through the task engine and
/// reports its verdict as a standalone [`ResponseProxy`], merged with the others afterward.
#[derive(Clone)]
pub struct TaskMiddleware {
    pub predicate: Option<Predicate>,
    pub run: Arc<dyn Fn(Arc<ReqData>) -> BoxFuture<Result<ResponseProxy, RouterError>> + Send + Sync>,
}

impl TaskMiddleware {
    pub fn new<F>(run: F) -> Self
    where
        F: Fn(Arc<ReqData>) -> BoxFuture<Result<ResponseProxy, RouterError>> + Send + Sync + 'static,
    {
        TaskMiddleware {
            predicate: None,
            run: Arc::new(run),
        }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ReqData) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    fn applies(&self, req_data: &ReqData) -> bool {
        self.predicate.as_ref().map(|p| p(req_data)).unwrap_or(true)
    }
}

/// Wraps `handler` in `middlewares`, outermost first, applying each one's predicate at call
/// time. A `Vec`-backed chain has no type-level reason to cache the compiled closure across
/// requests, so it's rebuilt (cheaply) on every dispatch.
pub fn compile_http_chain(
    middlewares: &[HttpMiddleware],
    handler: Arc<dyn Fn(Arc<ReqData>) -> BoxFuture<Response<Body>> + Send + Sync>,
) -> Next {
    middlewares.iter().rev().fold(handler, |next, mw| {
        let mw = mw.clone();
        let next = next.clone();
        Arc::new(move |req_data: Arc<ReqData>| {
            if !mw.applies(&req_data) {
                return next(req_data);
            }
            (mw.wrap)(req_data, next.clone())
        })
    })
}

/// Runs every applicable task middleware concurrently, cancelling siblings on the first
/// `RouterError`, and merges their proxies. Middlewares whose predicate doesn't apply are
/// skipped without contributing a proxy.
pub async fn run_task_middlewares(
    middlewares: &[TaskMiddleware],
    req_data: Arc<ReqData>,
) -> Result<ResponseProxy, RouterError> {
    let applicable: Vec<_> = middlewares.iter().filter(|mw| mw.applies(&req_data)).collect();
    if applicable.is_empty() {
        return Ok(ResponseProxy::new());
    }

    let ctx = req_data.tasks_ctx.clone();
    let futures: Vec<BoxFuture<Result<ResponseProxy, crate::task::TaskError>>> = applicable
        .iter()
        .map(|mw| {
            let run = mw.run.clone();
            let req_data = req_data.clone();
            Box::pin(async move {
                run(req_data)
                    .await
                    .map_err(|e| crate::task::TaskError::Failed(std::sync::Arc::new(e)))
            }) as BoxFuture<Result<ResponseProxy, crate::task::TaskError>>
        })
        .collect();

    let proxies = ctx.run_parallel(futures).await.map_err(RouterError::from)?;
    Ok(ResponseProxy::merge(proxies))
}
