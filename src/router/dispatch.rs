//! `Router::serve`: panic recovery, mount-root stripping, HEAD-from-GET fallback, the
//! fast/slow dispatch split, and the task-to-JSON adapter.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use hyper::{Body, Method, Response, StatusCode};
use log::{error, trace, warn};
use uuid::Uuid;

use crate::marshal::MarshalError;
use crate::pattern::Match;
use crate::router::middleware::{compile_http_chain, run_task_middlewares};
use crate::router::{Input, ReqData, Route, RouteKind, Router, ResponseProxy};
use crate::task::Ctx;

fn request_id(parts: &hyper::http::request::Parts) -> String {
    parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn plain_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(body.into())
        .expect("status and body are always valid")
}

pub(crate) fn strip_mount_root(path: &str, mount_root: &str) -> Option<String> {
    if mount_root.is_empty() {
        return Some(path.to_string());
    }
    let prefix = mount_root.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

impl Router {
    /// Serves one request end to end, recovering from any panic in the chain below as a 500.
    pub async fn serve(&self, req: hyper::Request<Body>) -> Response<Body> {
        match AssertUnwindSafe(self.serve_inner(req)).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                error!("[PANIC] a panic occurred while serving a request");
                plain_response(StatusCode::INTERNAL_SERVER_ERROR, Body::empty())
            }
        }
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(Arc<Route>, Match, Vec<crate::router::HttpMiddleware>, Vec<crate::router::TaskMiddleware>)> {
        let matchers = self.method_matchers.read().unwrap();
        let matcher = matchers.get(method)?;
        let m = matcher.registry.find_best_match(path)?;
        let route = matcher.routes.get(&m.pattern.normalized_pattern)?.clone();
        Some((route, m, matcher.http_middlewares.clone(), matcher.task_middlewares.clone()))
    }

    async fn not_found(&self, rid: &str, parts: hyper::http::request::Parts) -> Response<Body> {
        trace!("[{}] no route matched", rid);
        let handler = self.not_found_handler.read().unwrap().clone();
        match handler {
            Some(handler) => {
                let req_data = Arc::new(ReqData {
                    params: Default::default(),
                    splat_values: Vec::new(),
                    tasks_ctx: Ctx::new(None),
                    input: Input::None,
                    request_parts: parts,
                    response_proxy: Mutex::new(ResponseProxy::new()),
                });
                let mut response = handler(req_data).await;
                if response.status() == StatusCode::OK {
                    *response.status_mut() = StatusCode::NOT_FOUND;
                }
                response
            }
            None => plain_response(StatusCode::NOT_FOUND, "not found"),
        }
    }

    async fn serve_inner(&self, req: hyper::Request<Body>) -> Response<Body> {
        let (parts, body) = req.into_parts();
        let rid = request_id(&parts);
        let log_method = parts.method.clone();
        let log_path = parts.uri.path().to_string();
        trace!("[{}] {} {}", rid, log_method, log_path);

        let path = match strip_mount_root(parts.uri.path(), &self.config.mount_root) {
            Some(p) => p,
            None => return self.not_found(&rid, parts).await,
        };

        let mut used_head_fallback = false;
        let found = self.lookup(&parts.method, &path).or_else(|| {
            if parts.method == Method::HEAD {
                used_head_fallback = true;
                self.lookup(&Method::GET, &path)
            } else {
                None
            }
        });

        let (route, m, method_http_mw, method_task_mw) = match found {
            Some(v) => v,
            None => return self.not_found(&rid, parts).await,
        };

        let body_bytes = hyper::body::to_bytes(body).await.unwrap_or_default();

        let input = if route.needs_input {
            match (self.marshal_input)(&parts, &body_bytes) {
                Ok(v) => Input::Value(v),
                Err(MarshalError::Validation(msg)) => {
                    return plain_response(StatusCode::BAD_REQUEST, msg);
                }
                Err(MarshalError::Other(e)) => {
                    error!("[{}] marshal_input failed: {:#}", rid, e);
                    return plain_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
                }
            }
        } else {
            Input::None
        };

        let ctx = Ctx::new(None);
        let req_data = Arc::new(ReqData {
            params: m.params,
            splat_values: m.splat_values,
            tasks_ctx: ctx,
            input,
            request_parts: parts,
            response_proxy: Mutex::new(ResponseProxy::new()),
        });

        let all_task_mw: Vec<_> = self
            .global_task_middlewares
            .read()
            .unwrap()
            .iter()
            .cloned()
            .chain(method_task_mw)
            .chain(route.task_middlewares.iter().cloned())
            .collect();

        let merged = match run_task_middlewares(&all_task_mw, req_data.clone()).await {
            Ok(p) => p,
            Err(e) => {
                error!("[{}] task middleware failed: {}", rid, e);
                return plain_response(e.status(), e.to_string());
            }
        };
        if merged.is_terminal() {
            let builder = merged.apply(Response::builder());
            return builder.body(Body::empty()).unwrap();
        }
        *req_data.response_proxy.lock().unwrap() = merged;

        let all_http_mw: Vec<_> = self
            .global_http_middlewares
            .read()
            .unwrap()
            .iter()
            .cloned()
            .chain(method_http_mw)
            .chain(route.http_middlewares.iter().cloned())
            .collect();

        let mut response = match &route.kind {
            RouteKind::Http(handler) => {
                let chain = compile_http_chain(&all_http_mw, handler.clone());
                chain(req_data.clone()).await
            }
            RouteKind::Task(handler) => {
                let handler = handler.clone();
                let chain = compile_http_chain(
                    &all_http_mw,
                    Arc::new(move |req_data: Arc<ReqData>| {
                        let handler = handler.clone();
                        Box::pin(async move { task_to_json(&handler, req_data).await })
                    }),
                );
                chain(req_data.clone()).await
            }
        };

        {
            let proxy = req_data.response_proxy.lock().unwrap();
            proxy.apply_headers_and_cookies(response.headers_mut());
        }

        if used_head_fallback {
            let (parts, _) = response.into_parts();
            response = Response::from_parts(parts, Body::empty());
        }

        trace!("[{}] {} {} -> {}", rid, log_method, log_path, response.status());
        response
    }
}

async fn task_to_json(
    handler: &crate::router::TaskHandlerFn,
    req_data: Arc<ReqData>,
) -> Response<Body> {
    match handler(req_data.clone()).await {
        Ok(value) => {
            if value.is_null() {
                warn!("task handler returned a null value; serializing as JSON null");
            }
            let body = serde_json::to_vec(&value).unwrap_or_else(|_| b"null".to_vec());
            Response::builder()
                .status(StatusCode::OK)
                .header(hyper::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(Body::from(body))
                .unwrap()
        }
        Err(e) => {
            error!("task handler failed: {}", e);
            plain_response(e.status(), "internal error")
        }
    }
}
