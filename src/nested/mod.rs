//! The nested router: resolves the full ancestor chain of route segments for a path and runs
//! their loader tasks concurrently, one result slot per matched segment.
//!
//! Unlike [`crate::router::Router`], patterns here carry no HTTP method (every match is
//! effectively a `GET`) and a loader is optional — a pattern with no loader still occupies a
//! slot in the result sequence, marked as not having run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::trace;

use crate::error::RouterError;
use crate::pattern::nested::find_nested_matches as pattern_find_nested_matches;
use crate::pattern::{Match, NestedMatchSet, PatternRegistry, PatternRegistryConfig};
use crate::router::{Input, ReqData, ResponseProxy};
use crate::task::{Ctx, TaskError};
use crate::BoxFuture;

/// A loader: runs once per matched segment, producing the segment's data and its own response
/// proxy. Loaders receive a no-input [`ReqData`] — params and splat values come from the match,
/// not from `marshal_input`.
pub type LoaderFn =
    Arc<dyn Fn(Arc<ReqData>) -> BoxFuture<Result<serde_json::Value, RouterError>> + Send + Sync>;

/// One segment's outcome after [`NestedRouter::find_nested_matches_and_run_tasks`]: either it
/// had no loader at all, or its loader ran and produced data/error plus whatever it wrote to its
/// own response proxy.
pub enum SlotResult {
    /// The matched pattern has no loader registered against it.
    NoTask,
    Ok {
        data: serde_json::Value,
        response_proxy: ResponseProxy,
    },
    Err(RouterError),
}

/// The full result of resolving and running a nested chain: the matches themselves, plus one
/// [`SlotResult`] per match, index-aligned with `matches`.
pub struct NestedRunResult {
    pub matches: NestedMatchSet,
    pub slots: Vec<SlotResult>,
}

struct NestedRoute {
    loader: Option<LoaderFn>,
}

/// A pattern registry paired with an optional loader per pattern.
pub struct NestedRouter {
    registry: Mutex<PatternRegistry>,
    routes: Mutex<HashMap<String, NestedRoute>>,
}

impl NestedRouter {
    pub fn new(config: PatternRegistryConfig) -> Self {
        NestedRouter {
            registry: Mutex::new(PatternRegistry::new(config)),
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `pattern` with no loader; useful for pure layout segments that only contribute
    /// to the ancestor chain without fetching anything.
    pub fn register(&self, pattern: &str) {
        self.register_with_loader_opt(pattern, None);
    }

    /// Registers `pattern` with a loader that runs whenever this segment is part of a matched
    /// chain.
    pub fn register_with_loader(&self, pattern: &str, loader: LoaderFn) {
        self.register_with_loader_opt(pattern, Some(loader));
    }

    fn register_with_loader_opt(&self, pattern: &str, loader: Option<LoaderFn>) {
        let registered = self
            .registry
            .lock()
            .unwrap()
            .register(pattern)
            .unwrap_or_else(|e| panic!("invalid nested route pattern {:?}: {}", pattern, e));
        self.routes
            .lock()
            .unwrap()
            .insert(registered.normalized_pattern, NestedRoute { loader });
    }

    /// Resolves the ancestor chain for `real_path` without running any loaders.
    pub fn find_nested_matches(&self, real_path: &str) -> Option<NestedMatchSet> {
        let registry = self.registry.lock().unwrap();
        pattern_find_nested_matches(&*registry, real_path)
    }

    /// Resolves the ancestor chain for `real_path` and runs every matched segment's loader
    /// concurrently through `tasks_ctx`, so loaders on different segments that call the same
    /// underlying task dedupe to a single execution.
    pub async fn find_nested_matches_and_run_tasks(
        &self,
        tasks_ctx: Ctx,
        real_path: &str,
        request_parts: hyper::http::request::Parts,
    ) -> Option<NestedRunResult> {
        let matches = self.find_nested_matches(real_path)?;

        let routes = self.routes.lock().unwrap();
        let mut slots: Vec<Option<SlotResult>> = Vec::with_capacity(matches.matches.len());
        let mut futures: Vec<BoxFuture<Result<(usize, serde_json::Value, ResponseProxy), TaskError>>> =
            Vec::new();

        for (index, m) in matches.matches.iter().enumerate() {
            let loader = routes
                .get(&m.pattern.normalized_pattern)
                .and_then(|r| r.loader.clone());
            match loader {
                None => slots.push(Some(SlotResult::NoTask)),
                Some(loader) => {
                    slots.push(None);
                    let req_data = Arc::new(request_data_for(m, &request_parts, tasks_ctx.clone()));
                    futures.push(Box::pin(async move {
                        trace!("running nested loader for {}", req_data.request_parts.uri.path());
                        match loader(req_data.clone()).await {
                            Ok(data) => {
                                let proxy = req_data.response_proxy.lock().unwrap().clone();
                                Ok((index, data, proxy))
                            }
                            Err(e) => Err(TaskError::Failed(Arc::new(e))),
                        }
                    }));
                }
            }
        }
        drop(routes);

        if !futures.is_empty() {
            match tasks_ctx.run_parallel(futures).await {
                Ok(results) => {
                    for (index, data, proxy) in results {
                        slots[index] = Some(SlotResult::Ok {
                            data,
                            response_proxy: proxy,
                        });
                    }
                }
                Err(TaskError::Failed(e)) => {
                    // `run_parallel` stops at the first failure; every still-`None` slot belongs
                    // to a loader that was cancelled before it could report its own outcome.
                    let err = RouterError::TaskFailed(e);
                    for slot in slots.iter_mut() {
                        if slot.is_none() {
                            *slot = Some(SlotResult::Err(err.clone()));
                        }
                    }
                }
                Err(TaskError::Cancelled) => {
                    for slot in slots.iter_mut() {
                        if slot.is_none() {
                            *slot = Some(SlotResult::Err(RouterError::Cancelled));
                        }
                    }
                }
            }
        }

        Some(NestedRunResult {
            matches,
            slots: slots.into_iter().map(|s| s.expect("every slot filled")).collect(),
        })
    }
}

fn request_data_for(m: &Match, parts: &hyper::http::request::Parts, tasks_ctx: Ctx) -> ReqData {
    ReqData {
        params: m.params.clone(),
        splat_values: m.splat_values.clone(),
        tasks_ctx,
        input: Input::None,
        request_parts: parts.clone(),
        response_proxy: Mutex::new(ResponseProxy::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn parts() -> hyper::http::request::Parts {
        hyper::Request::get("/dashboard/customers/123").body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn nested_chain_runs_each_loader_once() {
        let router = NestedRouter::new(PatternRegistryConfig::default());
        router.register("");
        router.register("/dashboard");
        router.register_with_loader(
            "/dashboard/customers",
            Arc::new(|_req| Box::pin(async { Ok(serde_json::json!({"section": "customers"})) })),
        );
        router.register_with_loader(
            "/dashboard/customers/:customer_id",
            Arc::new(|req| {
                let id = req.param("customer_id").unwrap().to_string();
                Box::pin(async move { Ok(serde_json::json!({"customer_id": id})) })
            }),
        );

        let ctx = Ctx::new(None);
        let result = router
            .find_nested_matches_and_run_tasks(ctx, "/dashboard/customers/123", parts())
            .await
            .unwrap();

        assert_eq!(result.matches.matches.len(), 4);
        assert!(matches!(result.slots[0], SlotResult::NoTask));
        assert!(matches!(result.slots[1], SlotResult::NoTask));
        match &result.slots[3] {
            SlotResult::Ok { data, .. } => assert_eq!(data["customer_id"], "123"),
            _ => panic!("expected loader result"),
        }
    }

    #[derive(Debug, Clone, thiserror::Error, PartialEq)]
    #[error("auth failed")]
    struct AuthError;

    #[tokio::test]
    async fn shared_loader_dependency_runs_once_across_segments() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let auth_task: crate::task::Task<(), u32, AuthError> =
            crate::task::Task::new(move |_ctx, _input| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            });

        let router = NestedRouter::new(PatternRegistryConfig::default());
        let auth_a = auth_task.clone();
        router.register_with_loader(
            "/dashboard",
            Arc::new(move |req| {
                let auth = auth_a.clone();
                let ctx = req.tasks_ctx.clone();
                Box::pin(async move {
                    ctx.run(&auth, ())
                        .await
                        .map(|v| serde_json::json!(v))
                        .map_err(|e| RouterError::TaskFailed(Arc::new(e)))
                })
            }),
        );
        let auth_b = auth_task.clone();
        router.register_with_loader(
            "/dashboard/customers",
            Arc::new(move |req| {
                let auth = auth_b.clone();
                let ctx = req.tasks_ctx.clone();
                Box::pin(async move {
                    ctx.run(&auth, ())
                        .await
                        .map(|v| serde_json::json!(v))
                        .map_err(|e| RouterError::TaskFailed(Arc::new(e)))
                })
            }),
        );

        let ctx = Ctx::new(None);
        let result = router
            .find_nested_matches_and_run_tasks(ctx, "/dashboard/customers", parts())
            .await
            .unwrap();

        assert!(result.slots.iter().all(|s| matches!(s, SlotResult::Ok { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
