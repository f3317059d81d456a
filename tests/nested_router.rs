//! Ancestor-chain resolution with an index route, and loader deduplication across segments.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use waypoint::error::RouterError;
use waypoint::nested::{NestedRouter, SlotResult};
use waypoint::pattern::PatternRegistryConfig;
use waypoint::task::{Ctx, Task};

fn request_parts(path: &str) -> hyper::http::request::Parts {
    hyper::Request::get(path).body(()).unwrap().into_parts().0
}

#[tokio::test]
async fn nested_chain_with_index_orders_shallowest_to_deepest() {
    let router = NestedRouter::new(PatternRegistryConfig::default());
    for p in [
        "",
        "/dashboard",
        "/dashboard/customers",
        "/dashboard/customers/:customer_id",
        "/dashboard/customers/:customer_id/",
    ] {
        router.register(p);
    }

    let set = router.find_nested_matches("/dashboard/customers/123").unwrap();
    let patterns: Vec<_> = set.matches.iter().map(|m| m.pattern.normalized_pattern.clone()).collect();
    assert_eq!(
        patterns,
        vec![
            "".to_string(),
            "/dashboard".to_string(),
            "/dashboard/customers".to_string(),
            "/dashboard/customers/:customer_id".to_string(),
            "/dashboard/customers/:customer_id/".to_string(),
        ]
    );
    assert_eq!(set.params.get("customer_id").map(String::as_str), Some("123"));
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("auth failed")]
struct AuthError;

#[tokio::test]
async fn two_sibling_loaders_share_one_auth_task_execution() {
    let calls = Arc::new(AtomicU32::new(0));
    let counted = calls.clone();
    let auth_task: Task<(), u32, AuthError> = Task::new(move |_ctx, _input| {
        let counted = counted.clone();
        async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        }
    });

    let router = NestedRouter::new(PatternRegistryConfig::default());

    let auth_for_dashboard = auth_task.clone();
    router.register_with_loader(
        "/dashboard",
        Arc::new(move |req| {
            let auth = auth_for_dashboard.clone();
            let ctx = req.tasks_ctx.clone();
            Box::pin(async move {
                ctx.run(&auth, ())
                    .await
                    .map(|v| serde_json::json!({"uid": v}))
                    .map_err(|e| RouterError::TaskFailed(Arc::new(e)))
            })
        }),
    );
    let auth_for_customers = auth_task.clone();
    router.register_with_loader(
        "/dashboard/customers",
        Arc::new(move |req| {
            let auth = auth_for_customers.clone();
            let ctx = req.tasks_ctx.clone();
            Box::pin(async move {
                ctx.run(&auth, ())
                    .await
                    .map(|v| serde_json::json!({"uid": v}))
                    .map_err(|e| RouterError::TaskFailed(Arc::new(e)))
            })
        }),
    );

    let ctx = Ctx::new(None);
    let result = router
        .find_nested_matches_and_run_tasks(ctx, "/dashboard/customers", request_parts("/dashboard/customers"))
        .await
        .unwrap();

    for slot in &result.slots {
        match slot {
            SlotResult::Ok { data, .. } => assert_eq!(data["uid"], 42),
            SlotResult::NoTask => panic!("expected a loader result, got a slot with no registered task"),
            SlotResult::Err(e) => panic!("loader failed: {}", e),
        }
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1, "shared auth task must run exactly once");
}
