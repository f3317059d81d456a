//! Memoization and parallel cancellation against the public `Ctx`/`Task` API.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use waypoint::task::{Ctx, Task};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("boom")]
struct Boom;

#[tokio::test]
async fn repeated_calls_with_the_same_input_run_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let counted = calls.clone();
    let double: Task<u32, u32, Boom> = Task::new(move |_ctx, input| {
        let counted = counted.clone();
        async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(input * 2)
        }
    });

    let ctx = Ctx::new(None);
    assert_eq!(ctx.run(&double, 21).await.unwrap(), 42);
    assert_eq!(ctx.run(&double, 21).await.unwrap(), 42);
    assert_eq!(ctx.run(&double, 7).await.unwrap(), 14);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn run_parallel_surfaces_first_failure_and_cancels_context() {
    let ctx = Ctx::new(None);
    let succeed: Task<(), u32, Boom> = Task::new(|_ctx, _| async { Ok(1) });
    let fail: Task<(), u32, Boom> = Task::new(|_ctx, _| async { Err(Boom) });

    let futures = vec![succeed.bind(ctx.clone(), ()), fail.bind(ctx.clone(), ())];
    let result = ctx.run_parallel(futures).await;

    assert!(result.is_err());
    assert!(ctx.is_cancelled());
}

#[tokio::test]
async fn distinct_tasks_over_the_same_input_do_not_collide() {
    let a: Task<u32, u32, Boom> = Task::new(|_ctx, input| async move { Ok(input + 1) });
    let b: Task<u32, u32, Boom> = Task::new(|_ctx, input| async move { Ok(input + 100) });

    let ctx = Ctx::new(None);
    assert_eq!(ctx.run(&a, 1).await.unwrap(), 2);
    assert_eq!(ctx.run(&b, 1).await.unwrap(), 101);
}
