//! Task engine: memoized `(task, input) -> output` execution scoped to a [`Ctx`], with
//! cooperative cancellation and parallel fan-out.
//!
//! A [`Task`] is a named async function. Running it through a [`Ctx`] memoizes the result by
//! `(task identity, input)` for the lifetime of that context, so two call sites that both need
//! the same derived value within one request (an authenticated user, a parsed body) pay for the
//! work exactly once, however many times they ask for it. The cache key erases its input type
//! via `Any` so one `Ctx` can back tasks of unrelated `Task<I, O, E>` shapes in the same map.

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Notify, OnceCell};

/// The error a memoized task run surfaces to its caller.
///
/// This is distinct from the task's own `E`: it additionally covers cancellation, which can
/// reach any caller regardless of what the underlying task function returns.
#[derive(Debug, Error, Clone)]
pub enum TaskError {
    /// The owning [`Ctx`] was cancelled before or during this run.
    #[error("task cancelled")]
    Cancelled,
    /// The task function itself returned an error, which was memoized alongside it.
    #[error("task failed: {0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A named, memoizable unit of async work.
///
/// `Task` is cheap to clone (it's an `Arc` handle plus an id) and is normally constructed once
/// and shared across every request that might need it; each [`Ctx`] memoizes its own calls to
/// it independently.
pub struct Task<I, O, E> {
    id: usize,
    func: Arc<dyn Fn(Ctx, I) -> BoxFuture<Result<O, E>> + Send + Sync>,
}

impl<I, O, E> Clone for Task<I, O, E> {
    fn clone(&self) -> Self {
        Task {
            id: self.id,
            func: self.func.clone(),
        }
    }
}

static NEXT_TASK_ID: AtomicUsize = AtomicUsize::new(0);

impl<I, O, E> Task<I, O, E>
where
    I: Hash + Eq + Send + Sync + Clone + 'static,
    O: Send + Sync + Clone + 'static,
    E: std::error::Error + Send + Sync + Clone + 'static,
{
    /// Wraps `func` as a task with a fresh, process-unique identity. Two `Task`s built from
    /// identical closures are still distinct tasks — identity comes from construction, not from
    /// the function's behavior.
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Ctx, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        Task {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            func: Arc::new(move |ctx, input| Box::pin(func(ctx, input))),
        }
    }

    /// Binds this task to a context and input, returning a future that, when polled, runs (or
    /// reuses the memoized result of) that exact call. The context is captured at bind time:
    /// unlike a raw closure over a borrowed context, this produces an owned, `'static` future
    /// that [`Ctx::run_parallel`] can hold alongside others.
    pub fn bind(&self, ctx: Ctx, input: I) -> BoxFuture<Result<O, TaskError>> {
        let task = self.clone();
        Box::pin(async move { ctx.run(&task, input).await })
    }
}

/// Cooperative cancellation shared by a [`Ctx`] and everything derived from it.
///
/// Cancellation here is advisory: it doesn't abort in-flight futures by itself, but every
/// `Ctx::run` checks it before starting new work, and [`Ctx::run_parallel`] trips it the moment
/// any branch fails so siblings still queued stop before they start.
#[derive(Clone)]
pub struct Cancellation(Arc<CancellationInner>);

struct CancellationInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Default for Cancellation {
    fn default() -> Self {
        Cancellation(Arc::new(CancellationInner {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }))
    }
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    /// Resolves immediately if already cancelled, otherwise waits for [`Cancellation::cancel`].
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.0.notify.notified().await;
    }
}

/// A type-erased, hashable, equality-comparable wrapper around a task's input, used as half of
/// the memoization cache key. Erasure lets one cache `HashMap` hold inputs from unrelated
/// `Task<I, ..>` instantiations.
struct ErasedInput {
    value: Arc<dyn Any + Send + Sync>,
    hash: u64,
    eq: fn(&(dyn Any + Send + Sync), &(dyn Any + Send + Sync)) -> bool,
}

impl ErasedInput {
    fn new<I: Hash + Eq + Send + Sync + 'static>(input: I) -> Self {
        let mut hasher = DefaultHasher::new();
        input.hash(&mut hasher);
        ErasedInput {
            value: Arc::new(input),
            hash: hasher.finish(),
            eq: Self::eq_impl::<I>,
        }
    }

    fn eq_impl<I: PartialEq + 'static>(a: &(dyn Any + Send + Sync), b: &(dyn Any + Send + Sync)) -> bool {
        match (a.downcast_ref::<I>(), b.downcast_ref::<I>()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for ErasedInput {
    fn eq(&self, other: &Self) -> bool {
        (self.eq)(&*self.value, &*other.value)
    }
}

impl Eq for ErasedInput {}

impl Hash for ErasedInput {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Debug for ErasedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErasedInput({:#x})", self.hash)
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    task_id: usize,
    input: ErasedInput,
}

enum ErasedOutcome {
    Ok(Arc<dyn Any + Send + Sync>),
    Err(Arc<dyn Any + Send + Sync>),
}

struct CacheEntry {
    cell: Arc<OnceCell<ErasedOutcome>>,
    inserted_at: Instant,
}

struct CtxInner {
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
    cancellation: Cancellation,
    ttl: Option<Duration>,
}

/// The scope a request's task memoization lives in.
///
/// One `Ctx` is created per inbound request and handed to every middleware, task handler, and
/// (for the nested router) loader that runs during it. Cloning a `Ctx` is cheap and shares the
/// same cache and cancellation signal — this is how two independent loaders that both call
/// `ctx.run(&current_user, ())` end up running the underlying work exactly once.
#[derive(Clone)]
pub struct Ctx(Arc<CtxInner>);

impl Ctx {
    /// Creates a fresh context with no memoized results and an optional cache TTL. When `ttl`
    /// is `Some`, entries older than it are dropped from the cache (not the in-flight
    /// computation, if one is still running) the next time any `run` call sweeps the cache.
    pub fn new(ttl: Option<Duration>) -> Self {
        Ctx(Arc::new(CtxInner {
            cache: Mutex::new(HashMap::new()),
            cancellation: Cancellation::default(),
            ttl,
        }))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancellation.is_cancelled()
    }

    pub fn cancel(&self) {
        self.0.cancellation.cancel();
    }

    pub async fn cancelled(&self) {
        self.0.cancellation.cancelled().await;
    }

    /// Runs `task` with `input` through this context's memoization cache.
    ///
    /// The first caller for a given `(task, input)` pair executes the task's function; every
    /// concurrent or later caller for the same pair awaits that same execution and receives a
    /// clone of its result. A cancelled context short-circuits before starting new work, but a
    /// run already in flight is allowed to finish so its result can still be memoized.
    pub async fn run<I, O, E>(&self, task: &Task<I, O, E>, input: I) -> Result<O, TaskError>
    where
        I: Hash + Eq + Send + Sync + Clone + 'static,
        O: Send + Sync + Clone + 'static,
        E: std::error::Error + Send + Sync + Clone + 'static,
    {
        if self.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        self.maybe_sweep();

        let key = CacheKey {
            task_id: task.id,
            input: ErasedInput::new(input.clone()),
        };

        let cell = {
            let mut cache = self.0.cache.lock().unwrap();
            cache
                .entry(key)
                .or_insert_with(|| CacheEntry {
                    cell: Arc::new(OnceCell::new()),
                    inserted_at: Instant::now(),
                })
                .cell
                .clone()
        };

        let ctx = self.clone();
        let func = task.func.clone();
        let outcome = cell
            .get_or_init(|| async move {
                match func(ctx, input).await {
                    Ok(value) => ErasedOutcome::Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>),
                    Err(err) => ErasedOutcome::Err(Arc::new(err) as Arc<dyn Any + Send + Sync>),
                }
            })
            .await;

        match outcome {
            ErasedOutcome::Ok(value) => Ok(value
                .downcast_ref::<O>()
                .expect("cache type mismatch for task output")
                .clone()),
            ErasedOutcome::Err(err) => Err(TaskError::Failed(Arc::new(
                err.downcast_ref::<E>()
                    .expect("cache type mismatch for task error")
                    .clone(),
            ))),
        }
    }

    /// Drops cache entries older than the configured TTL. A no-op when no TTL is configured.
    /// Entries currently executing (their `OnceCell` hasn't resolved yet) are left alone; only
    /// their age is what's checked, so a long-running task isn't evicted mid-flight.
    fn maybe_sweep(&self) {
        let ttl = match self.0.ttl {
            Some(ttl) => ttl,
            None => return,
        };
        let mut cache = self.0.cache.lock().unwrap();
        let now = Instant::now();
        cache.retain(|_, entry| now.duration_since(entry.inserted_at) < ttl);
    }

    /// Runs every future to completion, cancelling this context (and thus any sibling still
    /// reading it) the moment one fails. Returns the results in the same order the futures were
    /// given, or the first error encountered.
    pub async fn run_parallel<T>(
        &self,
        futures: Vec<BoxFuture<Result<T, TaskError>>>,
    ) -> Result<Vec<T>, TaskError>
    where
        T: Send + 'static,
    {
        use futures_util::stream::FuturesUnordered;
        use futures_util::StreamExt;

        let total = futures.len();
        let mut pending: FuturesUnordered<_> = futures
            .into_iter()
            .enumerate()
            .map(|(index, fut)| async move { (index, fut.await) })
            .collect();

        let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(value) => results[index] = Some(value),
                Err(err) => {
                    self.cancel();
                    return Err(err);
                }
            }
        }

        Ok(results.into_iter().map(|v| v.expect("every branch resolved or run_parallel returned early")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[derive(Debug, Clone, Error, PartialEq)]
    #[error("boom")]
    struct Boom;

    #[tokio::test]
    async fn memoizes_by_task_and_input() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let task: Task<u32, u32, Boom> = Task::new(move |_ctx, input| {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(input * 2)
            }
        });

        let ctx = Ctx::new(None);
        assert_eq!(ctx.run(&task, 5).await.unwrap(), 10);
        assert_eq!(ctx.run(&task, 5).await.unwrap(), 10);
        assert_eq!(ctx.run(&task, 6).await.unwrap(), 12);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let task: Task<(), u32, Boom> = Task::new(move |_ctx, _input| {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(7)
            }
        });

        let ctx = Ctx::new(None);
        let a = ctx.run(&task, ());
        let b = ctx.run(&task, ());
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_parallel_cancels_siblings_on_first_error() {
        let ctx = Ctx::new(None);
        let ok_task: Task<(), u32, Boom> = Task::new(|_ctx, _| async { Ok(1) });
        let err_task: Task<(), u32, Boom> = Task::new(|_ctx, _| async { Err(Boom) });

        let futures = vec![ok_task.bind(ctx.clone(), ()), err_task.bind(ctx.clone(), ())];
        let result = ctx.run_parallel(futures).await;
        assert!(result.is_err());
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn ttl_expires_cache_entries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let task: Task<(), u32, Boom> = Task::new(move |_ctx, _input| {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
        });

        let ctx = Ctx::new(Some(Duration::from_millis(5)));
        ctx.run(&task, ()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.run(&task, ()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
