//! Composition of the per-value part of a pipeline.

use crate::batch::BatchQueue;
use crate::error::ProcessorError;
use crate::executor::run_inline;
use std::future::{Future, ready};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// One value in, one answer out.
pub(crate) type Stage<T, R> = Arc<dyn Fn(T) -> BoxFuture<Result<R, ProcessorError>> + Send + Sync>;

pub(crate) fn identity<T: Send + 'static>() -> Stage<T, T> {
    Arc::new(|value| Box::pin(ready(Ok(value))))
}

/// Appends a synchronous function. It runs on whichever task drives the value.
pub(crate) fn then_map<T, R, S, F>(stage: Stage<T, R>, f: F) -> Stage<T, S>
where
    T: Send + 'static,
    R: Send + 'static,
    S: Send + 'static,
    F: Fn(R) -> Result<S, ProcessorError> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |value| {
        let upstream = stage(value);
        let f = Arc::clone(&f);
        Box::pin(async move {
            let value = upstream.await?;
            run_inline(move || f(value)).and_then(|r| r)
        })
    })
}

/// Appends a batch queue: the upstream result is offered and the batch answer awaited.
///
/// Until `closing` is set, each value registers its arrival with the queue when it
/// enters the pipeline, so shutting the queue down waits for it.
pub(crate) fn then_offer<T, B, R>(
    stage: Stage<T, B>,
    queue: BatchQueue<B, R>,
    closing: Arc<AtomicBool>,
) -> Stage<T, R>
where
    T: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    Arc::new(move |value| {
        let arrival = (!closing.load(Ordering::Acquire)).then(|| queue.control().arrival());
        let upstream = stage(value);
        let queue = queue.clone();
        Box::pin(async move { queue.offer(upstream.await?, arrival).await })
    })
}
