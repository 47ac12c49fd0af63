use crate::batch::QueueControl;
use crate::builder::ProcessorBuilder;
use crate::error::ProcessorError;
use crate::executor::Executor;
use crate::stage::Stage;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A built pipeline from `T` to `R`.
///
/// Cheap to clone; clones share the same batch queues.
pub struct ObjectProcessor<T, R> {
    inner: Arc<Inner<T, R>>,
}

struct Inner<T, R> {
    stage: Stage<T, R>,
    executor: Executor,
    queues: Vec<QueueControl>,
    closing: Arc<AtomicBool>,
}

impl<T, R> Clone for ObjectProcessor<T, R> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Send + 'static> ObjectProcessor<T, T> {
    /// Starts a pipeline on the caller's runtime, or on the global runtime when
    /// called outside one.
    pub fn builder() -> ProcessorBuilder<T, T> {
        ProcessorBuilder::new(Executor::ambient())
    }

    pub fn builder_on(executor: Executor) -> ProcessorBuilder<T, T> {
        ProcessorBuilder::new(executor)
    }
}

impl<T: Send + 'static, R: Send + 'static> ObjectProcessor<T, R> {
    pub(crate) fn new(
        stage: Stage<T, R>,
        executor: Executor,
        queues: Vec<QueueControl>,
        closing: Arc<AtomicBool>,
    ) -> Self {
        debug!(batch_queues = queues.len(), "Processor built");
        Self { inner: Arc::new(Inner { stage, executor, queues, closing }) }
    }

    /// Submits `value` and returns a handle resolving to its result.
    ///
    /// Processing starts immediately on the executor, whether or not the handle is
    /// polled. Dropping the handle does not cancel it; [`ProcessingHandle::abort`] does.
    pub fn apply(&self, value: T) -> ProcessingHandle<R> {
        ProcessingHandle { task: self.inner.executor.spawn((self.inner.stage)(value)) }
    }

    /// Runs `value` through the pipeline on the calling task.
    ///
    /// # Errors
    /// The first error any stage reported for this value.
    pub async fn process(&self, value: T) -> Result<R, ProcessorError> {
        (self.inner.stage)(value).await
    }

    /// Stops every batch queue after flushing what it already holds.
    ///
    /// Queues close in pipeline order. Each one first waits for the values that
    /// were submitted before the call and are still on their way to it, so every
    /// such value is answered. Values submitted afterwards fail with
    /// [`ProcessorError::Closed`] when they reach a batched block. Calling it again
    /// is a no-op.
    pub async fn shutdown(&self) {
        self.inner.closing.store(true, Ordering::Release);
        for queue in &self.inner.queues {
            queue.shutdown().await;
        }
        info!(batch_queues = self.inner.queues.len(), "Processor shut down");
    }

    /// Number of batch queues in this pipeline.
    #[must_use]
    pub fn batch_queues(&self) -> usize {
        self.inner.queues.len()
    }

    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }
}

impl<T, R> fmt::Debug for ObjectProcessor<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectProcessor")
            .field("executor", &self.inner.executor)
            .field("batch_queues", &self.inner.queues.len())
            .finish_non_exhaustive()
    }
}

/// The pending result of [`ObjectProcessor::apply`].
#[must_use = "A handle does nothing unless awaited."]
#[derive(Debug)]
pub struct ProcessingHandle<R> {
    task: JoinHandle<Result<R, ProcessorError>>,
}

impl<R> ProcessingHandle<R> {
    /// Cancels processing. Awaiting the handle then yields
    /// [`ProcessorError::Cancelled`] unless the value was already done.
    pub fn abort(&self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<R> Future for ProcessingHandle<R> {
    type Output = Result<R, ProcessorError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task)
            .poll(cx)
            .map(|joined| joined.map_err(ProcessorError::from_join).and_then(|r| r))
    }
}
