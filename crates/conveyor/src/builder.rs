use crate::batch::{BatchPlan, BatchQueue, BatchStep, QueueControl};
use crate::error::{BoxError, ProcessorError};
use crate::executor::Executor;
use crate::processor::ObjectProcessor;
use crate::settings::BatchSettings;
use crate::stage::{self, Stage};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// Builds the sequential part of a pipeline that turns `T` into `R`.
///
/// Obtained from [`ObjectProcessor::builder`]. Every `map` returns a builder with a
/// new output type; [`ProcessorBuilder::batched`] opens a batched block.
#[must_use = "A builder does nothing until `build` is called."]
pub struct ProcessorBuilder<T, R> {
    executor: Executor,
    stage: Stage<T, R>,
    queues: Vec<QueueControl>,
    closing: Arc<AtomicBool>,
}

impl<T: Send + 'static> ProcessorBuilder<T, T> {
    pub(crate) fn new(executor: Executor) -> Self {
        Self {
            executor,
            stage: stage::identity(),
            queues: Vec::new(),
            closing: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<T: Send + 'static, R: Send + 'static> ProcessorBuilder<T, R> {
    /// Appends a per-value transformation.
    pub fn map<S, F>(self, f: F) -> ProcessorBuilder<T, S>
    where
        S: Send + 'static,
        F: Fn(R) -> S + Send + Sync + 'static,
    {
        self.then(move |value: R| Ok(f(value)))
    }

    /// Appends a fallible per-value transformation. An `Err` ends processing of
    /// that value with [`ProcessorError::Stage`].
    pub fn try_map<S, E, F>(self, f: F) -> ProcessorBuilder<T, S>
    where
        S: Send + 'static,
        E: Into<BoxError>,
        F: Fn(R) -> Result<S, E> + Send + Sync + 'static,
    {
        self.then(move |value: R| f(value).map_err(ProcessorError::stage))
    }

    fn then<S, F>(self, f: F) -> ProcessorBuilder<T, S>
    where
        S: Send + 'static,
        F: Fn(R) -> Result<S, ProcessorError> + Send + Sync + 'static,
    {
        ProcessorBuilder {
            executor: self.executor,
            stage: stage::then_map(self.stage, f),
            queues: self.queues,
            closing: self.closing,
        }
    }

    /// Opens a batched block flushing at `max_size` values or `timeout` after the
    /// first queued value.
    pub fn batched(self, max_size: usize, timeout: Duration) -> BatchedProcessorBuilder<T, R, R> {
        self.batched_with(BatchSettings::new(max_size, timeout))
    }

    /// Opens a batched block; settings are validated when the block is closed.
    pub fn batched_with(self, settings: BatchSettings) -> BatchedProcessorBuilder<T, R, R> {
        BatchedProcessorBuilder { upstream: self, settings, steps: Vec::new(), output: PhantomData }
    }

    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Number of batch queues started so far.
    #[must_use]
    pub fn batch_queues(&self) -> usize {
        self.queues.len()
    }

    pub fn build(self) -> ObjectProcessor<T, R> {
        ObjectProcessor::new(self.stage, self.executor, self.queues, self.closing)
    }
}

impl<T, R> fmt::Debug for ProcessorBuilder<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorBuilder")
            .field("executor", &self.executor)
            .field("batch_queues", &self.queues.len())
            .finish_non_exhaustive()
    }
}

/// An open batched block: values of type `B` enter a batch queue and leave as `R`.
///
/// Stages added here run per batch. [`BatchedProcessorBuilder::sequential`] closes the
/// block and starts its queue.
#[must_use = "A batched block must be closed with `sequential`."]
pub struct BatchedProcessorBuilder<T, B, R> {
    upstream: ProcessorBuilder<T, B>,
    settings: BatchSettings,
    steps: Vec<BatchStep>,
    output: PhantomData<fn() -> R>,
}

impl<T, B, R> BatchedProcessorBuilder<T, B, R>
where
    T: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    /// Appends a per-element transformation. Elements of a batch are processed
    /// concurrently; a failing element does not affect the others.
    pub fn map<S, F>(self, f: F) -> BatchedProcessorBuilder<T, B, S>
    where
        S: Send + 'static,
        F: Fn(R) -> S + Send + Sync + 'static,
    {
        self.push(BatchStep::map(move |value: R| Ok(f(value))))
    }

    /// Fallible per-element transformation; only the failing element gets the error.
    pub fn try_map<S, E, F>(self, f: F) -> BatchedProcessorBuilder<T, B, S>
    where
        S: Send + 'static,
        E: Into<BoxError>,
        F: Fn(R) -> Result<S, E> + Send + Sync + 'static,
    {
        self.push(BatchStep::map(move |value: R| f(value).map_err(ProcessorError::stage)))
    }

    /// Appends a whole-batch transformation. It receives the batch's surviving
    /// elements in arrival order and must return exactly one value per input;
    /// otherwise each of them fails with [`ProcessorError::BatchSizeMismatch`].
    pub fn flat_map<S, F>(self, f: F) -> BatchedProcessorBuilder<T, B, S>
    where
        S: Send + 'static,
        F: Fn(Vec<R>) -> Vec<S> + Send + Sync + 'static,
    {
        self.push(BatchStep::flat_map(move |values: Vec<R>| Ok(f(values))))
    }

    /// Fallible whole-batch transformation; an `Err` is delivered to every element
    /// of the batch.
    pub fn try_flat_map<S, E, F>(self, f: F) -> BatchedProcessorBuilder<T, B, S>
    where
        S: Send + 'static,
        E: Into<BoxError>,
        F: Fn(Vec<R>) -> Result<Vec<S>, E> + Send + Sync + 'static,
    {
        self.push(BatchStep::flat_map(move |values: Vec<R>| f(values).map_err(ProcessorError::stage)))
    }

    fn push<S>(mut self, step: BatchStep) -> BatchedProcessorBuilder<T, B, S> {
        self.steps.push(step);
        BatchedProcessorBuilder {
            upstream: self.upstream,
            settings: self.settings,
            steps: self.steps,
            output: PhantomData,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Closes the block and starts its batch queue on the builder's executor.
    ///
    /// # Errors
    /// [`ProcessorError::InvalidConfiguration`] when the block has no stages or its
    /// settings are invalid.
    pub fn sequential(self) -> Result<ProcessorBuilder<T, R>, ProcessorError> {
        let settings = self.settings.validate()?;
        let plan = BatchPlan::fuse(self.steps)?;
        let ProcessorBuilder { executor, stage, mut queues, closing } = self.upstream;

        let queue = BatchQueue::<B, R>::start(settings, plan, executor.clone());
        queues.push(queue.control());

        let stage = stage::then_offer(stage, queue, Arc::clone(&closing));
        Ok(ProcessorBuilder { stage, executor, queues, closing })
    }
}

impl<T, B, R> fmt::Debug for BatchedProcessorBuilder<T, B, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchedProcessorBuilder")
            .field("upstream", &self.upstream)
            .field("settings", &self.settings)
            .field("steps", &self.steps.len())
            .finish()
    }
}
