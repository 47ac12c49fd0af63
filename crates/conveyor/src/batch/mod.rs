//! # Batch queue
//!
//! A bounded channel feeding one worker task. The worker gathers values into a batch
//! until it holds `max_size` of them or `timeout` has passed since the batch's first
//! value, runs the batch through its [`BatchPlan`], and answers each submitter on its
//! own oneshot channel. Only one batch is in flight per queue and batches are flushed
//! in arrival order.
//!
//! Submitters wait for channel capacity, so a slow block slows its producers down
//! instead of dropping values.
//!
//! Values still on their way into a queue hold an [`Arrival`]. Shutdown waits for
//! those before it closes the channel, so a value that left an upstream block is
//! not turned away by the next one.

mod plan;

pub(crate) use plan::{BatchPlan, BatchStep};

use crate::error::ProcessorError;
use crate::executor::Executor;
use crate::settings::BatchSettings;
use parking_lot::Mutex;
use plan::{AnyValue, downcast};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, debug_span, trace, warn};

static NEXT_QUEUE_ID: AtomicUsize = AtomicUsize::new(1);

/// Upper bound for the up-front allocation of a batch; larger batches grow.
const INITIAL_BATCH_CAPACITY: usize = 1024;
/// Deadline used when `timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

struct Pending<B, R> {
    value: B,
    reply: oneshot::Sender<Result<R, ProcessorError>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushReason {
    Full,
    Timeout,
    Drain,
}

impl FlushReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Timeout => "timeout",
            Self::Drain => "drain",
        }
    }
}

/// Submission side of a running batch queue.
pub(crate) struct BatchQueue<B, R> {
    sender: mpsc::Sender<Pending<B, R>>,
    control: QueueControl,
}

impl<B, R> Clone for BatchQueue<B, R> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone(), control: self.control.clone() }
    }
}

impl<B: Send + 'static, R: Send + 'static> BatchQueue<B, R> {
    /// Spawns the worker on `executor`'s runtime.
    pub(crate) fn start(settings: BatchSettings, plan: BatchPlan, executor: Executor) -> Self {
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(settings.queue_capacity());
        let (shutdown, shutdown_rx) = watch::channel(false);

        debug!(
            queue = id,
            max_size = settings.max_size,
            timeout_ms = u64::try_from(settings.timeout.as_millis()).unwrap_or(u64::MAX),
            capacity = settings.queue_capacity(),
            steps = plan.len(),
            mode = ?executor.mode(),
            "Batch queue started"
        );

        let worker = Worker::<B, R> {
            receiver,
            shutdown: shutdown_rx,
            closing: false,
            settings,
            plan,
            executor: executor.clone(),
            output: PhantomData,
        };
        let handle = executor.spawn(worker.run().instrument(debug_span!("batch_queue", queue = id)));

        Self { sender, control: QueueControl::new(id, shutdown, handle) }
    }

    /// Enqueues `value` and waits for its batch to be processed.
    ///
    /// The sender and `arrival` are released as soon as the value is in the
    /// channel, so a queue whose pipeline was dropped drains and stops on its own.
    ///
    /// # Errors
    /// * [`ProcessorError::Closed`] once the queue has been shut down.
    /// * [`ProcessorError::Cancelled`] if the worker stopped before answering.
    /// * Whatever the block's stages reported for this value.
    pub(crate) async fn offer(self, value: B, arrival: Option<Arrival>) -> Result<R, ProcessorError> {
        let Self { sender, control } = self;
        let id = control.id();
        let (reply, answer) = oneshot::channel();
        let sent = sender.send(Pending { value, reply }).await;
        drop(sender);
        drop(arrival);
        sent.map_err(|_| ProcessorError::Closed {
            message: format!("batch queue {id} no longer accepts values").into(),
            context: None,
        })?;

        answer.await.map_err(|_| ProcessorError::Cancelled {
            message: format!("batch queue {id} stopped before answering").into(),
            context: None,
        })?
    }

    pub(crate) fn control(&self) -> QueueControl {
        self.control.clone()
    }
}

/// Shutdown side of a batch queue, detached from its value types.
#[derive(Clone)]
pub(crate) struct QueueControl {
    inner: Arc<ControlInner>,
}

struct ControlInner {
    id: usize,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    arriving: AtomicUsize,
    arrived: Notify,
}

impl QueueControl {
    fn new(id: usize, shutdown: watch::Sender<bool>, worker: JoinHandle<()>) -> Self {
        Self {
            inner: Arc::new(ControlInner {
                id,
                shutdown,
                worker: Mutex::new(Some(worker)),
                arriving: AtomicUsize::new(0),
                arrived: Notify::new(),
            }),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.inner.id
    }

    /// Registers a value that is headed for this queue.
    pub(crate) fn arrival(&self) -> Arrival {
        self.inner.arriving.fetch_add(1, Ordering::AcqRel);
        Arrival { control: self.clone() }
    }

    /// Resolves once every registered value has been enqueued or has failed upstream.
    async fn settled(&self) {
        loop {
            let mut arrived = std::pin::pin!(self.inner.arrived.notified());
            arrived.as_mut().enable();
            if self.inner.arriving.load(Ordering::Acquire) == 0 {
                return;
            }
            arrived.await;
        }
    }

    /// Waits for registered arrivals, then stops accepting values, lets the worker
    /// flush what is already queued and waits for it to exit. Later calls return
    /// immediately.
    pub(crate) async fn shutdown(&self) {
        self.settled().await;
        self.inner.shutdown.send_replace(true);
        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(queue = self.inner.id, error = %e, "Batch worker ended abnormally");
            }
        }
    }
}

/// A value on its way into a queue. Dropped once it is enqueued or has failed.
pub(crate) struct Arrival {
    control: QueueControl,
}

impl Drop for Arrival {
    fn drop(&mut self) {
        if self.control.inner.arriving.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.control.inner.arrived.notify_waiters();
        }
    }
}

struct Worker<B, R> {
    receiver: mpsc::Receiver<Pending<B, R>>,
    shutdown: watch::Receiver<bool>,
    closing: bool,
    settings: BatchSettings,
    plan: BatchPlan,
    executor: Executor,
    output: PhantomData<fn() -> R>,
}

impl<B: Send + 'static, R: Send + 'static> Worker<B, R> {
    async fn run(mut self) {
        while let Some(first) = self.next_first().await {
            let now = Instant::now();
            let deadline = now.checked_add(self.settings.timeout).unwrap_or(now + FAR_FUTURE);
            let mut batch = Vec::with_capacity(self.settings.max_size.min(INITIAL_BATCH_CAPACITY));
            batch.push(first);
            let reason = self.fill(&mut batch, deadline).await;
            Self::flush(&self.plan, &self.executor, batch, reason).await;
        }
        debug!("Batch queue stopped");
    }

    /// Waits for the first value of the next batch. `None` once the channel is
    /// closed and empty.
    async fn next_first(&mut self) -> Option<Pending<B, R>> {
        loop {
            if self.closing {
                return self.receiver.recv().await;
            }
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => self.close(),
                item = self.receiver.recv() => return item,
            }
        }
    }

    async fn fill(&mut self, batch: &mut Vec<Pending<B, R>>, deadline: Instant) -> FlushReason {
        while batch.len() < self.settings.max_size {
            let closing = self.closing;
            tokio::select! {
                biased;
                _ = self.shutdown.changed(), if !closing => self.close(),
                item = self.receiver.recv() => match item {
                    Some(pending) => batch.push(pending),
                    None => return FlushReason::Drain,
                },
                () = sleep_until(deadline), if !closing => return FlushReason::Timeout,
            }
        }
        FlushReason::Full
    }

    fn close(&mut self) {
        if !self.closing {
            trace!("Batch queue closing");
            self.closing = true;
            self.receiver.close();
        }
    }

    async fn flush(
        plan: &BatchPlan,
        executor: &Executor,
        batch: Vec<Pending<B, R>>,
        reason: FlushReason,
    ) {
        let size = batch.len();
        debug!(size, reason = reason.as_str(), "Processing batch");

        let (values, replies): (Vec<AnyValue>, Vec<_>) = batch
            .into_iter()
            .map(|pending| (Box::new(pending.value) as AnyValue, pending.reply))
            .unzip();

        let results = plan.run(values, executor).await;
        let mut failed = 0_usize;
        for (reply, result) in replies.into_iter().zip(results) {
            let answer = result.and_then(downcast::<R>);
            failed += usize::from(answer.is_err());
            if reply.send(answer).is_err() {
                trace!("Submitter went away before its result was ready");
            }
        }
        debug!(size, failed, "Batch processed");
    }
}
