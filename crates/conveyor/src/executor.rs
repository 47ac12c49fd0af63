use crate::error::ProcessorError;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Where batched element work runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Each element of a batch becomes its own blocking job; a batch completes
    /// when all of its jobs have.
    #[default]
    Parallel,
    /// Jobs run inline on the calling task, one after the other.
    CallerRuns,
}

/// The runtime a pipeline spawns onto, plus how it runs batch work.
#[derive(Debug, Clone)]
pub struct Executor {
    handle: Handle,
    mode: ExecutionMode,
}

impl Executor {
    /// The runtime the caller is running on.
    ///
    /// # Errors
    /// [`ProcessorError::InvalidConfiguration`] outside a Tokio runtime.
    pub fn current() -> Result<Self, ProcessorError> {
        Handle::try_current().map(Self::from_handle).map_err(|e| {
            ProcessorError::InvalidConfiguration {
                message: e.to_string().into(),
                context: Some("Executor::current".into()),
            }
        })
    }

    /// The lazily built process-wide runtime.
    #[must_use]
    pub fn global() -> Self {
        Self::from_handle(conveyor_runtime::global_runtime().handle().clone())
    }

    /// [`Executor::current`], falling back to [`Executor::global`].
    #[must_use]
    pub fn ambient() -> Self {
        Self::current().unwrap_or_else(|_| Self::global())
    }

    #[must_use]
    pub const fn from_handle(handle: Handle) -> Self {
        Self { handle, mode: ExecutionMode::Parallel }
    }

    /// Runs batch work inline on the batch worker task.
    #[must_use]
    pub const fn caller_runs(handle: Handle) -> Self {
        Self { handle, mode: ExecutionMode::CallerRuns }
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Runs one job, catching its panic.
    pub(crate) async fn run_blocking<F, R>(&self, job: F) -> Result<R, ProcessorError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        match self.mode {
            ExecutionMode::Parallel => {
                self.handle.spawn_blocking(job).await.map_err(ProcessorError::from_join)
            },
            ExecutionMode::CallerRuns => run_inline(job),
        }
    }

    /// Runs every job and returns their results in input order.
    ///
    /// In parallel mode all jobs are submitted before the first one is awaited.
    pub(crate) async fn run_all<F, R>(&self, jobs: Vec<F>) -> Vec<Result<R, ProcessorError>>
    where
        F: FnOnce() -> Result<R, ProcessorError> + Send + 'static,
        R: Send + 'static,
    {
        match self.mode {
            ExecutionMode::Parallel => {
                let handles: Vec<_> =
                    jobs.into_iter().map(|job| self.handle.spawn_blocking(job)).collect();
                let mut results = Vec::with_capacity(handles.len());
                for handle in handles {
                    results.push(handle.await.map_err(ProcessorError::from_join).and_then(|r| r));
                }
                results
            },
            ExecutionMode::CallerRuns => {
                jobs.into_iter().map(|job| run_inline(job).and_then(|r| r)).collect()
            },
        }
    }
}

pub(crate) fn run_inline<F, R>(job: F) -> Result<R, ProcessorError>
where
    F: FnOnce() -> R,
{
    catch_unwind(AssertUnwindSafe(job)).map_err(|payload| ProcessorError::panicked(payload.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[tokio::test]
    async fn test_current_inside_runtime() {
        let executor = Executor::current().unwrap();
        assert_eq!(executor.mode(), ExecutionMode::Parallel);
    }

    #[test]
    fn test_current_outside_runtime() {
        let err = Executor::current().unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_ambient_falls_back_to_global() {
        let executor = Executor::ambient();
        let value = executor.handle().block_on(async { 7 });
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_all_keeps_order() {
        let executor = Executor::current().unwrap();
        let jobs: Vec<_> = (0..8_u64)
            .map(|i| {
                move || {
                    thread::sleep(std::time::Duration::from_millis(8 - i));
                    Ok(i)
                }
            })
            .collect();
        let results: Vec<u64> = executor.run_all(jobs).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_caller_runs_stays_on_thread() {
        let executor = Executor::caller_runs(Handle::current());
        let caller = thread::current().id();
        let seen = executor.run_blocking(move || thread::current().id()).await.unwrap();
        assert_eq!(seen, caller);
    }

    #[tokio::test]
    async fn test_panics_are_reported() {
        for executor in [Executor::current().unwrap(), Executor::caller_runs(Handle::current())] {
            let err = executor.run_blocking(|| -> u8 { panic!("boom") }).await.unwrap_err();
            assert!(matches!(err, ProcessorError::Panicked { ref message, .. } if message == "boom"));
        }
    }
}
