//! # Runtime
//!
//! Tokio runtime construction for conveyor pipelines.
//!
//! A pipeline spends its time in two places: async plumbing (queues, timers, waiting
//! for batches) on the worker threads, and user transformations on the blocking pool,
//! where every element of a batched `map` becomes one blocking job. The profiles here
//! size both pools for that split.
//!
//! ## Profiles
//! * **Throughput**: all cores as workers and a wide blocking pool for parallel batch maps.
//! * **Compact**: half the workers and a small blocking pool.
//! * **Global**: a lazily built process runtime for callers outside any async context.
//!
//! ## Example
//!
//! ```rust,ignore
//! #[conveyor_runtime::main(throughput)]
//! async fn main() -> anyhow::Result<()> {
//!     Ok(())
//! }
//! ```

pub use anyhow::Result;
pub use conveyor_derive::main;

use anyhow::anyhow;
use std::{sync::OnceLock, thread::available_parallelism, time::Duration};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

/// Environment variable overriding the detected worker count.
pub const WORKER_THREADS_ENV: &str = "CONVEYOR_WORKER_THREADS";

/// Worker threads used when parallelism detection fails.
const DEFAULT_WORKER_THREADS: usize = 4;
const MAX_WORKER_THREADS: usize = 1024;
/// Tokio's own default for the blocking pool.
const DEFAULT_BLOCKING_THREADS: usize = 512;
const MAX_BLOCKING_THREADS: usize = 4096;
/// 2 `MiB`, Tokio's default stack size.
const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
const MIN_STACK_SIZE: usize = 512 * 1024;
const MAX_STACK_SIZE: usize = 16 * 1024 * 1024;
const DEFAULT_THREAD_NAME: &str = "conveyor-worker";
const THREAD_KEEP_ALIVE: Duration = Duration::from_secs(10);

static WORKER_THREADS: OnceLock<usize> = OnceLock::new();

fn detected_worker_threads() -> usize {
    *WORKER_THREADS.get_or_init(|| {
        parse_worker_threads(std::env::var(WORKER_THREADS_ENV).ok().as_deref()).unwrap_or_else(
            || {
                available_parallelism()
                    .map(std::num::NonZero::get)
                    .unwrap_or(DEFAULT_WORKER_THREADS)
            },
        )
    })
}

fn parse_worker_threads(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| (1..=MAX_WORKER_THREADS).contains(&n))
}

fn thread_name_or_default(name: String) -> String {
    if name.trim().is_empty() { DEFAULT_THREAD_NAME.to_owned() } else { name }
}

/// Configuration for a Tokio runtime hosting conveyor pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub worker_threads: usize,
    /// Upper bound for the blocking pool that runs batched element jobs.
    pub max_blocking_threads: usize,
    pub stack_size: usize,
    pub thread_name: String,
    pub thread_keep_alive: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: detected_worker_threads(),
            max_blocking_threads: DEFAULT_BLOCKING_THREADS,
            stack_size: DEFAULT_STACK_SIZE,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            thread_keep_alive: THREAD_KEEP_ALIVE,
        }
    }
}

impl RuntimeConfig {
    /// Preset for CPU-heavy pipelines with wide batches.
    #[must_use = "Use this configuration for throughput-oriented pipelines"]
    pub fn throughput() -> Self {
        let workers = detected_worker_threads();
        Self {
            worker_threads: workers,
            max_blocking_threads: (workers * 64).clamp(64, MAX_BLOCKING_THREADS),
            stack_size: 4 * 1024 * 1024,
            thread_name: "conveyor-tp".to_owned(),
            thread_keep_alive: Duration::from_secs(60),
        }
    }

    /// Preset for embedding a pipeline in a small process.
    #[must_use = "Use this configuration for low-footprint pipelines"]
    pub fn compact() -> Self {
        let workers = (detected_worker_threads() / 2).max(1);
        Self {
            worker_threads: workers,
            max_blocking_threads: (workers * 4).max(2),
            stack_size: 1024 * 1024,
            thread_name: "conveyor-cmp".to_owned(),
            thread_keep_alive: Duration::from_secs(5),
        }
    }

    #[must_use = "Customize the number of worker threads for the runtime"]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.clamp(1, MAX_WORKER_THREADS);
        self
    }

    #[must_use = "Customize the blocking pool used by parallel batch maps"]
    pub fn with_max_blocking_threads(mut self, threads: usize) -> Self {
        self.max_blocking_threads = threads.clamp(1, MAX_BLOCKING_THREADS);
        self
    }

    #[must_use = "Customize the stack size for runtime threads"]
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size.clamp(MIN_STACK_SIZE, MAX_STACK_SIZE);
        self
    }

    #[must_use = "Customize the thread name"]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = thread_name_or_default(name.into());
        self
    }

    #[must_use = "Customize how long idle blocking threads stay alive"]
    pub const fn with_thread_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.thread_keep_alive = keep_alive;
        self
    }

    fn normalized(&self) -> Self {
        Self {
            worker_threads: self.worker_threads.clamp(1, MAX_WORKER_THREADS),
            max_blocking_threads: self.max_blocking_threads.clamp(1, MAX_BLOCKING_THREADS),
            stack_size: self.stack_size.clamp(MIN_STACK_SIZE, MAX_STACK_SIZE),
            thread_name: thread_name_or_default(self.thread_name.clone()),
            thread_keep_alive: self.thread_keep_alive,
        }
    }
}

/// Builds a multi-threaded runtime from `config`.
///
/// Out-of-range values are clamped rather than rejected, so this only fails when
/// the OS refuses to create the runtime.
///
/// # Errors
///
/// Returns an [`anyhow::Error`] if Tokio cannot start the runtime.
///
/// # Examples
///
/// ```rust
/// use conveyor_runtime::{RuntimeConfig, build_runtime_with_config};
///
/// let config = RuntimeConfig::compact().with_worker_threads(2);
/// let runtime = build_runtime_with_config(&config)?;
/// let answer = runtime.block_on(async { 40 + 2 });
/// assert_eq!(answer, 42);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn build_runtime_with_config(config: &RuntimeConfig) -> Result<Runtime> {
    let config = config.normalized();
    debug!(config = ?config, "Building tokio runtime");

    let mut builder = Builder::new_multi_thread();
    builder
        .worker_threads(config.worker_threads)
        .max_blocking_threads(config.max_blocking_threads)
        .thread_name(&config.thread_name)
        .thread_stack_size(config.stack_size)
        .thread_keep_alive(config.thread_keep_alive)
        .enable_all();

    builder.build().map_err(|e| anyhow!("Failed to initialize runtime: {e}"))
}

/// Builds a runtime with [`RuntimeConfig::default`].
///
/// # Errors
///
/// Returns an [`anyhow::Error`] if Tokio cannot start the runtime.
pub fn build_default_runtime() -> Result<Runtime> {
    let config = RuntimeConfig::default();
    info!(
        threads = config.worker_threads,
        blocking = config.max_blocking_threads,
        "Initializing pipeline runtime"
    );
    build_runtime_with_config(&config)
}

static GLOBAL_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The lazily built process runtime.
///
/// Pipelines built outside an async context land here.
///
/// # Panics
///
/// Panics if the runtime cannot be created on first use.
pub fn global_runtime() -> &'static Runtime {
    GLOBAL_RUNTIME.get_or_init(|| {
        build_default_runtime().expect("CRITICAL: Failed to initialize the global pipeline runtime")
    })
}
