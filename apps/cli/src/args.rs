//! # CLI Argument Definitions

use crate::config::CliConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "conveyor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pushes values through a batched pipeline: length, then binary")]
pub struct Cli {
    /// Values to process. Read from stdin, one per line, when omitted.
    pub values: Vec<String>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Flush a batch once it holds this many values
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Flush a partial batch this long after its first value
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Values buffered ahead of the batch worker
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Run batch work on the queue worker instead of the blocking pool
    #[arg(long)]
    pub caller_runs: bool,

    /// Console log level (off, error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print one JSON object per value
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Applies the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut CliConfig) {
        if let Some(size) = self.batch_size {
            config.batch.max_size = size;
        }
        if let Some(ms) = self.timeout_ms {
            config.batch.timeout = Duration::from_millis(ms);
        }
        if let Some(capacity) = self.queue_capacity {
            config.batch.queue_capacity = Some(capacity);
        }
        if let Some(level) = &self.log_level {
            config.log.level.clone_from(level);
        }
        config.caller_runs |= self.caller_runs;
        config.json |= self.json;
    }
}
