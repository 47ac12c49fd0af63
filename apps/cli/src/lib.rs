//! Library side of the `conveyor` binary: arguments, layered configuration and
//! the demo pipeline.

pub mod args;
pub mod config;

pub use crate::args::Cli;
pub use crate::config::{CliConfig, ConfigError, LogSettings, load_config};

use anyhow::Context;
use conveyor::{ExecutionMode, Executor, ObjectProcessor, ProcessorError};
use serde::Serialize;
use std::io::Write;
use tracing::{info, warn};

/// One printed line of output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub processed: usize,
    pub failed: usize,
}

/// Character count, batched, rendered in binary.
///
/// # Errors
/// [`ProcessorError::InvalidConfiguration`] for invalid batch settings.
pub fn binary_length_pipeline(
    config: &CliConfig,
) -> Result<ObjectProcessor<String, String>, ProcessorError> {
    let mode = if config.caller_runs { ExecutionMode::CallerRuns } else { ExecutionMode::Parallel };
    let executor = Executor::ambient().with_mode(mode);

    Ok(ObjectProcessor::builder_on(executor)
        .map(|value: String| value.chars().count())
        .batched_with(config.batch)
        .map(|len| format!("{len:b}"))
        .sequential()?
        .build())
}

/// Submits every input at once, then writes the answers in input order.
///
/// # Errors
/// Invalid batch settings, or a failure writing to `out`.
pub async fn run<W: Write>(config: &CliConfig, inputs: Vec<String>, out: &mut W) -> anyhow::Result<Summary> {
    let processor = binary_length_pipeline(config).context("Cannot build the pipeline")?;
    info!(values = inputs.len(), batch = ?config.batch, "Processing input");

    let handles: Vec<_> =
        inputs.into_iter().map(|input| (input.clone(), processor.apply(input))).collect();

    let mut summary = Summary::default();
    for (input, handle) in handles {
        let record = match handle.await {
            Ok(output) => Record { input, output: Some(output), error: None },
            Err(e) => {
                warn!(input = %input, error = %e, "Value failed");
                summary.failed += 1;
                Record { input, output: None, error: Some(e.to_string()) }
            },
        };
        summary.processed += 1;
        write_record(out, &record, config.json)?;
    }

    processor.shutdown().await;
    out.flush()?;
    Ok(summary)
}

fn write_record<W: Write>(out: &mut W, record: &Record, json: bool) -> anyhow::Result<()> {
    if json {
        serde_json::to_writer(&mut *out, record)?;
        writeln!(out)?;
    } else {
        match (&record.output, &record.error) {
            (Some(output), _) => writeln!(out, "{} -> {output}", record.input)?,
            (None, Some(error)) => writeln!(out, "{} -> error: {error}", record.input)?,
            (None, None) => writeln!(out, "{} ->", record.input)?,
        }
    }
    Ok(())
}
