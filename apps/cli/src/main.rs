use anyhow::{Context, bail};
use clap::Parser;
use conveyor_cli::{Cli, LogSettings, load_config, run};
use conveyor_logger::{LevelFilter, Logger};
use std::io::{self, BufRead};

#[conveyor_runtime::main(throughput)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        load_config(cli.config.as_deref()).context("Critical: Configuration is malformed")?;
    cli.apply(&mut config);

    let _logger = init_logger(&config.log)?;

    let inputs = if cli.values.is_empty() { read_stdin().await? } else { cli.values };
    let summary = run(&config, inputs, &mut io::stdout().lock()).await?;

    if summary.failed > 0 {
        bail!("{} of {} values failed", summary.failed, summary.processed);
    }
    Ok(())
}

fn init_logger(settings: &LogSettings) -> anyhow::Result<Logger> {
    let level: LevelFilter = settings
        .level
        .parse()
        .with_context(|| format!("Invalid log level '{}'", settings.level))?;

    let mut builder = Logger::builder()
        .name(env!("CARGO_BIN_NAME"))
        .level(level)
        .console_format(settings.format);
    if let Some(filter) = &settings.filter {
        builder = builder.env_filter(filter.clone());
    }

    let logger = match &settings.dir {
        Some(dir) => builder.path(dir).json().init()?,
        None => builder.init()?,
    };
    Ok(logger)
}

async fn read_stdin() -> anyhow::Result<Vec<String>> {
    tokio::task::spawn_blocking(|| {
        io::stdin()
            .lock()
            .lines()
            .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .collect::<io::Result<Vec<_>>>()
    })
    .await?
    .context("Failed to read values from stdin")
}
