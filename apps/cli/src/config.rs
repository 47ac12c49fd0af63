use config::{Config, Environment, File, FileFormat};
use conveyor::BatchSettings;
use conveyor_logger::LogFormat;
use serde::Deserialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Prefix of environment overrides, e.g. `CONVEYOR__BATCH__MAX_SIZE=64`.
pub const ENV_PREFIX: &str = "CONVEYOR";

#[conveyor_derive::conveyor_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// Everything the `conveyor` binary can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub batch: BatchSettings,
    /// Run batch work on the queue worker instead of the blocking pool.
    pub caller_runs: bool,
    /// Emit one JSON object per value instead of `input -> output`.
    pub json: bool,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    /// Filter directives; take precedence over `RUST_LOG`.
    pub filter: Option<String>,
    /// Directory for rolling JSON log files.
    pub dir: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: "warn".to_owned(), format: LogFormat::default(), filter: None, dir: None }
    }
}

/// Loads the configuration in layers: built-in defaults, then the TOML file at
/// `path` when given, then `CONVEYOR__*` environment variables.
///
/// Nested keys use a double underscore: `CONVEYOR__LOG__LEVEL=debug` sets `log.level`.
///
/// # Errors
/// [`ConfigError::Config`] when the file is missing or malformed, or a value has
/// the wrong type or an unknown key.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
        .build()
        .context("Failed to build config")?
        .try_deserialize::<CliConfig>()
        .context("Failed to deserialize config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn toml_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let config = CliConfig::default();
        assert_eq!(config.batch, BatchSettings::default());
        assert_eq!(config.log.level, "warn");
        assert!(!config.caller_runs);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = toml_file(
            r#"
            caller_runs = true

            [batch]
            max_size = 4
            timeout_ms = 30

            [log]
            level = "debug"
            format = "json"
            "#,
        );

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.batch, BatchSettings::new(4, Duration::from_millis(30)));
        assert!(config.caller_runs);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to build config"));
    }

    #[test]
    fn test_unknown_key_is_an_error() {
        let file = toml_file("[batch]\nmax_elements = 4\n");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to deserialize config"));
    }
}
