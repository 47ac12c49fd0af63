use conveyor_logger::{LevelFilter, LogFormat, Logger, LoggerError};

#[test]
fn second_pipeline_logger_is_refused() {
    let _logger = Logger::builder()
        .name("conveyor")
        .console_format(LogFormat::Json)
        .env_filter("conveyor=debug")
        .init()
        .unwrap();

    let err = Logger::builder()
        .name("conveyor-cli")
        .console_format(LogFormat::Pretty)
        .level(LevelFilter::TRACE)
        .init()
        .unwrap_err();

    assert!(matches!(err, LoggerError::Subscriber { context: None, .. }));
    assert!(err.to_string().starts_with("Tracing subscriber error: "));
}
