use conveyor_logger::{LevelFilter, LogFormat, Logger};

#[test]
fn init_console_only_has_no_guard() {
    let logger = Logger::builder()
        .name("integration-console-only")
        .console_format(LogFormat::Pretty)
        .level(LevelFilter::INFO)
        .init()
        .expect("logger should initialize");

    tracing::info!(batch = 3, "console line");
    assert!(logger.guard().is_none(), "console-only logger should not create a file guard");
}
