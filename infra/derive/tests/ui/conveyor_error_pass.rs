use conveyor_derive::conveyor_error;
use std::borrow::Cow;

#[conveyor_error]
pub enum DemoError {
    #[error("IO error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn read() -> Result<Vec<u8>, DemoError> {
    std::fs::read("/definitely/not/here").context("Reading fixture")
}

fn main() {
    let err = read().unwrap_err();
    assert!(err.to_string().contains("(Reading fixture)"));

    let err: DemoError = "boom".into();
    assert!(matches!(err, DemoError::Internal { .. }));

    let err: Result<(), DemoError> = Err(String::from("late").into());
    let err = err.context("while testing").unwrap_err();
    assert_eq!(err.to_string(), "Internal error (while testing): late");
}
