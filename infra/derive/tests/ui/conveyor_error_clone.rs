use conveyor_derive::conveyor_error;
use std::borrow::Cow;
use std::sync::Arc;

#[conveyor_error]
#[derive(Clone)]
pub enum SharedError {
    #[error("Stage failed{}: {source}", format_context(.context))]
    Stage {
        source: Arc<dyn std::error::Error + Send + Sync>,
        context: Option<Cow<'static, str>>,
    },

    #[error("Closed{}: {message}", format_context(.context))]
    Closed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn main() {
    let source: Arc<dyn std::error::Error + Send + Sync> =
        Arc::new(std::io::Error::other("disk gone"));
    let err = SharedError::from(source);
    let copy = err.clone();
    assert_eq!(err.to_string(), copy.to_string());

    let closed = SharedError::Closed { message: "queue".into(), context: None };
    assert_eq!(closed.to_string(), "Closed: queue");
}
