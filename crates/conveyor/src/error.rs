use std::any::Any;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::task::JoinError;

/// Boxed error accepted from fallible user stages.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors reported by a pipeline.
///
/// The enum is `Clone` because a single whole-batch failure is delivered to every
/// submitter of that batch.
#[conveyor_derive::conveyor_error]
#[derive(Clone)]
pub enum ProcessorError {
    /// Rejected builder input: empty batched block, zero batch size, zero timeout.
    #[error("Invalid pipeline configuration{}: {message}", format_context(.context))]
    InvalidConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The batch queue was shut down before the value could be enqueued.
    #[error("Batch queue closed{}: {message}", format_context(.context))]
    Closed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A fallible user stage returned an error.
    #[error("Stage failed{}: {source}", format_context(.context))]
    Stage {
        source: Arc<dyn std::error::Error + Send + Sync>,
        context: Option<Cow<'static, str>>,
    },

    /// A user stage panicked. The payload message is preserved when it is a string.
    #[error("Stage panicked{}: {message}", format_context(.context))]
    Panicked { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The task computing the value was aborted or its worker went away.
    #[error("Processing cancelled{}: {message}", format_context(.context))]
    Cancelled { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A whole-batch stage returned a different number of values than it received.
    #[error("Batch size mismatch{}: {message}", format_context(.context))]
    BatchSizeMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A type-erased batch value did not have the expected type.
    /// This indicates a bug in the builder wiring rather than in user code.
    #[error("Type mismatch{}: {message}", format_context(.context))]
    TypeMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal processor error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl ProcessorError {
    /// Wraps a user error as [`ProcessorError::Stage`].
    pub fn stage(err: impl Into<BoxError>) -> Self {
        Self::Stage { source: Arc::from(err.into()), context: None }
    }

    pub(crate) fn panicked(payload: &(dyn Any + Send)) -> Self {
        Self::Panicked { message: panic_message(payload).into(), context: None }
    }

    pub(crate) fn from_join(err: JoinError) -> Self {
        if err.is_panic() {
            Self::panicked(err.into_panic().as_ref())
        } else {
            Self::Cancelled { message: err.to_string().into(), context: None }
        }
    }

    /// `true` for errors raised because the pipeline is shutting down.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_keeps_message() {
        let err = ProcessorError::stage("ascii-example");
        assert!(matches!(err, ProcessorError::Stage { .. }));
        assert_eq!(err.to_string(), "Stage failed: ascii-example");
    }

    #[test]
    fn test_clone_shares_source() {
        let err = ProcessorError::stage(std::io::Error::other("disk"));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }

    #[test]
    fn test_context_is_rendered() {
        let result: Result<(), ProcessorError> =
            Err(ProcessorError::Closed { message: "queue 3".into(), context: None });
        let err = result.context("during shutdown").unwrap_err();
        assert_eq!(err.to_string(), "Batch queue closed (during shutdown): queue 3");
        assert!(err.is_closed());
    }

    #[test]
    fn test_panic_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
