use crate::error::ProcessorError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Largest channel a batch queue can be given.
pub const MAX_QUEUE_CAPACITY: usize = Semaphore::MAX_PERMITS;

const DEFAULT_MAX_SIZE: usize = 16;
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Flush policy of a batched block.
///
/// A batch is handed to the block's stages when it holds `max_size` values, or
/// `timeout` after its first value arrived, whichever comes first.
///
/// Deserializes from `{ "max_size": 64, "timeout_ms": 25, "queue_capacity": 256 }`;
/// every field is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSettings {
    pub max_size: usize,
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
    /// Values buffered ahead of the worker before submitters wait.
    /// Defaults to twice `max_size`, capped at [`MAX_QUEUE_CAPACITY`].
    pub queue_capacity: Option<usize>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { max_size: DEFAULT_MAX_SIZE, timeout: DEFAULT_TIMEOUT, queue_capacity: None }
    }
}

impl BatchSettings {
    #[must_use]
    pub const fn new(max_size: usize, timeout: Duration) -> Self {
        Self { max_size, timeout, queue_capacity: None }
    }

    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Effective channel capacity.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| self.max_size.saturating_mul(2).min(MAX_QUEUE_CAPACITY))
            .max(1)
    }

    /// # Errors
    /// [`ProcessorError::InvalidConfiguration`] for a zero size or timeout, and for
    /// a queue capacity of zero or above [`MAX_QUEUE_CAPACITY`].
    pub fn validate(self) -> Result<Self, ProcessorError> {
        if self.max_size == 0 {
            return Err(invalid("max_size must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero"));
        }
        if self.queue_capacity == Some(0) {
            return Err(invalid("queue_capacity must be at least 1"));
        }
        if self.queue_capacity > Some(MAX_QUEUE_CAPACITY) {
            return Err(invalid("queue_capacity is larger than a batch queue can hold"));
        }
        Ok(self)
    }
}

fn invalid(message: &'static str) -> ProcessorError {
    ProcessorError::InvalidConfiguration { message: message.into(), context: Some("batch settings".into()) }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = BatchSettings::default().validate().unwrap();
        assert_eq!(settings.max_size, 16);
        assert_eq!(settings.queue_capacity(), 32);
    }

    #[test]
    fn test_explicit_capacity_wins() {
        let settings = BatchSettings::new(4, Duration::from_secs(1)).with_queue_capacity(1);
        assert_eq!(settings.queue_capacity(), 1);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let err = BatchSettings::new(0, Duration::from_secs(1)).validate().unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidConfiguration { .. }));
        assert!(err.to_string().contains("max_size"));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = BatchSettings::new(2, Duration::ZERO).validate().unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let settings = BatchSettings::new(2, Duration::from_millis(5)).with_queue_capacity(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_oversized_capacity_is_rejected() {
        let settings = BatchSettings::new(2, Duration::from_millis(5)).with_queue_capacity(usize::MAX);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));

        let at_limit = BatchSettings::new(2, Duration::from_millis(5))
            .with_queue_capacity(MAX_QUEUE_CAPACITY);
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_default_capacity_is_capped() {
        let settings = BatchSettings::new(usize::MAX, Duration::from_millis(5)).validate().unwrap();
        assert_eq!(settings.queue_capacity(), MAX_QUEUE_CAPACITY);
    }

    #[test]
    fn test_huge_timeout_is_accepted() {
        assert!(BatchSettings::new(2, Duration::MAX).validate().is_ok());
    }

    #[test]
    fn test_deserialize_millis() {
        let settings: BatchSettings =
            serde_json::from_str(r#"{ "max_size": 64, "timeout_ms": 25 }"#).unwrap();
        assert_eq!(settings, BatchSettings::new(64, Duration::from_millis(25)));

        let partial: BatchSettings = serde_json::from_str(r#"{ "queue_capacity": 8 }"#).unwrap();
        assert_eq!(partial.max_size, 16);
        assert_eq!(partial.queue_capacity(), 8);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<BatchSettings>(r#"{ "timeout": 25 }"#).is_err());
    }

    #[test]
    fn test_serialize_as_millis() {
        let json = serde_json::to_value(BatchSettings::new(2, Duration::from_millis(300))).unwrap();
        assert_eq!(json["timeout_ms"], 300);
    }
}
