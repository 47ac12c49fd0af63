//! # Conveyor
//!
//! Typed object-processing pipelines. A pipeline is a chain of per-value stages,
//! optionally interrupted by *batched blocks*: a batched block gathers values coming
//! from many concurrent submitters into batches bounded by size and time, runs its
//! stages over each batch, and hands every submitter its own answer.
//!
//! * [`ObjectProcessor::builder`] starts a pipeline; `map`/`try_map` add stages.
//! * [`ProcessorBuilder::batched`] opens a block and
//!   [`BatchedProcessorBuilder::sequential`] closes it.
//! * [`ObjectProcessor::apply`] submits a value and returns a [`ProcessingHandle`].
//! * [`ObjectProcessor::shutdown`] flushes every queue and stops its worker.
//!
//! Exactly one answer is produced per submitted value. Within a batch, per-element
//! failures stay with their element while whole-batch failures reach every element.
//!
//! ## Example
//!
//! ```rust
//! use conveyor::{ObjectProcessor, ProcessorError};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ProcessorError> {
//!     let processor = ObjectProcessor::builder()
//!         .map(|word: String| word.len())
//!         .batched(2, Duration::from_millis(50))
//!         .map(|len| format!("{len:b}"))
//!         .sequential()?
//!         .build();
//!
//!     let (one, three) =
//!         tokio::join!(processor.apply("a".to_owned()), processor.apply("abc".to_owned()));
//!     assert_eq!(one?, "1");
//!     assert_eq!(three?, "11");
//!
//!     processor.shutdown().await;
//!     Ok(())
//! }
//! ```

mod batch;
mod builder;
mod error;
mod executor;
mod processor;
mod settings;
mod stage;

pub use crate::builder::{BatchedProcessorBuilder, ProcessorBuilder};
pub use crate::error::{BoxError, ProcessorError, ProcessorErrorExt};
pub use crate::executor::{ExecutionMode, Executor};
pub use crate::processor::{ObjectProcessor, ProcessingHandle};
pub use crate::settings::{BatchSettings, MAX_QUEUE_CAPACITY};
