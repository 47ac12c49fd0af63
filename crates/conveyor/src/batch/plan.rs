//! Type-erased stages of a batched block.
//!
//! Values inside a block are boxed as [`AnyValue`] so a single queue can run a chain
//! of differently typed stages; they are downcast back at the block's exit.

use crate::error::ProcessorError;
use crate::executor::Executor;
use std::any::{Any, type_name};
use std::sync::Arc;

pub(crate) type AnyValue = Box<dyn Any + Send>;
pub(crate) type Slot = Result<AnyValue, ProcessorError>;

type ElementFn = Arc<dyn Fn(AnyValue) -> Result<AnyValue, ProcessorError> + Send + Sync>;
type ListFn = Arc<dyn Fn(Vec<AnyValue>) -> Result<Vec<AnyValue>, ProcessorError> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum BatchStep {
    /// Runs on every element independently.
    Map(ElementFn),
    /// Sees the whole batch and must answer with one value per input.
    FlatMap(ListFn),
}

impl BatchStep {
    pub(crate) fn map<R, S, F>(f: F) -> Self
    where
        R: 'static,
        S: Send + 'static,
        F: Fn(R) -> Result<S, ProcessorError> + Send + Sync + 'static,
    {
        Self::Map(Arc::new(move |value| f(downcast::<R>(value)?).map(erase)))
    }

    pub(crate) fn flat_map<R, S, F>(f: F) -> Self
    where
        R: 'static,
        S: Send + 'static,
        F: Fn(Vec<R>) -> Result<Vec<S>, ProcessorError> + Send + Sync + 'static,
    {
        Self::FlatMap(Arc::new(move |values| {
            let typed = values.into_iter().map(downcast::<R>).collect::<Result<Vec<_>, _>>()?;
            Ok(f(typed)?.into_iter().map(erase).collect())
        }))
    }
}

fn erase<S: Send + 'static>(value: S) -> AnyValue {
    Box::new(value)
}

pub(crate) fn downcast<R: 'static>(value: AnyValue) -> Result<R, ProcessorError> {
    value.downcast::<R>().map(|boxed| *boxed).map_err(|_| ProcessorError::TypeMismatch {
        message: format!("expected {}", type_name::<R>()).into(),
        context: Some("batched block".into()),
    })
}

/// The fused stage list a batch queue executes.
pub(crate) struct BatchPlan {
    steps: Vec<BatchStep>,
}

impl BatchPlan {
    /// Fuses runs of consecutive element maps into one step so each element
    /// crosses the executor once per run.
    ///
    /// # Errors
    /// [`ProcessorError::InvalidConfiguration`] when the block has no stages.
    pub(crate) fn fuse(steps: Vec<BatchStep>) -> Result<Self, ProcessorError> {
        if steps.is_empty() {
            return Err(ProcessorError::InvalidConfiguration {
                message: "a batched block needs at least one map or flat_map".into(),
                context: Some("sequential".into()),
            });
        }

        let mut fused: Vec<BatchStep> = Vec::with_capacity(steps.len());
        for step in steps {
            match (fused.pop(), step) {
                (Some(BatchStep::Map(first)), BatchStep::Map(second)) => {
                    fused.push(BatchStep::Map(Arc::new(move |value| second(first(value)?))));
                },
                (previous, step) => {
                    fused.extend(previous);
                    fused.push(step);
                },
            }
        }
        Ok(Self { steps: fused })
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    /// Runs every step over the batch. The result has one slot per input, in
    /// input order; an element that failed keeps its error and skips later steps.
    pub(crate) async fn run(&self, values: Vec<AnyValue>, executor: &Executor) -> Vec<Slot> {
        let mut slots: Vec<Slot> = values.into_iter().map(Ok).collect();
        for step in &self.steps {
            slots = match step {
                BatchStep::Map(f) => run_map(f, slots, executor).await,
                BatchStep::FlatMap(f) => run_flat_map(f, slots, executor).await,
            };
        }
        slots
    }
}

/// Splits live values from already failed slots, remembering their positions.
fn split(slots: Vec<Slot>) -> (Vec<Slot>, Vec<usize>, Vec<AnyValue>) {
    let mut out = Vec::with_capacity(slots.len());
    let mut positions = Vec::new();
    let mut values = Vec::new();
    for (index, slot) in slots.into_iter().enumerate() {
        match slot {
            Ok(value) => {
                positions.push(index);
                values.push(value);
                out.push(Err(ProcessorError::Internal {
                    message: "slot not filled".into(),
                    context: None,
                }));
            },
            Err(err) => out.push(Err(err)),
        }
    }
    (out, positions, values)
}

async fn run_map(f: &ElementFn, slots: Vec<Slot>, executor: &Executor) -> Vec<Slot> {
    let (mut out, positions, values) = split(slots);
    let jobs: Vec<_> = values
        .into_iter()
        .map(|value| {
            let f = Arc::clone(f);
            move || f(value)
        })
        .collect();

    for (index, result) in positions.into_iter().zip(executor.run_all(jobs).await) {
        out[index] = result;
    }
    out
}

async fn run_flat_map(f: &ListFn, slots: Vec<Slot>, executor: &Executor) -> Vec<Slot> {
    let (mut out, positions, values) = split(slots);
    if values.is_empty() {
        return out;
    }

    let expected = values.len();
    let f = Arc::clone(f);
    let result = executor.run_blocking(move || f(values)).await.and_then(|r| r);

    match result {
        Ok(outputs) if outputs.len() == expected => {
            for (index, value) in positions.into_iter().zip(outputs) {
                out[index] = Ok(value);
            }
        },
        Ok(outputs) => {
            let err = ProcessorError::BatchSizeMismatch {
                message: format!("flat_map returned {} values for {expected} inputs", outputs.len())
                    .into(),
                context: None,
            };
            for index in positions {
                out[index] = Err(err.clone());
            }
        },
        Err(err) => {
            for index in positions {
                out[index] = Err(err.clone());
            }
        },
    }
    out
}
