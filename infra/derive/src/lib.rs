#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros shared by the conveyor workspace.
//!
//! * [`conveyor_error`] turns an enum into a `thiserror` error with context support.
//! * [`main`] boots an `async fn main` on one of the `conveyor-runtime` profiles.
//!
//! Examples are `ignore`d here because a proc-macro crate cannot use its own macros;
//! see the consuming crates and `tests/ui` for compiled usage.

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, ItemFn, parse_macro_input};

/// Attribute macro to run `async fn main` on a pre-configured Tokio runtime.
///
/// # Arguments
///
/// * `throughput` - Wide blocking pool, suited to CPU-heavy parallel batch maps.
/// * `compact` - Half the workers and a small blocking pool.
/// * `default` (or no argument) - [`RuntimeConfig::default`](https://docs.rs/conveyor-runtime).
///
/// The function must be `async` and return a `Result` whose error type accepts
/// `anyhow::Error` through `?`.
///
/// # Examples
///
/// ```rust,ignore
/// #[conveyor_runtime::main(throughput)]
/// async fn main() -> anyhow::Result<()> {
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    macros::runtime::expand_main(args.into(), input).into()
}

/// Attribute macro for declaring an error enum with context support.
///
/// # Generated Items
///
/// * `#[derive(Debug, thiserror::Error)]` unless the enum already derives them.
/// * `<ErrorName>Ext` trait with `.context(...)` on `Result<T, ErrorName>` and on
///   `Result<T, Source>` for every variant holding a source.
/// * `From<Source>` for every variant holding a source.
/// * `From<&'static str>` and `From<String>` when an `Internal { message, context }`
///   variant is present.
/// * A private `format_context` helper to be used inside `#[error(...)]` strings.
///   Declare at most one such enum per module.
///
/// # Requirements
///
/// 1. Only enums with named-field variants are accepted.
/// 2. A variant with a `source` field (or a field marked `#[source]`/`#[from]`) must
///    also carry `context: Option<Cow<'static, str>>`.
/// 3. Two variants may not share the same source type, since each gets a `From` impl.
///
/// # Example
///
/// ```rust,ignore
/// use std::borrow::Cow;
///
/// #[conveyor_derive::conveyor_error]
/// pub enum QueueError {
///     #[error("I/O failure{}: {source}", format_context(.context))]
///     Io { source: std::io::Error, context: Option<Cow<'static, str>> },
///
///     #[error("Internal fault{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn read() -> Result<Vec<u8>, QueueError> {
///     std::fs::read("queue.bin").context("Reading queue snapshot")
/// }
/// ```
#[proc_macro_attribute]
pub fn conveyor_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand(input).into()
}
