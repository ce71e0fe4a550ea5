//! Owning value wrappers over QuickJS.
//!
//! This crate provides RAII wrappers around engine values that can be
//! stored outside a single `Context::with` call, plus the small pieces of
//! string conversion and compiled helper functions the isolate layer in
//! `qv8-isolate` is built from.
//!
//! # Example
//!
//! ```
//! use qv8_core::{HandleCounters, HandleKind, JsHandle};
//! use qv8_core::rquickjs::{Context, Runtime, Value};
//!
//! let runtime = Runtime::new().unwrap();
//! let context = Context::full(&runtime).unwrap();
//! let counters = HandleCounters::new();
//!
//! let handle = context.with(|ctx| {
//!     let value: Value = ctx.eval("1 + 1").unwrap();
//!     JsHandle::new(&ctx, value, HandleKind::Ordinary, &counters)
//! });
//! assert_eq!(counters.live(), 1);
//! drop(handle);
//! assert_eq!(counters.live(), 0);
//! ```
//!
//! # Thread Safety
//!
//! [`JsHandle`] and [`Polyfill`] are `!Send` and `!Sync`. An engine runtime
//! is driven by one thread at a time; cross-thread access goes through the
//! isolate lock in `qv8-isolate`.
//!
//! ```compile_fail
//! use qv8_core::{HandleCounters, HandleKind, JsHandle};
//! use qv8_core::rquickjs::{Context, Runtime, Value};
//!
//! let runtime = Runtime::new().unwrap();
//! let context = Context::full(&runtime).unwrap();
//! let counters = HandleCounters::new();
//! let handle = context.with(|ctx| {
//!     JsHandle::new(&ctx, Value::new_null(ctx.clone()), HandleKind::Ordinary, &counters)
//! });
//! std::thread::spawn(move || {
//!     let _ = handle.kind(); // Error: JsHandle is !Send
//! });
//! ```

mod error;
mod handle;
pub mod polyfill;
pub mod string;

pub use error::{CoreError, CoreResult};
pub use handle::{HandleCounters, HandleKind, JsHandle, describe_error};
pub use polyfill::Polyfill;
pub use string::{display_string, new_string, new_string_utf16, to_rust_string, utf16_to_string};

// Re-export the engine binding for callers that enter contexts directly
pub use rquickjs;
