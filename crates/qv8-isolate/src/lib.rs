//! qv8-isolate - V8-style isolates on top of QuickJS.
//!
//! This crate emulates the lifecycle part of V8's embedding API: isolates,
//! contexts, handle scopes, eternal and persistent handles, try-catch
//! propagation and the microtask queue. Values live in the QuickJS heap;
//! the isolate decides when each engine reference is released.
//!
//! # Example
//!
//! ```
//! use qv8_isolate::{HandleScope, Isolate};
//!
//! let mut isolate = Isolate::with_defaults().unwrap();
//! let mut scope = HandleScope::new(&mut isolate);
//!
//! let result = scope.run_script("1 + 1").unwrap();
//! assert_eq!(scope.to_number(result).unwrap(), 2.0);
//! assert!(!scope.has_error());
//! ```
//!
//! # Ownership
//!
//! ```text
//! Isolate
//!  ├─ handle scope stack ── Local ──> wrapper (released on scope pop)
//!  ├─ eternals / persistents / symbols (released at dispose)
//!  ├─ root slot table ──> undefined, null, true, false, "" wrappers
//!  ├─ error channel + innermost try-catch
//!  ├─ microtask queue
//!  └─ engine runtime (dropped last)
//! ```
//!
//! # Thread Safety
//!
//! An [`Isolate`] stays on the thread that created it. Embedders that share
//! one between cooperating callers use [`Isolate::lock`].
//!
//! ```compile_fail
//! use qv8_isolate::Isolate;
//!
//! let isolate = Isolate::with_defaults().unwrap();
//! std::thread::spawn(move || {
//!     let _ = isolate.id(); // Error: Isolate is !Send
//! });
//! ```

mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod exception;
pub mod handle_scope;
pub mod isolate;
pub mod local;
pub mod memory;
pub mod microtask;
pub mod object;
pub mod port;
pub mod roots;
pub mod store;
pub mod template;
pub mod value;

pub use config::{DEFAULT_EXTERNAL_MEMORY_LIMIT, IsolateConfig};
pub use context::{ContextId, ContextScope};
pub use error::{CoreError, CoreResult, IsolateError, IsolateResult, UsageError};
pub use exception::{Message, TERMINATION_MESSAGE, TryCatch, TryCatchToken};
pub use handle_scope::{
    EscapableHandleScope, HandleScope, HandleScopeInfo, HandleScopeKind, ScopeToken,
    SealHandleScope,
};
pub use isolate::{
    CreateParams, FatalErrorCallback, Isolate, IsolateId, MessageCallback, TerminationHandle,
};
pub use local::Local;
pub use memory::HeapStatistics;
pub use microtask::MicrotaskStats;
pub use object::IntegrityLevel;
pub use port::{DefaultPort, LogLevel, Port, log_level, set_log_level};
pub use roots::{RootIndex, RootSlotTable};
pub use store::Global;
pub use template::{FunctionTemplate, ObjectTemplate, Template};

// Re-export the value layer
pub use qv8_core;
