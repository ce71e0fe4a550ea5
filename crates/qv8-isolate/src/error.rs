//! Error types for qv8-isolate
//!
//! Re-exports core errors from qv8-core and adds isolate-specific errors.

use thiserror::Error;

// Re-export core error types
pub use qv8_core::{CoreError, CoreResult};

/// Errors that can occur during isolate operations
#[derive(Error, Debug)]
pub enum IsolateError {
    /// Core engine error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Script raised an exception; the value sits in the isolate's error channel
    #[error("Uncaught exception")]
    Exception,

    /// The embedder broke an API contract
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// A `Local` whose scope was already popped
    #[error("Handle refers to a value whose scope was already closed")]
    StaleHandle,

    /// Failed to create an engine runtime or realm
    #[error("Context creation failed: {message}")]
    ContextCreation { message: String },

    /// Reported through the fatal error callback
    #[error("Fatal error in {location}: {message}")]
    Fatal { location: String, message: String },
}

/// API contract violations
///
/// These are reported as errors and leave the isolate untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("no handle scope is active")]
    NoActiveHandleScope,

    #[error("cannot create handles inside a sealed handle scope")]
    SealedHandleScope,

    #[error("handle scope mismatch: expected {expected}, found {found}")]
    HandleScopeMismatch { expected: u64, found: u64 },

    #[error("escape requires an enclosing handle scope")]
    EscapeFromOutermostScope,

    #[error("cannot pop the outermost context")]
    PopOutermostContext,

    #[error("UTF-16 buffer is already tracked")]
    Utf16StringAlreadyTracked,

    #[error("value is not a function")]
    NotAFunction,

    #[error("value is not an object")]
    NotAnObject,

    #[error("eternal index {index} out of range (count {count})")]
    EternalIndexOutOfRange { index: usize, count: usize },

    #[error("unknown context {0}")]
    UnknownContext(usize),

    #[error("try-catch scopes must be closed in reverse order")]
    TryCatchMismatch,
}

impl IsolateError {
    /// Create a context creation error
    pub fn context_creation(message: impl Into<String>) -> Self {
        Self::ContextCreation {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Core(CoreError::internal(message))
    }

    /// True when the engine has a thrown value pending on the context
    pub(crate) fn is_pending_exception(&self) -> bool {
        matches!(self, Self::Core(err) if err.is_exception())
    }

    /// True for errors raised by script, whether still pending or already
    /// moved into the error channel
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception) || self.is_pending_exception()
    }

    /// The contract violation, if this is one
    pub fn usage(&self) -> Option<&UsageError> {
        match self {
            Self::Usage(usage) => Some(usage),
            _ => None,
        }
    }
}

impl From<rquickjs::Error> for IsolateError {
    fn from(e: rquickjs::Error) -> Self {
        Self::Core(CoreError::Engine(e))
    }
}

impl From<serde_json::Error> for IsolateError {
    fn from(e: serde_json::Error) -> Self {
        Self::Core(CoreError::Json(e))
    }
}

/// Result type alias for isolate operations
pub type IsolateResult<T> = Result<T, IsolateError>;
