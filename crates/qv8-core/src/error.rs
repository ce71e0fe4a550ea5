//! Core error types for engine operations
//!
//! Script failures keep the thrown value's type name, message and stack
//! text so embedders can report them without touching the engine again.

use thiserror::Error;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Structured error types for engine operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value thrown by script, already extracted from the engine
    #[error("{error_type}: {message}")]
    ScriptError {
        error_type: String,
        message: String,
        stack: Option<String>,
    },

    /// Raw engine failure
    ///
    /// `rquickjs::Error::Exception` means a value is pending on the
    /// context and must be retrieved with `Ctx::catch`.
    #[error("Engine error: {0}")]
    Engine(#[from] rquickjs::Error),

    /// Type conversion error
    #[error("Type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    /// A bootstrap helper failed to compile
    #[error("Bootstrap of '{name}' failed: {message}")]
    Bootstrap { name: String, message: String },

    /// String encoding error
    #[error("String encoding error: {0}")]
    StringEncoding(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal/unexpected error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Create a script error from error type and message
    pub fn script_error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScriptError {
            error_type: error_type.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Create a type error
    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a bootstrap error
    pub fn bootstrap(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Bootstrap {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True when script threw and the value is still pending on the context
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Engine(rquickjs::Error::Exception))
    }

    /// Check if this is a user-facing script error
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::ScriptError { .. }) || self.is_exception()
    }

    /// Get the stack trace if available
    pub fn stack_trace(&self) -> Option<&str> {
        match self {
            Self::ScriptError { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }

    /// Get the error type name (e.g., "TypeError", "ReferenceError")
    pub fn error_type(&self) -> &str {
        match self {
            Self::ScriptError { error_type, .. } => error_type,
            Self::Engine(_) => "EngineError",
            Self::TypeError { .. } => "TypeError",
            Self::Bootstrap { .. } => "BootstrapError",
            Self::StringEncoding(_) => "EncodingError",
            Self::Json(_) => "JsonError",
            Self::Internal(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        let err = CoreError::script_error("TypeError", "undefined is not a function");
        assert_eq!(err.to_string(), "TypeError: undefined is not a function");
        assert!(err.is_script_error());
        assert_eq!(err.error_type(), "TypeError");
    }

    #[test]
    fn test_pending_exception() {
        let err = CoreError::from(rquickjs::Error::Exception);
        assert!(err.is_exception());
        assert!(err.is_script_error());
        assert!(err.stack_trace().is_none());
    }

    #[test]
    fn test_bootstrap_error() {
        let err = CoreError::bootstrap("map_set", "unexpected token");
        assert_eq!(
            err.to_string(),
            "Bootstrap of 'map_set' failed: unexpected token"
        );
        assert!(!err.is_exception());
    }

    #[test]
    fn test_type_error() {
        let err = CoreError::type_error("function", "object");
        assert!(err.to_string().contains("expected function"));
        assert!(err.to_string().contains("got object"));
    }

    #[test]
    fn test_internal_error() {
        let err = CoreError::internal("something went wrong");
        assert_eq!(err.to_string(), "Internal error: something went wrong");
        assert_eq!(err.error_type(), "InternalError");
    }
}
