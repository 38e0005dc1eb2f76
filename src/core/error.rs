//! Error types for capability composition and dispatch.

use thiserror::Error;

/// Errors raised while composing capabilities or dispatching through them.
///
/// Both composition and dispatch fail synchronously at the call site; nothing
/// is retried and a failed composition installs nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SandboxError {
    /// A name that is neither exposed nor resolvable as field access.
    #[error("undefined method `{method}` for {receiver}")]
    UndeclaredMethod { receiver: String, method: String },

    /// The exposure list or the module declaration was rejected.
    #[error("composition failed: {0}")]
    Composition(String),

    /// A built-in delegate operation was called with the wrong arguments.
    #[error("wrong arguments for `{method}`: {message}")]
    InvalidArguments { method: String, message: String },

    /// The host a delegate was attached to has been dropped.
    #[error("capability {module} is detached from its host")]
    Detached { module: String },

    /// A delegate was invoked while one of its own methods was still running.
    #[error("capability {module} re-entered while already running")]
    Reentrant { module: String },
}

impl SandboxError {
    pub fn undeclared(receiver: impl Into<String>, method: impl Into<String>) -> Self {
        SandboxError::UndeclaredMethod {
            receiver: receiver.into(),
            method: method.into(),
        }
    }

    pub fn is_undeclared_method(&self) -> bool {
        matches!(self, SandboxError::UndeclaredMethod { .. })
    }

    pub fn is_composition(&self) -> bool {
        matches!(self, SandboxError::Composition(_))
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
