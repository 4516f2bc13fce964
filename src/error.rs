//! Error handling for the monitor-point core
//!
//! This module defines the error taxonomy and a Result alias used
//! throughout the crate. Every failure is local and synchronous: nothing
//! here retries, the hosting runtime decides what to do with an error.

use thiserror::Error;

/// Main error type for monitor-point operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// A required argument was absent or malformed (mode, payload, id, props)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A transfer stage operation was invoked in the wrong lifecycle state
    #[error("Lifecycle violation in stage '{stage}': cannot {operation} while {state}")]
    LifecycleViolation {
        stage: String,
        state: String,
        operation: &'static str,
    },

    /// A transfer function could not produce a valid output
    #[error("Evaluation error in stage '{stage}': {message}")]
    Evaluation { stage: String, message: String },

    /// Errors related to Rhai script compilation
    #[error("Script error: {0}")]
    Script(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CoreError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for an [`CoreError::InvalidArgument`]
    pub fn invalid(message: impl Into<String>) -> Self {
        CoreError::InvalidArgument(message.into())
    }

    /// Shorthand for an [`CoreError::Evaluation`] raised by `stage`
    pub fn evaluation(stage: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Evaluation {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        CoreError::Script(err.to_string())
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &CoreError {
        match self {
            CoreError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.root(), CoreError::InvalidArgument(_))
    }

    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(self.root(), CoreError::LifecycleViolation { .. })
    }

    pub fn is_evaluation(&self) -> bool {
        matches!(self.root(), CoreError::Evaluation { .. })
    }
}

/// Result type alias for monitor-point operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CoreError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| CoreError::from_rhai_error(e).with_context(f()))
    }
}
