//! Unified error handling for cordial.
//!
//! One hierarchy for everything the pipeline can report: build-time command
//! validation, argument conversion, check failures, structural
//! non-executability and handler errors, with stable code labels for logging.

use crate::command::attributes::CheckAttribute;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Build errors (command registration)
// ============================================================================

/// Errors raised while building a single command.
///
/// A build failure is reported per-command; the rest of the registration
/// batch proceeds.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("command name is empty")]
    EmptyName,

    #[error("command name '{0}' exceeds {1} characters")]
    NameTooLong(String, usize),

    #[error("command name '{0}' contains whitespace")]
    InvalidName(String),

    #[error("duplicate sibling command name '{0}'")]
    DuplicateName(String),

    #[error("command '{0}' has neither a handler nor children")]
    NoHandlerOrChildren(String),

    #[error("command '{command}': duplicate parameter name '{parameter}'")]
    DuplicateParameter { command: String, parameter: String },

    #[error("command '{command}': parameter '{parameter}' consumes remaining text but is not last")]
    RemainingNotLast { command: String, parameter: String },

    #[error("command '{command}': variadic parameter '{parameter}' is not last")]
    VariadicNotLast { command: String, parameter: String },

    #[error("command '{command}': required parameter '{parameter}' follows an optional one")]
    RequiredAfterOptional { command: String, parameter: String },
}

// ============================================================================
// Check failure records
// ============================================================================

/// One failed context check: the attribute that triggered it, the message the
/// check produced, and the underlying error when the check itself failed.
pub struct ContextCheckFailedData {
    pub attribute: Arc<dyn CheckAttribute>,
    pub message: String,
    pub source: Option<anyhow::Error>,
}

impl fmt::Debug for ContextCheckFailedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextCheckFailedData")
            .field("attribute", &self.attribute)
            .field("message", &self.message)
            .field("source", &self.source)
            .finish()
    }
}

/// One failed parameter check, additionally naming the parameter.
pub struct ParameterCheckFailedData {
    pub parameter: String,
    pub attribute: Arc<dyn CheckAttribute>,
    pub message: String,
    pub source: Option<anyhow::Error>,
}

impl fmt::Debug for ParameterCheckFailedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterCheckFailedData")
            .field("parameter", &self.parameter)
            .field("attribute", &self.attribute)
            .field("message", &self.message)
            .field("source", &self.source)
            .finish()
    }
}

// ============================================================================
// Pipeline errors
// ============================================================================

/// Why a command could not enter the invocation stage at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotExecutableReason {
    /// Group node with no handler of its own.
    GroupCommand,
    /// Supplied argument count does not match the declared parameter count.
    ArityMismatch { expected: usize, supplied: usize },
}

impl fmt::Display for NotExecutableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GroupCommand => write!(f, "group commands are not directly executable"),
            Self::ArityMismatch { expected, supplied } => {
                write!(f, "expected {expected} argument(s), got {supplied}")
            }
        }
    }
}

/// Errors reported through the command-errored event.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A raw argument could not be converted (soft failure, bad user input).
    #[error("could not parse argument '{parameter}'")]
    ArgumentParse {
        parameter: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// One or more context checks failed; all failures are carried.
    #[error("{} context check(s) failed", .0.len())]
    ChecksFailed(Vec<ContextCheckFailedData>),

    /// One or more parameter checks failed; all failures are carried.
    #[error("{} parameter check(s) failed", .0.len())]
    ParameterChecksFailed(Vec<ParameterCheckFailedData>),

    /// Structural misconfiguration; never retried.
    #[error("command '{command}' is not executable: {reason}")]
    NotExecutable {
        command: String,
        reason: NotExecutableReason,
    },

    /// The handler (or its receiver factory) failed. The message is the root
    /// cause's, with any wrapper layers already stripped.
    #[error("{message}")]
    Invocation {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl CommandError {
    /// Stable code label for logs.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ArgumentParse { .. } => "argument_parse",
            Self::ChecksFailed(_) => "checks_failed",
            Self::ParameterChecksFailed(_) => "parameter_checks_failed",
            Self::NotExecutable { .. } => "not_executable",
            Self::Invocation { .. } => "invocation",
        }
    }

    /// Wrap a handler error, unwrapping to its innermost cause for display.
    pub fn from_invocation(err: anyhow::Error) -> Self {
        let message = err.root_cause().to_string();
        Self::Invocation { message, source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_error_displays_root_cause() {
        let inner = std::io::Error::other("boom");
        let wrapped = anyhow::Error::new(inner).context("invoking handler");
        let err = CommandError::from_invocation(wrapped);
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.error_code(), "invocation");
    }

    #[test]
    fn not_executable_display() {
        let err = CommandError::NotExecutable {
            command: "config".into(),
            reason: NotExecutableReason::ArityMismatch { expected: 2, supplied: 1 },
        };
        assert_eq!(
            err.to_string(),
            "command 'config' is not executable: expected 2 argument(s), got 1"
        );
    }
}
