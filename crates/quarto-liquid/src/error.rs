/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template parsing and rendering.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while parsing or rendering a template.
///
/// Most kinds are recorded on the render context and rendered inline
/// according to the active [`ErrorsOutputMode`]. The kinds reported by
/// [`LiquidError::is_fatal`] always abort the render.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LiquidError {
    /// Malformed tag markup or unmatched block delimiters.
    #[error("{message}")]
    Syntax { message: String },

    /// A variable path could not be resolved.
    #[error("Variable '{markup}' could not be found")]
    VariableNotFound { markup: String },

    /// A filter call failed while rendering an output.
    #[error("Error with filter '{filter}' in '{markup}': {source}")]
    FilterNotFound {
        filter: String,
        markup: String,
        source: Box<LiquidError>,
    },

    /// Filter arity or argument error.
    #[error("{message}")]
    Argument { message: String },

    /// No registered operator matched the operator text.
    #[error("Unknown operator {operator}")]
    UnknownOperator { operator: String },

    /// Popping the last scope.
    #[error("{message}")]
    Context { message: String },

    /// Pushing past the maximum scope depth.
    #[error("Nesting too deep (maximum depth is {max_depth})")]
    StackLevel { max_depth: usize },

    /// The render exceeded its wall-clock budget.
    #[error("Render exceeded the timeout of {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A loop ran more iterations than allowed.
    #[error("Render exceeded the maximum of {max_iterations} loop iterations")]
    MaximumIterationsExceeded { max_iterations: usize },

    /// A `break` or `continue` reached the document root.
    #[error("'{tag}' used outside of a loop")]
    Interrupt { tag: String },

    /// A template could not be loaded by name.
    #[error("{message}")]
    FileSystem { message: String },

    /// Any other failure while rendering a node.
    #[error("{message}")]
    Render { message: String },
}

impl LiquidError {
    pub fn syntax(message: impl Into<String>) -> Self {
        LiquidError::Syntax {
            message: message.into(),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        LiquidError::Argument {
            message: message.into(),
        }
    }

    pub fn file_system(message: impl Into<String>) -> Self {
        LiquidError::FileSystem {
            message: message.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        LiquidError::Render {
            message: message.into(),
        }
    }

    /// Whether this error must propagate out of the render call
    /// regardless of the configured output mode.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LiquidError::Timeout { .. }
                | LiquidError::StackLevel { .. }
                | LiquidError::Context { .. }
                | LiquidError::MaximumIterationsExceeded { .. }
                | LiquidError::Interrupt { .. }
        )
    }

    /// The inline text rendered in place of a failing node.
    pub fn inline_message(&self) -> String {
        match self {
            LiquidError::Syntax { message } => format!("Liquid syntax error: {}", message),
            other => format!("Liquid error: {}", other),
        }
    }
}

/// Result type for template operations.
pub type LiquidResult<T> = Result<T, LiquidError>;

/// How recorded errors surface in the rendered output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorsOutputMode {
    /// Render a formatted message in place of the failing fragment.
    #[default]
    Display,
    /// Render nothing for the failing fragment.
    Suppress,
    /// Abort the render with the error.
    Rethrow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_message_for_syntax_error() {
        let err = LiquidError::syntax("Unknown tag 'foo'");
        assert_eq!(err.inline_message(), "Liquid syntax error: Unknown tag 'foo'");
    }

    #[test]
    fn test_inline_message_for_other_errors() {
        let err = LiquidError::UnknownOperator {
            operator: "isMultipleOf".to_string(),
        };
        assert_eq!(err.inline_message(), "Liquid error: Unknown operator isMultipleOf");
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(LiquidError::Timeout { timeout_ms: 10 }.is_fatal());
        assert!(LiquidError::StackLevel { max_depth: 80 }.is_fatal());
        assert!(
            LiquidError::Context {
                message: "underflow".to_string()
            }
            .is_fatal()
        );
        assert!(!LiquidError::argument("bad").is_fatal());
        assert!(
            !LiquidError::VariableNotFound {
                markup: "x".to_string()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_filter_not_found_wraps_source() {
        let err = LiquidError::FilterNotFound {
            filter: "money".to_string(),
            markup: "price | money".to_string(),
            source: Box::new(LiquidError::argument("boom")),
        };
        assert_eq!(
            err.to_string(),
            "Error with filter 'money' in 'price | money': boom"
        );
    }

    #[test]
    fn test_errors_output_mode_deserializes_lowercase() {
        let mode: ErrorsOutputMode = serde_json::from_str("\"rethrow\"").unwrap();
        assert_eq!(mode, ErrorsOutputMode::Rethrow);
        assert_eq!(ErrorsOutputMode::default(), ErrorsOutputMode::Display);
    }
}
