//! Unified error types for operation graphs.
//!
//! Each phase has its own error type; all of them convert into
//! [`OpGraphError`] for callers that do not care which phase failed.
//!
//! ## Error Hierarchy
//!
//! ```text
//! OpGraphError (top-level wrapper)
//! ├── BuildError     - builder misuse: argument and state errors
//! ├── RegistryError  - type and member registration
//! ├── RenderError    - rendering (unsupported constructs, metadata)
//! ├── LoadError      - reading rendered text back (wraps ReadError)
//! ├── BackendError   - graph validation during compilation
//! └── RuntimeError   - invocation of a compiled function
//! ```

use std::fmt;

use thiserror::Error;

use crate::Span;

// ============================================================================
// Build Errors
// ============================================================================

/// Errors raised synchronously by builder operations.
///
/// A failed operation leaves the builder unchanged. Errors split into
/// argument errors (bad input) and state errors (operation not valid in
/// the current construct); see [`BuildError::is_state_error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A variable or label name is empty or whitespace.
    #[error("{what} name must not be blank")]
    BlankName { what: &'static str },

    /// A variable with this name already exists in the function.
    #[error("variable '{name}' is already declared")]
    DuplicateVariable { name: String },

    /// A label with this name already exists in the function.
    #[error("label '{name}' is already declared")]
    DuplicateLabel { name: String },

    /// `break` or `continue` with no enclosing loop.
    #[error("'{statement}' is only valid inside a loop")]
    NotInLoop { statement: &'static str },

    /// Operation not valid for the construct currently open.
    #[error("invalid operation: {message}")]
    InvalidState { message: String },

    /// `rethrow` outside of a catch block.
    #[error("rethrow is only valid inside a catch block")]
    RethrowOutsideCatch,

    /// A value is not assignable to the required type.
    #[error("type mismatch in {context}: expected '{expected}', found '{found}'")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// A producer references a name that is neither declared nor captured.
    #[error("reference to '{name}' is not supported: no such variable in scope")]
    UnresolvedVariable { name: String },

    /// Wrong number of arguments or lambda parameters.
    #[error("{context} expects {expected} argument(s), found {found}")]
    Arity {
        context: String,
        expected: usize,
        found: usize,
    },

    /// A `goto` names a label that was never placed.
    #[error("label '{name}' is referenced but never placed")]
    UnresolvedLabel { name: String },

    /// `end_try` with neither catch nor finally.
    #[error("try block requires at least one catch or a finally block")]
    MissingHandler,

    /// `end_switch` with no case and no default.
    #[error("switch requires at least one case or a default")]
    EmptySwitch,

    /// `finish` while a construct is still open.
    #[error("'{construct}' was not closed")]
    UnclosedConstruct { construct: &'static str },

    /// Any other invalid argument.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl BuildError {
    /// Create a state error.
    pub fn state(message: impl Into<String>) -> Self {
        BuildError::InvalidState {
            message: message.into(),
        }
    }

    /// Whether the operation was invalid for the current builder state,
    /// as opposed to being given a bad argument.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            BuildError::NotInLoop { .. }
                | BuildError::InvalidState { .. }
                | BuildError::RethrowOutsideCatch
                | BuildError::MissingHandler
                | BuildError::EmptySwitch
                | BuildError::UnclosedConstruct { .. }
                | BuildError::UnresolvedLabel { .. }
        )
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors raised while registering types and members.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("type '{name}' is already registered")]
    DuplicateType { name: String },

    #[error("type '{name}' is not registered")]
    UnknownType { name: String },

    #[error("member '{member}' is already registered on '{owner}'")]
    DuplicateMember { owner: String, member: String },

    #[error("type '{name}' cannot derive from '{base}'")]
    InvalidBase { name: String, base: String },
}

// ============================================================================
// Metadata Errors
// ============================================================================

/// Errors raised when member metadata is inspected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// Inspection denied by policy; renderers degrade gracefully.
    #[error("access to metadata of '{member}' was denied")]
    AccessDenied { member: String },

    /// Inspection failed for any other reason.
    #[error("metadata of '{member}' is unavailable: {reason}")]
    Unavailable { member: String, reason: String },
}

// ============================================================================
// Render Errors
// ============================================================================

/// Errors raised while rendering a graph to text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The graph contains a construct with no textual form.
    #[error("rendering {construct} is not supported")]
    Unsupported { construct: String },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("formatting failed")]
    Fmt(#[from] fmt::Error),
}

// ============================================================================
// Read / Load Errors
// ============================================================================

/// Lexing and parsing errors of rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("unexpected character '{ch}' at {span}")]
    UnexpectedChar { ch: char, span: Span },

    #[error("unterminated string at {span}")]
    UnterminatedString { span: Span },

    #[error("unterminated comment at {span}")]
    UnterminatedComment { span: Span },

    #[error("invalid number at {span}: {detail}")]
    InvalidNumber { span: Span, detail: String },

    #[error("expected {expected} at {span}, found {found}")]
    Expected {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },
}

impl ReadError {
    /// Location of the error, if known.
    pub fn span(&self) -> Option<Span> {
        match self {
            ReadError::UnexpectedChar { span, .. }
            | ReadError::UnterminatedString { span }
            | ReadError::UnterminatedComment { span }
            | ReadError::InvalidNumber { span, .. }
            | ReadError::Expected { span, .. } => Some(*span),
            ReadError::UnexpectedEof { .. } => None,
        }
    }
}

/// Errors raised while rebuilding a graph from rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("unknown identifier '{name}'")]
    UnknownIdentifier { name: String },

    #[error("identifier '{name}' is declared twice")]
    DuplicateIdentifier { name: String },

    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    #[error("no member matches {description}")]
    UnknownMember { description: String },

    #[error("malformed {what}: {message}")]
    Malformed { what: &'static str, message: String },
}

// ============================================================================
// Backend Errors
// ============================================================================

/// Errors raised while compiling a graph into a callable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("variable '{name}' is used but not declared")]
    UndeclaredVariable { name: String },

    #[error("jump target '{label}' is not reachable from the jump")]
    UnreachableLabel { label: String },

    #[error("rethrow outside of a catch block")]
    RethrowOutsideCatch,

    #[error("{construct} is not supported by the backend")]
    Unsupported { construct: String },

    #[error("extension '{name}' cannot be reduced")]
    IrreducibleExtension { name: String },

    #[error("type '{name}' is not registered")]
    UnknownType { name: String },
}

// ============================================================================
// Runtime Errors
// ============================================================================

/// Errors raised when a compiled function is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Wrong number of arguments.
    #[error("expected {expected} argument(s), found {found}")]
    Arguments { expected: usize, found: usize },

    /// Argument not assignable to its parameter.
    #[error("argument {index} must be '{expected}', found '{found}'")]
    ArgumentType {
        index: usize,
        expected: String,
        found: String,
    },

    /// An exception escaped the function.
    #[error("unhandled exception {type_name}: {message}")]
    Unhandled { type_name: String, message: String },
}

// ============================================================================
// Unified Error
// ============================================================================

/// Top-level error for any phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpGraphError {
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_errors_are_classified() {
        assert!(BuildError::NotInLoop { statement: "break" }.is_state_error());
        assert!(BuildError::state("else already added").is_state_error());
        assert!(!BuildError::DuplicateVariable { name: "x".into() }.is_state_error());
        assert!(!BuildError::BlankName { what: "label" }.is_state_error());
    }

    #[test]
    fn messages_name_the_culprit() {
        let err = BuildError::DuplicateLabel { name: "top".into() };
        assert_eq!(err.to_string(), "label 'top' is already declared");
        let err = RenderError::Unsupported {
            construct: "fault block".into(),
        };
        assert_eq!(err.to_string(), "rendering fault block is not supported");
    }

    #[test]
    fn phase_errors_convert() {
        let err: OpGraphError = BuildError::EmptySwitch.into();
        assert!(matches!(err, OpGraphError::Build(BuildError::EmptySwitch)));
        let err: LoadError = ReadError::UnexpectedEof {
            expected: "';'".into(),
        }
        .into();
        assert!(matches!(err, LoadError::Read(_)));
    }

    #[test]
    fn read_error_span() {
        let err = ReadError::UnterminatedString {
            span: Span::new(2, 5, 1),
        };
        assert_eq!(err.span(), Some(Span::new(2, 5, 1)));
        assert_eq!(err.to_string(), "unterminated string at 2:5");
    }
}
