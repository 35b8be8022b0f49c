//! Error types for binding resolution and call dispatch.
//!
//! `EvalError` is what a running program observes: argument-matching
//! failures, unbound names, non-callable callees. `InternalError` is a
//! fault in the interpreter's own bookkeeping (a layout linked to the wrong
//! parent, a slot index past the end of a layout). Internal errors convert
//! into `EvalError` so they surface through the same channel.
//!
//! Factory functions (e.g. `unused_argument()`) are the public API; they
//! populate both `kind` and `message`.

use std::fmt;

use crate::value::Value;

/// Result of evaluating a call or a read.
pub type EvalResult = Result<Value, EvalError>;

/// Typed error category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvalErrorKind {
    // Callee
    NotCallable {
        type_name: String,
    },

    // Argument matching
    ZeroLengthName,
    UnusedArgument {
        name: String,
    },
    DuplicateArgument {
        name: String,
    },
    TooManyArguments {
        callee: String,
        expected: usize,
        got: usize,
    },
    MissingArgument {
        name: String,
    },
    VariadicOutOfContext,

    // Resolution
    UndefinedVariable {
        name: String,
    },

    // Resources
    StackOverflow {
        depth: usize,
    },

    Internal(InternalError),

    Custom {
        message: String,
    },
}

impl EvalErrorKind {
    /// Whether this error comes from matching supplied arguments against
    /// formals. Every dispatch path reports these identically.
    pub fn is_argument_mismatch(&self) -> bool {
        matches!(
            self,
            Self::ZeroLengthName
                | Self::UnusedArgument { .. }
                | Self::DuplicateArgument { .. }
                | Self::TooManyArguments { .. }
        )
    }
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCallable { type_name } => {
                write!(f, "attempt to apply non-function ({type_name})")
            }
            Self::ZeroLengthName => write!(f, "attempt to use zero-length variable name"),
            Self::UnusedArgument { name } => write!(f, "unused argument ({name})"),
            Self::DuplicateArgument { name } => {
                write!(f, "formal argument `{name}` matched by multiple actual arguments")
            }
            Self::TooManyArguments {
                callee,
                expected,
                got,
            } => write!(
                f,
                "`{callee}` takes {expected} argument{}, got {got}",
                if *expected == 1 { "" } else { "s" }
            ),
            Self::MissingArgument { name } => {
                write!(f, "argument `{name}` is missing, with no default")
            }
            Self::VariadicOutOfContext => write!(f, "`...` used in an incorrect context"),
            Self::UndefinedVariable { name } => write!(f, "object `{name}` not found"),
            Self::StackOverflow { depth } => {
                write!(f, "evaluation nested too deeply ({depth} calls)")
            }
            Self::Internal(err) => write!(f, "internal error: {err}"),
            Self::Custom { message } => write!(f, "{message}"),
        }
    }
}

/// Evaluation error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalError {
    /// Structured error category.
    pub kind: EvalErrorKind,
    /// Human-readable message. For factory-created errors this equals
    /// `kind.to_string()`.
    pub message: String,
}

impl EvalError {
    /// Create an error with just a message, using the `Custom` kind.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        EvalError {
            kind: EvalErrorKind::Custom {
                message: message.clone(),
            },
            message,
        }
    }

    pub fn from_kind(kind: EvalErrorKind) -> Self {
        let message = kind.to_string();
        EvalError { kind, message }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EvalError {}

impl From<InternalError> for EvalError {
    fn from(err: InternalError) -> Self {
        EvalError::from_kind(EvalErrorKind::Internal(err))
    }
}

/// Fault in the interpreter's environment bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InternalError {
    /// A layout is already linked to a different enclosing layout.
    EnclosingMismatch {
        layout: String,
        expected: Option<String>,
        found: Option<String>,
    },
    /// Attach or detach on a layout with no enclosing layout.
    NoEnclosingLayout { layout: String },
    /// A second live activation for a singleton layout.
    SingletonTaken { layout: String },
    /// Fan-out requested on a layout that may have many activations.
    NotSingleton { layout: String },
    /// Slot index past the end of a layout.
    UnknownSlot { layout: String, slot: usize },
    /// A call-site chain referenced a node it never allocated.
    MissingCacheNode { node: usize },
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnclosingMismatch {
                layout,
                expected,
                found,
            } => write!(
                f,
                "layout `{layout}` is enclosed by {} but was linked to {}",
                found.as_deref().unwrap_or("nothing"),
                expected.as_deref().unwrap_or("nothing"),
            ),
            Self::NoEnclosingLayout { layout } => {
                write!(f, "layout `{layout}` has no enclosing layout")
            }
            Self::SingletonTaken { layout } => {
                write!(f, "layout `{layout}` already has a live activation")
            }
            Self::NotSingleton { layout } => {
                write!(f, "layout `{layout}` is not a singleton layout")
            }
            Self::UnknownSlot { layout, slot } => {
                write!(f, "layout `{layout}` has no slot {slot}")
            }
            Self::MissingCacheNode { node } => write!(f, "call site has no node {node}"),
        }
    }
}

impl std::error::Error for InternalError {}

// Factory functions

/// Callee evaluated to something other than a function.
#[cold]
pub fn not_callable(type_name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::NotCallable {
        type_name: type_name.to_string(),
    })
}

/// An argument was supplied with the empty string as its name.
#[cold]
pub fn zero_length_name() -> EvalError {
    EvalError::from_kind(EvalErrorKind::ZeroLengthName)
}

/// A named argument matched no formal.
#[cold]
pub fn unused_argument(name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::UnusedArgument {
        name: name.to_string(),
    })
}

/// Two supplied arguments matched the same formal.
#[cold]
pub fn duplicate_argument(name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::DuplicateArgument {
        name: name.to_string(),
    })
}

/// More positional arguments than formals, and no variadic formal.
#[cold]
pub fn too_many_arguments(callee: &str, expected: usize, got: usize) -> EvalError {
    EvalError::from_kind(EvalErrorKind::TooManyArguments {
        callee: callee.to_string(),
        expected,
        got,
    })
}

/// A formal without a default was read but never supplied.
#[cold]
pub fn missing_argument(name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::MissingArgument {
        name: name.to_string(),
    })
}

/// `...` forwarded from a scope that has no variadic group.
#[cold]
pub fn variadic_out_of_context() -> EvalError {
    EvalError::from_kind(EvalErrorKind::VariadicOutOfContext)
}

#[cold]
pub fn undefined_variable(name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::UndefinedVariable {
        name: name.to_string(),
    })
}

#[cold]
pub fn stack_overflow(depth: usize) -> EvalError {
    EvalError::from_kind(EvalErrorKind::StackOverflow { depth })
}
