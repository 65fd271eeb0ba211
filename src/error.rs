//! Error and diagnostic types for the compiler core.
//!
//! Two mechanisms coexist, for two different audiences:
//!
//! - [`CompilerError`] / [`Result`] carry *internal* failures between
//!   passes (unexpected IR states, broken invariants). These abort the
//!   current pass via `?`.
//! - [`Diagnostics`] records *user-facing* errors and warnings at source
//!   positions. Recording an error does not stop compilation; the pass
//!   drops the offending statement and keeps going so that later
//!   statements still get checked.

use crate::ast::SourcePos;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("Type error: {0}")]
    TypeError(String, Option<SourcePos>),

    #[error("Lowering error: {0}")]
    LowerError(String, Option<SourcePos>),

    #[error("Internal compiler error: {0}")]
    Internal(String),
}

impl CompilerError {
    /// Source position the error is attached to, if any.
    pub fn pos(&self) -> Option<&SourcePos> {
        match self {
            CompilerError::TypeError(_, p) | CompilerError::LowerError(_, p) => p.as_ref(),
            CompilerError::Internal(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompilerError>;

/// Construct a `CompilerError::TypeError` without a position.
#[macro_export]
macro_rules! err_type {
    ($($arg:tt)*) => {
        $crate::error::CompilerError::TypeError(format!($($arg)*), None)
    };
}

/// Construct a `CompilerError::TypeError` at a position.
#[macro_export]
macro_rules! err_type_at {
    ($pos:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::TypeError(format!($($arg)*), Some($pos))
    };
}

/// Return early with a `TypeError` at a position.
#[macro_export]
macro_rules! bail_type_at {
    ($pos:expr, $($arg:tt)*) => {
        return Err($crate::err_type_at!($pos, $($arg)*))
    };
}

/// Construct a `CompilerError::LowerError` without a position.
#[macro_export]
macro_rules! err_lower {
    ($($arg:tt)*) => {
        $crate::error::CompilerError::LowerError(format!($($arg)*), None)
    };
}

/// Construct a `CompilerError::LowerError` at a position.
#[macro_export]
macro_rules! err_lower_at {
    ($pos:expr, $($arg:tt)*) => {
        $crate::error::CompilerError::LowerError(format!($($arg)*), Some($pos))
    };
}

/// Return early with a `LowerError`.
#[macro_export]
macro_rules! bail_lower {
    ($($arg:tt)*) => {
        return Err($crate::err_lower!($($arg)*))
    };
}

/// Construct a `CompilerError::Internal`.
#[macro_export]
macro_rules! err_internal {
    ($($arg:tt)*) => {
        $crate::error::CompilerError::Internal(format!($($arg)*))
    };
}

// =============================================================================
// Diagnostic sink
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single user-facing diagnostic, attached to a source position.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub pos: SourcePos,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", self.pos, tag, self.message)
    }
}

/// Collects diagnostics across a compilation.
///
/// Errors are recorded eagerly and locally; the caller decides what to do
/// with the statement that produced them (usually: drop it and continue).
#[derive(Debug, Default)]
pub struct Diagnostics {
    messages: Vec<Diagnostic>,
    error_count: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn error(&mut self, pos: &SourcePos, message: impl Into<String>) {
        self.error_count += 1;
        self.messages.push(Diagnostic {
            severity: Severity::Error,
            pos: pos.clone(),
            message: message.into(),
        });
    }

    pub fn warning(&mut self, pos: &SourcePos, message: impl Into<String>) {
        self.messages.push(Diagnostic {
            severity: Severity::Warning,
            pos: pos.clone(),
            message: message.into(),
        });
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.messages.len() - self.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    /// Iterate only the warnings (used by tests and the driver's summary).
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}
