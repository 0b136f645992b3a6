// src/errors.rs
//! Analysis diagnostics (E21xx).
//!
//! The builder never aborts on a user error: it records a diagnostic,
//! substitutes an error-recovery type, and keeps going. Internal
//! invariant violations instead go through [`ice`], which is fatal for
//! the module being analyzed.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::frontend::Span;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum AnalysisError {
    #[error("duplicate type definition '{name}'")]
    #[diagnostic(code(E2101))]
    DuplicateTypeDefinition {
        name: String,
        #[label("redefined here")]
        span: SourceSpan,
        #[label("first defined here")]
        previous: SourceSpan,
    },

    #[error("unknown symbol '{name}'")]
    #[diagnostic(code(E2102))]
    UnknownSymbol {
        name: String,
        #[label("not found in this scope")]
        span: SourceSpan,
    },

    #[error("{message}")]
    #[diagnostic(code(E2103))]
    GenericError {
        message: String,
        #[label]
        span: SourceSpan,
    },

    #[error("type alias refers to itself in an unresolvable way")]
    #[diagnostic(
        code(E2104),
        help("a type alias may refer to itself only behind a table, function, or other constructor")
    )]
    OccursCheckFailed {
        #[label("recursive alias")]
        span: SourceSpan,
    },

    #[error("code is too complex to typecheck")]
    #[diagnostic(
        code(E2105),
        help("break the expression or block into simpler parts")
    )]
    CodeTooComplex {
        #[label("simplify this")]
        span: SourceSpan,
    },

    #[error("unknown type '{name}'")]
    #[diagnostic(code(E2106))]
    UnknownTypeSymbol {
        name: String,
        #[label("no type with this name in scope")]
        span: SourceSpan,
    },
}

/// A diagnostic bound to its source location
#[derive(Debug, Clone)]
pub struct TypeError {
    pub error: AnalysisError,
    pub span: Span,
}

impl TypeError {
    pub fn new(error: AnalysisError, span: Span) -> Self {
        Self { error, span }
    }
}

/// Report an internal invariant violation and abort analysis of the
/// module. User-induced conditions must never route through here.
pub fn ice(msg: &str) -> ! {
    panic!("internal error: {msg}");
}
