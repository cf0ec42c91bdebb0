//! The error taxonomy shared by every stage of the pipeline.
//!
//! Every fallible operation in this crate and its sibling backend crates returns
//! a `Result<T>`. There is no panic/abort path for a recoverable condition:
//! allocation failure is reported the same way as a logic bug so that callers
//! unwind through their scoped-release guards instead of aborting mid-construction.

use std::fmt;

use crate::SourceLocation;

/// What kind of failure occurred.
///
/// `NotFound` is deliberately not "an error" in the usual sense: it lets a
/// caller that is looking up-or-creating (e.g. `vreg_of`) distinguish "absent,
/// go create it" from every other condition, which is always a bug or resource
/// exhaustion further up the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A caller-contract violation: a null/absent value where one was required,
    /// or a tagged union in the wrong variant for the call being made.
    InvalidParameter,
    /// An IR construct that an earlier pass should have eliminated is still
    /// present (e.g. an opcode reaching the backend that only the legalizer
    /// should ever leave behind). Always a bug, never a user error.
    InvalidState,
    /// The allocator returned nothing.
    AllocationFailure,
    /// A lookup came up empty. Not inherently fatal — see the module docs.
    NotFound,
    /// Malformed source, raised by the external front-end. The core never
    /// raises this itself; it only propagates it.
    UserError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidParameter => "invalid parameter",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::AllocationFailure => "allocation failure",
            ErrorKind::NotFound => "not found",
            ErrorKind::UserError => "user error",
        };
        f.write_str(s)
    }
}

/// A fallible operation's failure: what kind it was, a human-readable message,
/// and — when available — the source location the debug cursor was pointing at
/// when the failure happened.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}{}", location.as_ref().map(|l| format!(" at {l}")).unwrap_or_default())]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl Error {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), location: None }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    pub fn allocation_failure() -> Self {
        Self::new(ErrorKind::AllocationFailure, "allocator returned no memory")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn user_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserError, message)
    }

    /// Attach (or overwrite) the source location this error occurred at.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// The result type returned by every fallible operation in the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
