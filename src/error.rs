//! Error types for the arenavm execution core

use std::fmt;

use thiserror::Error;

/// Source position of an IR node, carried into diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceLoc {
    /// File the node was lowered from
    pub file: String,
    /// 1-based line number (0 when unknown)
    pub line: u32,
}

impl SourceLoc {
    /// Creates a location from a file name and line
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        SourceLoc {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "<unknown>:{}", self.line)
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}

/// Execution core errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Type errors
    /// Operand type does not match the operator signature
    ///
    /// **Triggered by:** a native node whose input or output type disagrees with the
    /// opcode's static signature, or a dereference chain that is inconsistent with the
    /// declared type (field access on a non-struct, indexing a scalar).
    /// **Detected:** at lowering time where possible, otherwise when an operator decodes
    /// its inputs.
    #[error("Type mismatch in {context}: expected {expected}, got {got}")]
    TypeMismatch {
        /// Operator or construct being checked
        context: String,
        /// Expected type
        expected: String,
        /// Actual type
        got: String,
    },

    // Resolver errors
    /// Array or slice index outside `[0, length)`
    ///
    /// **Triggered by:** `a[i]` with `i < 0` or `i >= len(a)`
    /// **Guarantee:** nothing is read or written when this is raised
    #[error("Index out of range: {index} for length {length}")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Stored length of the array or slice
        length: usize,
    },

    /// Argument descriptor names an unknown variable, function, package or struct
    #[error("Unresolved symbol: {name}")]
    UnresolvedSymbol {
        /// Qualified name of the symbol
        name: String,
    },

    /// Dereference of the nil offset
    #[error("Nil pointer dereference while resolving {name}")]
    NullPointer {
        /// Argument being resolved
        name: String,
    },

    // Arena errors
    /// Read or write past the allocated region of the arena
    #[error("Out of bounds access: offset {offset} width {width} (allocated {limit})")]
    OutOfBounds {
        /// First byte of the access
        offset: usize,
        /// Number of bytes accessed
        width: usize,
        /// End of the allocated region
        limit: usize,
    },

    /// Length header of a slice or string disagrees with the bytes available
    ///
    /// **Triggered by:** decoding a heap object whose `count * elemWidth` runs past the
    /// end of the supplied region.
    #[error("Corrupt slice: header claims {needed} bytes, {available} available")]
    CorruptSlice {
        /// Bytes required by the header
        needed: usize,
        /// Bytes actually available
        available: usize,
    },

    /// The arena would grow past its configured ceiling
    #[error("Out of memory: requested {requested} bytes (limit: {limit} bytes)")]
    OutOfMemory {
        /// Total arena size that was requested
        requested: usize,
        /// Configured ceiling
        limit: usize,
    },

    /// Call depth or stack segment exhausted
    #[error("Stack overflow at call depth {depth}")]
    StackOverflow {
        /// Number of live frames when the push failed
        depth: usize,
    },

    // Operator errors
    /// Integer division or modulo by zero
    ///
    /// **Triggered by:** `i64.div(x, 0)`, `i32.mod(x, 0)`, `x /= 0`
    /// **Guarantee:** the node's output is left untouched
    #[error("Division by zero in {op}")]
    DivisionByZero {
        /// Operator that failed
        op: String,
    },

    /// Random range with `min > max`
    #[error("Invalid range for {op}: min must not exceed max ({min} > {max})")]
    InvalidRange {
        /// Operator that failed
        op: String,
        /// Lower bound
        min: i128,
        /// Upper bound
        max: i128,
    },

    /// Operator received the wrong arity or an unusable operand
    #[error("Invalid arguments for {op}: {reason}")]
    InvalidArguments {
        /// Operator name
        op: String,
        /// Reason for invalidity
        reason: String,
    },

    // Lowering errors
    /// Assignment lowering received a malformed target or source list
    #[error("Invalid assignment: {reason}")]
    InvalidAssignment {
        /// What was wrong with the statement
        reason: String,
    },

    // External errors
    /// Foreign adapter failure
    #[error("Adapter error ({adapter}): {message}")]
    Adapter {
        /// Adapter name
        adapter: String,
        /// Error message
        message: String,
    },

    /// Invalid VM configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error raised while executing an IR node, tagged with the node's location
    #[error("{location}: {source}")]
    Evaluation {
        /// Source location of the failing node
        location: SourceLoc,
        /// Underlying error
        source: Box<Error>,
    },
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The arena can no longer be trusted; the whole evaluation unwinds
    Fatal,
    /// Reported by an operator before any output was written
    Recoverable,
}

impl Error {
    /// Create a type mismatch error
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl fmt::Display,
        got: impl fmt::Display,
    ) -> Self {
        Error::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    /// Create an unresolved symbol error
    pub fn unresolved(name: impl Into<String>) -> Self {
        Error::UnresolvedSymbol { name: name.into() }
    }

    /// Create an invalid assignment error
    pub fn invalid_assignment(reason: impl Into<String>) -> Self {
        Error::InvalidAssignment {
            reason: reason.into(),
        }
    }

    /// Tags the error with the location of the node that raised it.
    /// An error that already carries a location keeps the innermost one.
    pub fn at(self, location: &SourceLoc) -> Self {
        match self {
            Error::Evaluation { .. } => self,
            other => Error::Evaluation {
                location: location.clone(),
                source: Box::new(other),
            },
        }
    }

    /// Returns the underlying error without location wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Evaluation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Location of the failing node, if the error was raised during evaluation
    pub fn location(&self) -> Option<&SourceLoc> {
        match self {
            Error::Evaluation { location, .. } => Some(location),
            _ => None,
        }
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self.root() {
            Error::DivisionByZero { .. }
            | Error::TypeMismatch { .. }
            | Error::InvalidRange { .. }
            | Error::InvalidArguments { .. }
            | Error::InvalidAssignment { .. }
            | Error::Config(_) => ErrorSeverity::Recoverable,

            Error::OutOfBounds { .. }
            | Error::CorruptSlice { .. }
            | Error::IndexOutOfRange { .. }
            | Error::UnresolvedSymbol { .. }
            | Error::NullPointer { .. }
            | Error::OutOfMemory { .. }
            | Error::StackOverflow { .. }
            | Error::Adapter { .. } => ErrorSeverity::Fatal,

            Error::Evaluation { .. } => ErrorSeverity::Fatal,
        }
    }

    /// Returns true if the arena state can no longer be trusted after this error
    pub fn is_fatal(&self) -> bool {
        self.classify() == ErrorSeverity::Fatal
    }
}

/// Result type for arenavm operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_wraps_once() {
        let loc = SourceLoc::new("main.src", 12);
        let outer = SourceLoc::new("lib.src", 3);
        let err = Error::DivisionByZero {
            op: "i64.div".to_string(),
        }
        .at(&loc)
        .at(&outer);

        assert_eq!(err.location(), Some(&loc));
        assert!(matches!(err.root(), Error::DivisionByZero { .. }));
        assert_eq!(err.to_string(), "main.src:12: Division by zero in i64.div");
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            Error::DivisionByZero { op: "x".into() }.classify(),
            ErrorSeverity::Recoverable
        );
        assert!(Error::IndexOutOfRange {
            index: 4,
            length: 2
        }
        .is_fatal());
        assert!(Error::CorruptSlice {
            needed: 12,
            available: 4
        }
        .at(&SourceLoc::default())
        .is_fatal());
    }
}
