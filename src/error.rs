use std::path::PathBuf;

use thiserror::Error;

use crate::assembly::InstrId;

macro_rules! weaving_error {
    // Single string version
    ($kind:ident, $instr:expr, $msg:expr) => {
        crate::Error::Weaving {
            kind: crate::ErrorKind::$kind,
            message: $msg.to_string(),
            instruction: $instr,
        }
    };

    // Format string with arguments version
    ($kind:ident, $instr:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Weaving {
            kind: crate::ErrorKind::$kind,
            message: format!($fmt, $($arg)*),
            instruction: $instr,
        }
    };
}

macro_rules! internal_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Internal {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Internal {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Classification of recoverable weaving failures.
///
/// Every recoverable failure aborts the rewrite of the current method only. The kind
/// is kept so hosts can filter or count diagnostics per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An argument or operand does not match the expected instruction shape.
    PatternMismatch,
    /// A null literal was found where a value is mandatory.
    NullNotAllowed,
    /// A named type, method, field, label, local or parameter could not be found.
    NotFound,
    /// More than one candidate matched a lookup.
    Ambiguous,
    /// A structural rule was violated (redefinition, block locality, terminal form).
    Structural,
    /// The raw-value push primitive is used where the stack is not reliable.
    StackSafety,
    /// A marker reference survived the rewrite.
    UnconsumedReference,
}

/// The generic Error type, which covers every failure this library can report.
///
/// The variants split into two groups:
///
/// - [`Error::Weaving`] is recoverable: the method that raised it is replaced by a
///   stub and the pass continues with the next method.
/// - Everything else is fatal for the whole pass: it indicates either a broken
///   invariant inside the engine, or an environment problem (I/O, configuration).
///
/// # Examples
///
/// ```rust
/// use cilweave::{Error, ErrorKind};
///
/// fn report(error: &Error) {
///     match error {
///         Error::Weaving { kind: ErrorKind::NotFound, message, .. } => {
///             eprintln!("lookup failed: {message}");
///         }
///         Error::ModuleLoad { path, .. } => eprintln!("bad module {}", path.display()),
///         other => eprintln!("{other}"),
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A recoverable rewriting failure inside one method.
    ///
    /// # Fields
    ///
    /// * `kind` - The taxonomy bucket this failure belongs to
    /// * `message` - Human readable description
    /// * `instruction` - The instruction closest to the failure, used for source locations
    #[error("{message}")]
    Weaving {
        /// The category of this failure
        kind: ErrorKind,
        /// The message to be reported to the user
        message: String,
        /// The instruction at which the failure was detected
        instruction: Option<InstrId>,
    },

    /// An invariant of the engine itself was broken.
    ///
    /// This is a bug in the engine rather than bad input. The source location where
    /// it was raised is attached for debugging purposes.
    #[error("Internal error - {file}:{line}: {message}")]
    Internal {
        /// The message describing the broken invariant
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An internal error wrapped with the identity of the method being processed.
    #[error("Unexpected error while processing method {method}: {source}")]
    MethodFailed {
        /// Display name of the method that was being rewritten
        method: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// A module file could not be read or parsed.
    #[error("Could not read module {}: {message}", path.display())]
    ModuleLoad {
        /// Path of the module file
        path: PathBuf,
        /// Why loading failed
        message: String,
    },

    /// Invalid weaver configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this error only affects the method that raised it.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Weaving { .. })
    }

    /// Returns the weaving error kind, if this is a recoverable weaving error.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Weaving { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns the instruction this error was raised at, if known.
    #[must_use]
    pub fn instruction(&self) -> Option<InstrId> {
        match self {
            Error::Weaving { instruction, .. } => *instruction,
            _ => None,
        }
    }

    /// Attaches an instruction to a weaving error that does not have one yet.
    #[must_use]
    pub fn at(self, instr: InstrId) -> Self {
        match self {
            Error::Weaving {
                kind,
                message,
                instruction: None,
            } => Error::Weaving {
                kind,
                message,
                instruction: Some(instr),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weaving_errors_are_recoverable() {
        let error = weaving_error!(NotFound, None, "Type {} not found", "Foo");
        assert!(error.is_recoverable());
        assert_eq!(error.kind(), Some(ErrorKind::NotFound));
        assert_eq!(error.to_string(), "Type Foo not found");
    }

    #[test]
    fn internal_errors_are_fatal() {
        let error = internal_error!("dangling instruction {}", 4);
        assert!(!error.is_recoverable());
        assert!(error.to_string().contains("dangling instruction 4"));
    }

    #[test]
    fn at_only_fills_missing_location() {
        let error = weaving_error!(Structural, None, "oops").at(InstrId::new(3));
        assert_eq!(error.instruction(), Some(InstrId::new(3)));

        let error = error.at(InstrId::new(9));
        assert_eq!(error.instruction(), Some(InstrId::new(3)));
    }
}
