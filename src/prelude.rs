//! # cilweave Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! cilweave library. Import it to get quick access to everything a host needs to drive
//! a weaving pass.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilweave operations
pub use crate::Error;

/// Category of a recoverable rewriting failure
pub use crate::ErrorKind;

/// The result type used throughout cilweave
pub use crate::Result;

// ================================================================================================
// Configuration
// ================================================================================================

/// Weaver settings and the sequence point policy
pub use crate::config::{SequencePointMode, WeaverConfig};

// ================================================================================================
// Instruction Model
// ================================================================================================

/// Instructions, operands and opcodes
pub use crate::assembly::{InstrId, Instruction, OpCode, Operand, OperandType};

/// Method bodies and their construction
pub use crate::assembly::{BodyBuilder, LocalVariable, MethodBody};

/// Exception handling regions and debug information
pub use crate::assembly::{ExceptionHandler, ExceptionHandlerFlags, SequencePoint};

// ================================================================================================
// Metadata
// ================================================================================================

/// Type, method and field references
pub use crate::metadata::{
    CallSiteSig, CallingConvention, FieldRef, GenericParamOwner, MethodRef, TypeName, TypeSig,
};

/// Definitions searched during resolution
pub use crate::metadata::{FieldDef, MethodDef, MethodModifiers, Module, TypeDef};

/// Cross-module resolution
pub use crate::metadata::{ModuleCache, ModuleReader, SymbolSpace};

// ================================================================================================
// Weaving
// ================================================================================================

/// Module and method drivers
pub use crate::weaving::{MethodJob, MethodWeaver, ModuleWeaver};

/// Pass results
pub use crate::weaving::{
    Diagnostic, MethodStatus, Severity, SourceLocation, WeaveOutcome, WeaveReport,
};
