// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # cilweave
//!
//! A post-compilation rewriting engine for .NET method bodies. Source code calls into
//! a marker vocabulary (`IL.Push`, `IL.Emit.Add()`, `IL.MarkLabel("loop")`,
//! `new TypeRef(...)` and friends); `cilweave` replaces each of those calls, together
//! with the argument expressions the compiler produced for it, by the literal CIL the
//! call describes.
//!
//! ## Features
//!
//! - **Arena instruction model** - Stable instruction ids that survive insertions,
//!   removals and in-place replacement, with branch targets and handler boundaries kept
//!   consistent
//! - **Argument folding** - Constant, array, type, method, field and signature
//!   expressions are read back from the compiler's output and turned into operands
//! - **Reference resolution** - Methods, fields, properties, events and operators are
//!   resolved against the modules of a [`metadata::SymbolSpace`]
//! - **Labels and locals** - Named labels and locals, with warnings for unused ones
//! - **Stack safety** - Rejects raw pushes the compiler may have spilled
//! - **Debug information** - Sequence points follow rewritten call sites
//! - **Failure isolation** - A method that cannot be rewritten is replaced by a stub
//!   that throws, and the pass continues
//! - **Parallel passes** - Methods are woven on the rayon thread pool
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use cilweave::prelude::*;
//!
//! let module = Module::new("App.dll", "App").with_type(TypeDef::new("App", "Program"));
//! let symbols = SymbolSpace::new(Arc::new(module), "System.Runtime");
//! let program = TypeDef::new("App", "Program");
//! let method = MethodDef::new("Run", symbols.core_type("System", "Void"));
//!
//! let mut builder = BodyBuilder::new();
//! builder.emit(OpCode::Ret)?;
//! let mut body = builder.finish()?;
//!
//! let config = WeaverConfig::default();
//! let report = ModuleWeaver::new(&config, &symbols)
//!     .weave(vec![MethodJob::new(&program, &method, &mut body)])?;
//! println!("{report}");
//! # Ok::<(), cilweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - Instructions, opcodes, method bodies and control flow
//! - [`metadata`] - Type, method and field references and the modules they resolve in
//! - [`weaving`] - The rewriting engine and its diagnostics
//! - [`config`] - Weaver settings
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Rewriting failures inside a method are
//! [`Error::Weaving`] values carrying an [`ErrorKind`]; they never abort a module pass,
//! they stub the method and surface as [`Diagnostic`] entries instead. Anything else
//! is fatal for the pass.
//!
//! ## Logging
//!
//! `cilweave` logs through the [`log`](https://docs.rs/log) facade: `debug` for per
//! method decisions, `trace` for every rewritten call and `warn` for stubbed methods.
//! Diagnostics are returned as values, never only logged.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use cilweave::prelude::*;
///
/// let config = WeaverConfig::default().with_parallel(false);
/// assert_eq!(config.marker_namespace, "InlineIL");
/// ```
pub mod prelude;

/// CIL instructions and method bodies.
///
/// This module provides the mutable instruction model the rewriter operates on:
///
/// - **Opcodes**: The full ECMA-335 opcode table with operand kinds and stack effects
/// - **Method bodies**: An arena of instructions addressed by stable [`assembly::InstrId`]s
/// - **Control flow**: Basic blocks and exception handler regions
/// - **Debug information**: Sequence points attached to instructions
///
/// # Examples
///
/// ```rust
/// use cilweave::assembly::{BodyBuilder, OpCode};
///
/// let mut builder = BodyBuilder::new();
/// builder.emit(OpCode::Ldarg0)?;
/// builder.emit(OpCode::Ret)?;
/// let body = builder.finish()?;
/// assert_eq!(body.len(), 2);
/// # Ok::<(), cilweave::Error>(())
/// ```
pub mod assembly;

/// Type system references and module resolution.
///
/// # Key Components
///
/// - [`metadata::TypeSig`] / [`metadata::TypeName`] - Structural type signatures
/// - [`metadata::MethodRef`] / [`metadata::FieldRef`] - Member references as carried by operands
/// - [`metadata::Module`] / [`metadata::TypeDef`] - Definitions the resolver searches
/// - [`metadata::SymbolSpace`] - Cross-module resolution with forwarding and caching
pub mod metadata;

/// Weaver settings.
pub mod config;

/// The marker vocabulary rewriting engine.
pub mod weaving;

/// `cilweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilweave` Error type
///
/// # Examples
///
/// ```rust
/// use cilweave::{Error, ErrorKind};
///
/// let error = Error::Config("unknown attribute".to_string());
/// assert!(!error.is_recoverable());
/// assert_eq!(error.kind(), None::<ErrorKind>);
/// ```
pub use error::{Error, ErrorKind};

pub use config::{SequencePointMode, WeaverConfig};

pub use weaving::{
    Diagnostic, MethodStatus, MethodWeaver, ModuleWeaver, Severity, SourceLocation,
    WeaveOutcome, WeaveReport,
};
