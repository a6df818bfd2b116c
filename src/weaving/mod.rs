//! Rewriting of marker vocabulary calls into literal CIL.
//!
//! This module is the engine of the crate. It recognizes calls into the marker
//! namespace, folds their argument expressions into operands, and leaves the raw
//! instructions the calls describe in their place.
//!
//! # Architecture
//!
//! Weaving is strictly per method. A [`ModuleWeaver`] hands every method body of a
//! module to a [`MethodWeaver`], sequentially or on the rayon thread pool. Method
//! weavers share nothing mutable: the [`crate::metadata::SymbolSpace`] they resolve
//! references against is internally synchronized, and every body is owned by exactly
//! one job.
//!
//! # Key Components
//!
//! - [`classify`] - Maps a called method to the vocabulary entry it names
//! - [`MethodWeaver`] - Rewrites one body, stubbing it on failure
//! - [`ModuleWeaver`] - Drives a whole module and collects a [`WeaveReport`]
//! - [`Diagnostic`] - Warnings and errors, located through sequence points
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use cilweave::{
//!     assembly::{Instruction, MethodBody, OpCode},
//!     metadata::{MethodDef, Module, SymbolSpace, TypeDef},
//!     weaving::{MethodJob, ModuleWeaver},
//!     WeaverConfig,
//! };
//!
//! let symbols = SymbolSpace::new(Arc::new(Module::new("App.dll", "App")), "System.Runtime");
//! let program = TypeDef::new("App", "Program");
//! let method = MethodDef::new("Run", symbols.core_type("System", "Void"));
//! let mut body = MethodBody::new();
//! body.push(Instruction::new(OpCode::Ret));
//!
//! let config = WeaverConfig::default();
//! let report = ModuleWeaver::new(&config, &symbols)
//!     .weave(vec![MethodJob::new(&program, &method, &mut body)])?;
//! assert!(!report.has_errors());
//! # Ok::<(), cilweave::Error>(())
//! ```

mod callsite;
mod consumer;
mod diagnostics;
mod fieldref;
mod labels;
mod locals;
mod method;
mod methodref;
mod sequence;
mod stack;
mod typeref;
mod vocabulary;

use log::debug;
use rayon::prelude::*;

use crate::{
    assembly::MethodBody,
    config::WeaverConfig,
    metadata::{MethodDef, SymbolSpace, TypeDef},
    Result,
};

pub use diagnostics::{
    Diagnostic, MethodStatus, Severity, SourceLocation, WeaveOutcome, WeaveReport,
};
pub use method::{MethodWeaver, STUB_MESSAGE};
pub use vocabulary::{classify, BuilderCall, EmitArgument, IlCall, MarkerCall};

/// One method body to weave, with the definitions it belongs to.
pub struct MethodJob<'a> {
    /// Type declaring the method
    pub declaring_type: &'a TypeDef,
    /// Signature of the method
    pub method: &'a MethodDef,
    /// The body, rewritten in place
    pub body: &'a mut MethodBody,
}

impl<'a> MethodJob<'a> {
    /// Creates a job for `body`.
    pub fn new(declaring_type: &'a TypeDef, method: &'a MethodDef, body: &'a mut MethodBody) -> Self {
        MethodJob {
            declaring_type,
            method,
            body,
        }
    }
}

/// Weaves every method of a module.
pub struct ModuleWeaver<'a> {
    config: &'a WeaverConfig,
    symbols: &'a SymbolSpace,
}

impl<'a> ModuleWeaver<'a> {
    /// Creates a module weaver.
    #[must_use]
    pub fn new(config: &'a WeaverConfig, symbols: &'a SymbolSpace) -> Self {
        ModuleWeaver { config, symbols }
    }

    /// Weaves `jobs`, in parallel when the configuration allows it.
    ///
    /// Outcomes are reported in the order of `jobs` regardless of scheduling. A method
    /// that fails to rewrite is stubbed and reported; it does not stop the pass.
    ///
    /// # Errors
    ///
    /// Returns the first internal error in job order, as [`crate::Error::MethodFailed`].
    pub fn weave(&self, jobs: Vec<MethodJob<'_>>) -> Result<WeaveReport> {
        debug!(
            "Weaving {} method(s){}",
            jobs.len(),
            if self.config.parallel { " in parallel" } else { "" }
        );

        let results: Vec<Result<WeaveOutcome>> = if self.config.parallel {
            jobs.into_par_iter().map(|job| self.weave_one(job)).collect()
        } else {
            jobs.into_iter().map(|job| self.weave_one(job)).collect()
        };

        let outcomes = results.into_iter().collect::<Result<Vec<_>>>()?;
        let report = WeaveReport { outcomes };
        debug!(
            "{}",
            report.summary().lines().next().unwrap_or_default()
        );
        Ok(report)
    }

    fn weave_one(&self, job: MethodJob<'_>) -> Result<WeaveOutcome> {
        MethodWeaver::new(self.config, self.symbols, job.declaring_type, job.method)
            .weave(job.body)
    }
}
