//! Exception handler regions of a method body.
//!
//! Regions reference instructions by [`InstrId`] instead of byte offsets, so they stay
//! valid while the body is rewritten. An end reference of `None` means the region
//! extends to the end of the method body.

use bitflags::bitflags;

use crate::{assembly::InstrId, metadata::TypeSig};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    ///
    /// These flags determine how the exception handler processes exceptions and
    /// control flow within try/catch/finally blocks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause; `catch_type` names the caught type.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        ///
        /// The filter block starts at `filter_start` and runs before the handler.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// One protected region and its handler.
///
/// # Layout
///
/// ```text
/// try_start .. try_end             protected code
/// [filter_start .. handler_start]  filter block, FILTER only
/// handler_start .. handler_end     handler code
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    /// Kind of clause
    pub flags: ExceptionHandlerFlags,
    /// First instruction of the protected region
    pub try_start: InstrId,
    /// First instruction after the protected region, `None` for end of body
    pub try_end: Option<InstrId>,
    /// First instruction of the filter block, for filter clauses
    pub filter_start: Option<InstrId>,
    /// First instruction of the handler
    pub handler_start: InstrId,
    /// First instruction after the handler, `None` for end of body
    pub handler_end: Option<InstrId>,
    /// Caught exception type, for typed clauses
    pub catch_type: Option<TypeSig>,
}

impl ExceptionHandler {
    /// Returns `true` for a typed catch clause.
    #[must_use]
    pub fn is_catch(&self) -> bool {
        self.flags == ExceptionHandlerFlags::EXCEPTION
    }

    /// Returns `true` for a filter clause.
    #[must_use]
    pub fn is_filter(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FILTER)
    }

    /// Returns `true` for a finally or fault clause.
    #[must_use]
    pub fn is_finally_or_fault(&self) -> bool {
        self.flags
            .intersects(ExceptionHandlerFlags::FINALLY | ExceptionHandlerFlags::FAULT)
    }

    /// Returns `true` if the handler (and filter) entry receives the exception object on the stack.
    #[must_use]
    pub fn receives_exception(&self) -> bool {
        self.is_catch() || self.is_filter()
    }

    /// All instruction ids this region refers to, in declaration order.
    #[must_use]
    pub fn boundaries(&self) -> Vec<InstrId> {
        let mut ids = vec![self.try_start];
        ids.extend(self.try_end);
        ids.extend(self.filter_start);
        ids.push(self.handler_start);
        ids.extend(self.handler_end);
        ids
    }

    /// Returns `true` if any instruction reference equals `id`.
    #[must_use]
    pub fn references(&self, id: InstrId) -> bool {
        self.boundaries().contains(&id)
    }
}
