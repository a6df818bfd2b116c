//! Sequence points: the mapping from instructions back to source locations.
//!
//! A sequence point is attached to the instruction it starts at. Points are stored on
//! the [`crate::assembly::MethodBody`] in instruction order.
//!
//! A sequence point is considered hidden if its start line is `0xFEEFEE`. This is used
//! to mark compiler-generated or non-user code.

use std::{fmt, sync::Arc};

use crate::assembly::InstrId;

/// Start line value of a hidden sequence point.
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// A single sequence point mapping an instruction to a source range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePoint {
    /// The instruction this point starts at.
    pub instruction: InstrId,
    /// Source document path.
    pub document: Arc<str>,
    /// Starting line in the source file.
    pub start_line: u32,
    /// Starting column in the source file.
    pub start_col: u16,
    /// Ending line in the source file.
    pub end_line: u32,
    /// Ending column in the source file.
    pub end_col: u16,
}

impl SequencePoint {
    /// Creates a sequence point covering a single source range.
    pub fn new(
        instruction: InstrId,
        document: impl Into<Arc<str>>,
        (start_line, start_col): (u32, u16),
        (end_line, end_col): (u32, u16),
    ) -> Self {
        SequencePoint {
            instruction,
            document: document.into(),
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Creates a hidden sequence point.
    pub fn hidden(instruction: InstrId, document: impl Into<Arc<str>>) -> Self {
        SequencePoint::new(instruction, document, (HIDDEN_LINE, 0), (HIDDEN_LINE, 0))
    }

    /// True if this is a hidden sequence point.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.start_line == HIDDEN_LINE
    }

    /// Returns a copy of this point attached to another instruction.
    #[must_use]
    pub fn moved_to(&self, instruction: InstrId) -> Self {
        SequencePoint {
            instruction,
            ..self.clone()
        }
    }

    /// Widens this point so that it also covers the range of `other`.
    pub fn extend(&mut self, other: &SequencePoint) {
        if other.is_hidden() || self.is_hidden() || other.document != self.document {
            return;
        }

        if (other.start_line, other.start_col) < (self.start_line, self.start_col) {
            self.start_line = other.start_line;
            self.start_col = other.start_col;
        }
        if (other.end_line, other.end_col) > (self.end_line, self.end_col) {
            self.end_line = other.end_line;
            self.end_col = other.end_col;
        }
    }
}

impl fmt::Display for SequencePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hidden() {
            return write!(f, "{} (hidden)", self.document);
        }
        write!(
            f,
            "{}({},{},{},{})",
            self.document, self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}
