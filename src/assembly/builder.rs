//! Label-based assembler for method bodies.
//!
//! [`BodyBuilder`] appends instructions one at a time and lets branches, switch tables
//! and exception handler regions refer to named labels, including labels defined later.
//! Labels are resolved when the body is finished.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::assembly::{BodyBuilder, OpCode};
//!
//! let mut builder = BodyBuilder::new();
//! builder.emit(OpCode::Ldarg0)?;
//! builder.emit_branch(OpCode::BrtrueS, "one")?;
//! builder.emit(OpCode::LdcI40)?;
//! builder.emit(OpCode::Ret)?;
//! builder.define_label("one")?;
//! builder.emit(OpCode::LdcI41)?;
//! builder.emit(OpCode::Ret)?;
//!
//! let body = builder.finish()?;
//! assert_eq!(body.len(), 6);
//! # Ok::<(), cilweave::Error>(())
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    assembly::{
        ExceptionHandler, ExceptionHandlerFlags, InstrId, Instruction, LocalVariable,
        MethodBody, OpCode, Operand, SequencePoint,
    },
    metadata::TypeSig,
    Result,
};

struct PendingHandler {
    flags: ExceptionHandlerFlags,
    catch_type: Option<TypeSig>,
    try_range: (String, String),
    handler_range: (String, String),
    filter: Option<String>,
}

/// Builds a [`MethodBody`] from instructions and named labels.
pub struct BodyBuilder {
    body: MethodBody,
    emitted: Vec<InstrId>,
    labels: HashMap<String, usize>,
    fixups: Vec<(InstrId, Vec<String>)>,
    handlers: Vec<PendingHandler>,
    pending_point: Option<(Arc<str>, (u32, u16), (u32, u16))>,
}

impl Default for BodyBuilder {
    fn default() -> Self {
        BodyBuilder::new()
    }
}

impl BodyBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        BodyBuilder {
            body: MethodBody::new(),
            emitted: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            handlers: Vec::new(),
            pending_point: None,
        }
    }

    /// Appends an instruction without operand.
    ///
    /// # Errors
    ///
    /// Returns an error if `opcode` requires an operand.
    pub fn emit(&mut self, opcode: OpCode) -> Result<InstrId> {
        self.emit_with(opcode, Operand::None)
    }

    /// Appends an instruction with an operand.
    ///
    /// # Errors
    ///
    /// Returns an error if `operand` does not fit `opcode`.
    pub fn emit_with(&mut self, opcode: OpCode, operand: Operand) -> Result<InstrId> {
        let instruction = Instruction::create(opcode, operand)?;
        Ok(self.append(instruction))
    }

    /// Appends a branch to a label.
    ///
    /// # Errors
    ///
    /// Returns an error if `opcode` is not a branch or `leave`.
    pub fn emit_branch(&mut self, opcode: OpCode, label: &str) -> Result<InstrId> {
        if !opcode.operand_type().is_branch_target() {
            return Err(weaving_error!(
                PatternMismatch,
                None,
                "Opcode {} is not a branch",
                opcode
            ));
        }

        // Patched in finish(); the operand only has to have the right shape meanwhile.
        let id = self.append(Instruction {
            opcode,
            operand: Operand::Target(InstrId::new(0)),
        });
        self.fixups.push((id, vec![label.to_string()]));
        Ok(id)
    }

    /// Appends a `switch` over the given labels.
    ///
    /// # Errors
    ///
    /// Currently infallible; returns `Result` for symmetry with the other emitters.
    pub fn emit_switch(&mut self, labels: &[&str]) -> Result<InstrId> {
        let id = self.append(Instruction {
            opcode: OpCode::Switch,
            operand: Operand::Switch(vec![InstrId::new(0); labels.len()]),
        });
        self.fixups
            .push((id, labels.iter().map(ToString::to_string).collect()));
        Ok(id)
    }

    /// Defines `name` at the position of the next emitted instruction.
    ///
    /// # Errors
    ///
    /// Returns an error if the label is already defined.
    pub fn define_label(&mut self, name: &str) -> Result<()> {
        if self.labels.contains_key(name) {
            return Err(weaving_error!(
                Structural,
                None,
                "Label {} is already defined",
                name
            ));
        }
        self.labels.insert(name.to_string(), self.emitted.len());
        Ok(())
    }

    /// Declares a local variable and returns its index.
    pub fn local(&mut self, local: LocalVariable) -> u16 {
        self.body.locals.push(local);
        u16::try_from(self.body.locals.len() - 1).unwrap_or(u16::MAX)
    }

    /// Attaches a sequence point to the next emitted instruction.
    pub fn sequence_point(&mut self, document: &str, start: (u32, u16), end: (u32, u16)) {
        self.pending_point = Some((Arc::from(document), start, end));
    }

    /// Adds an exception handler whose boundaries are labels.
    ///
    /// Each range is `(start, end)`; an end label defined after the last instruction
    /// means the end of the body. `filter` names the filter block start for
    /// [`ExceptionHandlerFlags::FILTER`] clauses.
    pub fn exception_handler(
        &mut self,
        flags: ExceptionHandlerFlags,
        catch_type: Option<TypeSig>,
        try_range: (&str, &str),
        handler_range: (&str, &str),
        filter: Option<&str>,
    ) {
        self.handlers.push(PendingHandler {
            flags,
            catch_type,
            try_range: (try_range.0.to_string(), try_range.1.to_string()),
            handler_range: (handler_range.0.to_string(), handler_range.1.to_string()),
            filter: filter.map(ToString::to_string),
        });
    }

    /// Resolves all labels and returns the body.
    ///
    /// # Errors
    ///
    /// Returns an error for undefined labels and for branches to the end of the body.
    pub fn finish(mut self) -> Result<MethodBody> {
        for (id, labels) in std::mem::take(&mut self.fixups) {
            let targets = labels
                .iter()
                .map(|label| self.target(label))
                .collect::<Result<Vec<_>>>()?;
            let instruction = self.body.instruction_mut(id)?;
            instruction.operand = match instruction.operand {
                Operand::Switch(_) => Operand::Switch(targets),
                _ => Operand::Target(targets[0]),
            };
        }

        for pending in std::mem::take(&mut self.handlers) {
            let handler = ExceptionHandler {
                flags: pending.flags,
                try_start: self.target(&pending.try_range.0)?,
                try_end: self.boundary(&pending.try_range.1)?,
                filter_start: match &pending.filter {
                    Some(label) => Some(self.target(label)?),
                    None => None,
                },
                handler_start: self.target(&pending.handler_range.0)?,
                handler_end: self.boundary(&pending.handler_range.1)?,
                catch_type: pending.catch_type,
            };
            self.body.exception_handlers.push(handler);
        }

        Ok(self.body)
    }

    fn append(&mut self, instruction: Instruction) -> InstrId {
        let id = self.body.push(instruction);
        self.emitted.push(id);
        if let Some((document, start, end)) = self.pending_point.take() {
            self.body
                .sequence_points
                .push(SequencePoint::new(id, document, start, end));
        }
        id
    }

    fn boundary(&self, label: &str) -> Result<Option<InstrId>> {
        match self.labels.get(label) {
            Some(position) => Ok(self.emitted.get(*position).copied()),
            None => Err(weaving_error!(NotFound, None, "Undefined label: {}", label)),
        }
    }

    fn target(&self, label: &str) -> Result<InstrId> {
        self.boundary(label)?.ok_or_else(|| {
            weaving_error!(
                Structural,
                None,
                "Label {} is defined at the end of the body",
                label
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_backward_labels() {
        let mut builder = BodyBuilder::new();
        builder.define_label("top").unwrap();
        let first = builder.emit(OpCode::Nop).unwrap();
        let fwd = builder.emit_branch(OpCode::Br, "end").unwrap();
        let back = builder.emit_branch(OpCode::BrS, "top").unwrap();
        builder.define_label("end").unwrap();
        let ret = builder.emit(OpCode::Ret).unwrap();

        let body = builder.finish().unwrap();
        assert_eq!(body.instruction(fwd).unwrap().targets(), vec![ret]);
        assert_eq!(body.instruction(back).unwrap().targets(), vec![first]);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn switch_targets() {
        let mut builder = BodyBuilder::new();
        let switch = builder.emit_switch(&["a", "b"]).unwrap();
        builder.define_label("a").unwrap();
        let a = builder.emit(OpCode::Nop).unwrap();
        builder.define_label("b").unwrap();
        let b = builder.emit(OpCode::Ret).unwrap();

        let body = builder.finish().unwrap();
        assert_eq!(body.instruction(switch).unwrap().targets(), vec![a, b]);
    }

    #[test]
    fn undefined_label_fails() {
        let mut builder = BodyBuilder::new();
        builder.emit_branch(OpCode::Br, "nowhere").unwrap();
        let error = builder.finish().unwrap_err();
        assert!(error.to_string().contains("Undefined label: nowhere"));
    }

    #[test]
    fn duplicate_label_fails() {
        let mut builder = BodyBuilder::new();
        builder.define_label("x").unwrap();
        assert!(builder.define_label("x").is_err());
    }

    #[test]
    fn handlers_and_sequence_points() {
        let mut builder = BodyBuilder::new();
        builder.define_label("try").unwrap();
        builder.sequence_point("a.cs", (3, 5), (3, 20));
        let nop = builder.emit(OpCode::Nop).unwrap();
        builder.emit_branch(OpCode::Leave, "end").unwrap();
        builder.define_label("handler").unwrap();
        let pop = builder.emit(OpCode::Pop).unwrap();
        builder.emit_branch(OpCode::Leave, "end").unwrap();
        builder.define_label("end").unwrap();
        builder.exception_handler(
            ExceptionHandlerFlags::EXCEPTION,
            None,
            ("try", "handler"),
            ("handler", "end"),
            None,
        );
        let ret = builder.emit(OpCode::Ret).unwrap();

        let body = builder.finish().unwrap();
        let handler = &body.exception_handlers[0];
        assert_eq!(handler.try_start, nop);
        assert_eq!(handler.try_end, Some(pop));
        assert_eq!(handler.handler_end, Some(ret));
        assert_eq!(body.sequence_points.len(), 1);
        assert_eq!(body.sequence_points[0].instruction, nop);
    }

    #[test]
    fn non_branch_rejected() {
        let mut builder = BodyBuilder::new();
        assert!(builder.emit_branch(OpCode::Add, "x").is_err());
        assert!(builder.emit(OpCode::LdcI4).is_err());
    }
}
