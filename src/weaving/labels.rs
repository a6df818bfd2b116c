//! Symbolic branch targets.
//!
//! A label is created the first time it is referenced or defined. Its placeholder is a
//! detached `nop` allocated up front, so branches can point at it before the label is
//! marked; marking splices the placeholder into the stream in place of the `MarkLabel`
//! call. A label referenced but never marked fails the method at its first reference.

use std::collections::HashMap;

use crate::{
    assembly::{InstrId, Instruction, MethodBody, OpCode},
    Result,
};

#[derive(Debug)]
struct Label {
    name: String,
    placeholder: InstrId,
    first_reference: Option<InstrId>,
    defined_at: Option<InstrId>,
}

/// Maps label names to placeholder instructions for one method.
#[derive(Debug, Default)]
pub(crate) struct LabelMapper {
    labels: Vec<Label>,
    by_name: HashMap<String, usize>,
}

impl LabelMapper {
    pub(crate) fn new() -> Self {
        LabelMapper::default()
    }

    /// Records a branch from `from` to `name`, returning the instruction to target.
    pub(crate) fn reference(
        &mut self,
        body: &mut MethodBody,
        name: &str,
        from: InstrId,
    ) -> Result<InstrId> {
        let label = self.get_or_create(body, name)?;
        label.first_reference.get_or_insert(from);
        Ok(label.placeholder)
    }

    /// Marks `name` at the position of `at`, which is replaced by the placeholder.
    pub(crate) fn define(&mut self, body: &mut MethodBody, name: &str, at: InstrId) -> Result<InstrId> {
        let label = self.get_or_create(body, name)?;
        if label.defined_at.is_some() {
            return Err(weaving_error!(
                Structural,
                Some(at),
                "Label {} is already defined",
                name
            ));
        }

        label.defined_at = Some(at);
        let placeholder = label.placeholder;
        body.replace_with(at, placeholder)?;
        Ok(placeholder)
    }

    /// Checks that every referenced label was marked.
    ///
    /// Returns a warning for every label that was marked but never referenced.
    pub(crate) fn finish(&self) -> Result<Vec<(String, Option<InstrId>)>> {
        let mut warnings = Vec::new();
        for label in &self.labels {
            match (label.first_reference, label.defined_at) {
                (Some(reference), None) => {
                    return Err(weaving_error!(
                        NotFound,
                        Some(reference),
                        "Undefined label: {}",
                        label.name
                    ))
                }
                (None, Some(defined_at)) => warnings.push((
                    format!("Unused label: {}", label.name),
                    Some(defined_at),
                )),
                _ => {}
            }
        }
        Ok(warnings)
    }

    fn get_or_create(&mut self, body: &mut MethodBody, name: &str) -> Result<&mut Label> {
        if name.is_empty() {
            return Err(weaving_error!(PatternMismatch, None, "Label name cannot be empty"));
        }

        let index = match self.by_name.get(name) {
            Some(index) => *index,
            None => {
                let placeholder = body.create(Instruction::new(OpCode::Nop));
                self.labels.push(Label {
                    name: name.to_string(),
                    placeholder,
                    first_reference: None,
                    defined_at: None,
                });
                self.by_name.insert(name.to_string(), self.labels.len() - 1);
                self.labels.len() - 1
            }
        };

        self.labels
            .get_mut(index)
            .ok_or_else(|| internal_error!("Label table out of sync for {}", name))
    }
}
