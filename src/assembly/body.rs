//! Mutable method body: an arena of instructions linked in program order.
//!
//! [`MethodBody`] stores every instruction in an arena slot addressed by [`InstrId`].
//! The program order is a doubly-linked list threaded through the slots, so an
//! instruction can be removed, replaced or inserted next to any other without
//! shifting or invalidating the ids held elsewhere (branch operands, exception
//! handler regions, labels, sequence points).
//!
//! # Mutation rules
//!
//! - [`MethodBody::replace`] overwrites an instruction in place; every reference to it
//!   now refers to the new instruction.
//! - [`MethodBody::remove`] unlinks an instruction and redirects every branch and
//!   handler reference to its successor, or to its predecessor when it was the last
//!   instruction. Region end references fall back to `None` (end of body) instead.
//! - [`MethodBody::replace_with`] splices a detached instruction (see
//!   [`MethodBody::create`]) into the position of another one, moving all references.
//!
//! Sequence points are not redirected: callers decide how debug information follows
//! a rewrite, and [`MethodBody::prune_sequence_points`] drops the dangling ones.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::assembly::{Instruction, MethodBody, OpCode};
//!
//! let mut body = MethodBody::new();
//! let a = body.push(Instruction::new(OpCode::LdcI42));
//! let b = body.push(Instruction::new(OpCode::Nop));
//! let c = body.push(Instruction::new(OpCode::Ret));
//!
//! body.remove(b)?;
//! assert_eq!(body.next(a), Some(c));
//! assert_eq!(body.len(), 2);
//! # Ok::<(), cilweave::Error>(())
//! ```

use std::{collections::HashMap, fmt};

use crate::{
    assembly::{ExceptionHandler, InstrId, Instruction, Operand, SequencePoint},
    metadata::TypeSig,
    Result,
};

/// A local variable slot.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    /// Debug name, if known
    pub name: Option<String>,
    /// Declared type, wrapped in [`TypeSig::Pinned`] for pinned locals
    pub local_type: TypeSig,
}

impl LocalVariable {
    /// Creates an anonymous local.
    #[must_use]
    pub fn new(local_type: TypeSig) -> Self {
        LocalVariable {
            name: None,
            local_type,
        }
    }

    /// Creates a named local.
    #[must_use]
    pub fn named(name: impl Into<String>, local_type: TypeSig) -> Self {
        LocalVariable {
            name: Some(name.into()),
            local_type,
        }
    }

    /// True for pinned locals.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.local_type.is_pinned()
    }
}

#[derive(Debug, Clone)]
struct Node {
    instruction: Instruction,
    prev: Option<InstrId>,
    next: Option<InstrId>,
    linked: bool,
}

/// The mutable code of one method.
#[derive(Debug, Clone)]
pub struct MethodBody {
    nodes: Vec<Node>,
    first: Option<InstrId>,
    last: Option<InstrId>,
    len: usize,
    /// Exception handler regions, in metadata order (innermost first)
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Local variable table
    pub locals: Vec<LocalVariable>,
    /// Whether locals are zero-initialized on entry
    pub init_locals: bool,
    /// Sequence points in instruction order
    pub sequence_points: Vec<SequencePoint>,
}

impl Default for MethodBody {
    fn default() -> Self {
        MethodBody::new()
    }
}

impl MethodBody {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        MethodBody {
            nodes: Vec::new(),
            first: None,
            last: None,
            len: 0,
            exception_handlers: Vec::new(),
            locals: Vec::new(),
            init_locals: true,
            sequence_points: Vec::new(),
        }
    }

    /// Number of linked instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the body has no linked instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First instruction in program order.
    #[must_use]
    pub fn first(&self) -> Option<InstrId> {
        self.first
    }

    /// Last instruction in program order.
    #[must_use]
    pub fn last(&self) -> Option<InstrId> {
        self.last
    }

    /// Successor of a linked instruction.
    #[must_use]
    pub fn next(&self, id: InstrId) -> Option<InstrId> {
        self.node(id).and_then(|node| node.next)
    }

    /// Predecessor of a linked instruction.
    #[must_use]
    pub fn prev(&self, id: InstrId) -> Option<InstrId> {
        self.node(id).and_then(|node| node.prev)
    }

    /// True if `id` is currently part of the instruction stream.
    #[must_use]
    pub fn contains(&self, id: InstrId) -> bool {
        self.node(id).is_some()
    }

    /// Returns the instruction for `id`, if it is linked.
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.node(id).map(|node| &node.instruction)
    }

    /// Returns the instruction for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Internal`] if `id` is not linked.
    pub fn instruction(&self, id: InstrId) -> Result<&Instruction> {
        self.get(id)
            .ok_or_else(|| internal_error!("Dangling instruction reference {}", id))
    }

    /// Returns the instruction for `id` mutably.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Internal`] if `id` is not linked.
    pub fn instruction_mut(&mut self, id: InstrId) -> Result<&mut Instruction> {
        match self.nodes.get_mut(id.index()) {
            Some(node) if node.linked => Ok(&mut node.instruction),
            _ => Err(internal_error!("Dangling instruction reference {}", id)),
        }
    }

    /// Returns a detached instruction, e.g. a label placeholder not yet spliced in.
    #[must_use]
    pub fn detached(&self, id: InstrId) -> Option<&Instruction> {
        self.nodes
            .get(id.index())
            .filter(|node| !node.linked)
            .map(|node| &node.instruction)
    }

    /// Iterates linked instructions in program order.
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instruction)> + '_ {
        let mut cursor = self.first;
        std::iter::from_fn(move || {
            let id = cursor?;
            let node = &self.nodes[id.index()];
            cursor = node.next;
            Some((id, &node.instruction))
        })
    }

    /// Collects the linked ids in program order.
    #[must_use]
    pub fn ids(&self) -> Vec<InstrId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Appends an instruction at the end of the stream.
    pub fn push(&mut self, instruction: Instruction) -> InstrId {
        let id = self.create(instruction);
        self.link_after_last(id);
        id
    }

    /// Allocates an instruction without linking it into the stream.
    ///
    /// Branch operands may already point at a detached instruction; it must be linked
    /// with [`MethodBody::insert_detached_before`] or [`MethodBody::replace_with`]
    /// before the body is finished.
    pub fn create(&mut self, instruction: Instruction) -> InstrId {
        let id = InstrId::new(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(Node {
            instruction,
            prev: None,
            next: None,
            linked: false,
        });
        id
    }

    /// Inserts a new instruction before `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Internal`] if `anchor` is not linked.
    pub fn insert_before(&mut self, anchor: InstrId, instruction: Instruction) -> Result<InstrId> {
        let id = self.create(instruction);
        self.insert_detached_before(anchor, id)?;
        Ok(id)
    }

    /// Inserts a new instruction after `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Internal`] if `anchor` is not linked.
    pub fn insert_after(&mut self, anchor: InstrId, instruction: Instruction) -> Result<InstrId> {
        let id = self.create(instruction);
        match self.next(anchor) {
            Some(next) => self.insert_detached_before(next, id)?,
            None => {
                if !self.contains(anchor) {
                    return Err(internal_error!("Dangling instruction reference {}", anchor));
                }
                self.link_after_last(id);
            }
        }
        Ok(id)
    }

    /// Links a detached instruction before `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Internal`] if `anchor` is not linked or `id` is not detached.
    pub fn insert_detached_before(&mut self, anchor: InstrId, id: InstrId) -> Result<()> {
        if !self.contains(anchor) {
            return Err(internal_error!("Dangling instruction reference {}", anchor));
        }
        if self.detached(id).is_none() {
            return Err(internal_error!("Instruction {} is already linked", id));
        }

        let prev = self.nodes[anchor.index()].prev;
        {
            let node = &mut self.nodes[id.index()];
            node.prev = prev;
            node.next = Some(anchor);
            node.linked = true;
        }
        self.nodes[anchor.index()].prev = Some(id);
        match prev {
            Some(prev) => self.nodes[prev.index()].next = Some(id),
            None => self.first = Some(id),
        }
        self.len += 1;
        Ok(())
    }

    /// Overwrites an instruction in place and returns the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Internal`] if `id` is not linked.
    pub fn replace(&mut self, id: InstrId, instruction: Instruction) -> Result<Instruction> {
        let slot = self.instruction_mut(id)?;
        Ok(std::mem::replace(slot, instruction))
    }

    /// Splices the detached instruction `new` into the position of `old`.
    ///
    /// All references to `old` are moved to `new`, and `old` is unlinked.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Internal`] if `old` is not linked or `new` is not detached.
    pub fn replace_with(&mut self, old: InstrId, new: InstrId) -> Result<Instruction> {
        self.insert_detached_before(old, new)?;
        self.redirect(old, Some(new), Some(new));
        self.unlink(old)
    }

    /// Removes an instruction, redirecting references to its neighbours.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Internal`] if `id` is not linked, or if a branch would be
    /// left without any target because the body becomes empty.
    pub fn remove(&mut self, id: InstrId) -> Result<Instruction> {
        if !self.contains(id) {
            return Err(internal_error!("Dangling instruction reference {}", id));
        }

        let next = self.next(id);
        let fallback = next.or_else(|| self.prev(id));
        if fallback.is_none() && self.is_referenced(id) {
            return Err(internal_error!(
                "Cannot remove {}: it is referenced and the body would be empty",
                id
            ));
        }

        self.redirect(id, fallback, next);
        self.unlink(id)
    }

    /// Removes every instruction and handler, keeping allocated ids unique.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.linked = false;
            node.prev = None;
            node.next = None;
        }
        self.first = None;
        self.last = None;
        self.len = 0;
        self.exception_handlers.clear();
        self.sequence_points.clear();
    }

    /// Drops sequence points whose instruction is no longer linked.
    pub fn prune_sequence_points(&mut self) {
        let nodes = &self.nodes;
        self.sequence_points
            .retain(|sp| nodes.get(sp.instruction.index()).is_some_and(|n| n.linked));
    }

    /// Computes the byte offset of every linked instruction.
    #[must_use]
    pub fn offsets(&self) -> HashMap<InstrId, u32> {
        let mut offsets = HashMap::with_capacity(self.len);
        let mut offset = 0;
        for (id, instruction) in self.iter() {
            offsets.insert(id, offset);
            offset += instruction.size();
        }
        offsets
    }

    /// Position of every linked instruction in program order.
    #[must_use]
    pub fn positions(&self) -> HashMap<InstrId, usize> {
        self.iter()
            .enumerate()
            .map(|(position, (id, _))| (id, position))
            .collect()
    }

    /// Checks that every branch operand and handler boundary refers to a linked instruction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Internal`] naming the first dangling reference.
    pub fn validate(&self) -> Result<()> {
        for (id, instruction) in self.iter() {
            for target in instruction.targets() {
                if !self.contains(target) {
                    return Err(internal_error!(
                        "Instruction {} ({}) branches to dangling {}",
                        id,
                        instruction,
                        target
                    ));
                }
            }
        }

        for handler in &self.exception_handlers {
            if let Some(dangling) = handler.boundaries().into_iter().find(|b| !self.contains(*b)) {
                return Err(internal_error!(
                    "Exception handler refers to dangling {}",
                    dangling
                ));
            }
        }

        Ok(())
    }

    fn node(&self, id: InstrId) -> Option<&Node> {
        self.nodes.get(id.index()).filter(|node| node.linked)
    }

    fn link_after_last(&mut self, id: InstrId) {
        let last = self.last;
        {
            let node = &mut self.nodes[id.index()];
            node.prev = last;
            node.next = None;
            node.linked = true;
        }
        match last {
            Some(last) => self.nodes[last.index()].next = Some(id),
            None => self.first = Some(id),
        }
        self.last = Some(id);
        self.len += 1;
    }

    fn unlink(&mut self, id: InstrId) -> Result<Instruction> {
        let (prev, next) = match self.nodes.get(id.index()) {
            Some(node) if node.linked => (node.prev, node.next),
            _ => return Err(internal_error!("Dangling instruction reference {}", id)),
        };

        match prev {
            Some(prev) => self.nodes[prev.index()].next = next,
            None => self.first = next,
        }
        match next {
            Some(next) => self.nodes[next.index()].prev = prev,
            None => self.last = prev,
        }

        let node = &mut self.nodes[id.index()];
        node.linked = false;
        node.prev = None;
        node.next = None;
        self.len -= 1;
        Ok(node.instruction.clone())
    }

    fn is_referenced(&self, id: InstrId) -> bool {
        self.iter().any(|(_, i)| i.targets().contains(&id))
            || self.exception_handlers.iter().any(|h| h.references(id))
    }

    /// Moves references from `old` to `start` (branches, region starts) or `end` (region ends).
    fn redirect(&mut self, old: InstrId, start: Option<InstrId>, end: Option<InstrId>) {
        if let Some(start) = start {
            for node in self.nodes.iter_mut().filter(|n| n.linked) {
                match &mut node.instruction.operand {
                    Operand::Target(target) if *target == old => *target = start,
                    Operand::Switch(targets) => {
                        for target in targets.iter_mut().filter(|t| **t == old) {
                            *target = start;
                        }
                    }
                    _ => {}
                }
            }
        }

        for handler in &mut self.exception_handlers {
            if let Some(start) = start {
                if handler.try_start == old {
                    handler.try_start = start;
                }
                if handler.handler_start == old {
                    handler.handler_start = start;
                }
                if handler.filter_start == Some(old) {
                    handler.filter_start = Some(start);
                }
            }
            if handler.try_end == Some(old) {
                handler.try_end = end;
            }
            if handler.handler_end == Some(old) {
                handler.handler_end = end;
            }
        }
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let offsets = self.offsets();
        let label = |id: &InstrId| match offsets.get(id) {
            Some(offset) => format!("IL_{offset:04x}"),
            None => format!("{id}"),
        };

        for (id, instruction) in self.iter() {
            write!(f, "{}: {}", label(&id), instruction.opcode)?;
            match &instruction.operand {
                Operand::Target(target) => write!(f, " {}", label(target))?,
                Operand::Switch(targets) => {
                    let targets: Vec<String> = targets.iter().map(label).collect();
                    write!(f, " ({})", targets.join(", "))?;
                }
                Operand::None => {}
                _ => {
                    let text = instruction.to_string();
                    let operand = text
                        .strip_prefix(instruction.opcode.name())
                        .unwrap_or(&text);
                    f.write_str(operand)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{ExceptionHandlerFlags, OpCode};

    fn body_of(opcodes: &[OpCode]) -> (MethodBody, Vec<InstrId>) {
        let mut body = MethodBody::new();
        let ids = opcodes
            .iter()
            .map(|op| body.push(Instruction::new(*op)))
            .collect();
        (body, ids)
    }

    #[test]
    fn push_and_iterate() {
        let (body, ids) = body_of(&[OpCode::LdcI41, OpCode::LdcI42, OpCode::Add, OpCode::Ret]);
        assert_eq!(body.len(), 4);
        assert_eq!(body.ids(), ids);
        assert_eq!(body.first(), Some(ids[0]));
        assert_eq!(body.last(), Some(ids[3]));
        assert_eq!(body.prev(ids[0]), None);
    }

    #[test]
    fn remove_redirects_branches_to_next() {
        let (mut body, ids) = body_of(&[OpCode::Nop, OpCode::Nop, OpCode::Ret]);
        body.replace(ids[0], Instruction::create(OpCode::Br, Operand::Target(ids[1])).unwrap())
            .unwrap();

        body.remove(ids[1]).unwrap();
        assert_eq!(body.instruction(ids[0]).unwrap().targets(), vec![ids[2]]);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn remove_last_redirects_to_prev() {
        let (mut body, ids) = body_of(&[OpCode::Nop, OpCode::Ret, OpCode::Nop]);
        body.replace(ids[0], Instruction::create(OpCode::Br, Operand::Target(ids[2])).unwrap())
            .unwrap();

        body.remove(ids[2]).unwrap();
        assert_eq!(body.instruction(ids[0]).unwrap().targets(), vec![ids[1]]);
    }

    #[test]
    fn region_end_falls_back_to_end_of_body() {
        let (mut body, ids) = body_of(&[OpCode::Nop, OpCode::Nop, OpCode::Pop]);
        body.exception_handlers.push(ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_start: ids[0],
            try_end: Some(ids[1]),
            filter_start: None,
            handler_start: ids[1],
            handler_end: Some(ids[2]),
            catch_type: None,
        });

        body.remove(ids[2]).unwrap();
        let handler = &body.exception_handlers[0];
        assert_eq!(handler.handler_end, None);

        body.remove(ids[1]).unwrap();
        let handler = &body.exception_handlers[0];
        assert_eq!(handler.try_end, None);
        assert_eq!(handler.handler_start, ids[0]);
    }

    #[test]
    fn replace_with_moves_references() {
        let (mut body, ids) = body_of(&[OpCode::Nop, OpCode::Nop, OpCode::Ret]);
        body.replace(ids[0], Instruction::create(OpCode::Br, Operand::Target(ids[1])).unwrap())
            .unwrap();

        let placeholder = body.create(Instruction::new(OpCode::Nop));
        assert!(body.detached(placeholder).is_some());
        body.replace_with(ids[1], placeholder).unwrap();

        assert!(!body.contains(ids[1]));
        assert_eq!(body.next(ids[0]), Some(placeholder));
        assert_eq!(body.instruction(ids[0]).unwrap().targets(), vec![placeholder]);
    }

    #[test]
    fn validate_reports_detached_targets() {
        let mut body = MethodBody::new();
        let placeholder = body.create(Instruction::new(OpCode::Nop));
        body.push(Instruction::create(OpCode::Br, Operand::Target(placeholder)).unwrap());
        assert!(body.validate().is_err());

        let ret = body.push(Instruction::new(OpCode::Ret));
        body.insert_detached_before(ret, placeholder).unwrap();
        assert!(body.validate().is_ok());
    }

    #[test]
    fn insert_after_last() {
        let (mut body, ids) = body_of(&[OpCode::Nop]);
        let ret = body.insert_after(ids[0], Instruction::new(OpCode::Ret)).unwrap();
        assert_eq!(body.last(), Some(ret));
        let ldc = body.insert_before(ret, Instruction::new(OpCode::LdcI40)).unwrap();
        assert_eq!(body.ids(), vec![ids[0], ldc, ret]);
    }

    #[test]
    fn offsets_and_display() {
        let mut body = MethodBody::new();
        let ldc = body.push(Instruction::create(OpCode::LdcI4, Operand::Int32(42)).unwrap());
        let ret = body.push(Instruction::new(OpCode::Ret));
        body.insert_before(ret, Instruction::create(OpCode::Br, Operand::Target(ret)).unwrap())
            .unwrap();

        let offsets = body.offsets();
        assert_eq!(offsets[&ldc], 0);
        assert_eq!(offsets[&ret], 10);
        assert_eq!(
            body.to_string(),
            "IL_0000: ldc.i4 42\nIL_0005: br IL_000a\nIL_000a: ret\n"
        );
    }

    #[test]
    fn clear_keeps_ids_unique() {
        let (mut body, ids) = body_of(&[OpCode::Nop, OpCode::Ret]);
        body.clear();
        assert!(body.is_empty());
        let fresh = body.push(Instruction::new(OpCode::Ret));
        assert!(!ids.contains(&fresh));
    }

    #[test]
    fn prune_sequence_points() {
        let (mut body, ids) = body_of(&[OpCode::Nop, OpCode::Ret]);
        body.sequence_points
            .push(SequencePoint::new(ids[0], "a.cs", (1, 1), (1, 5)));
        body.sequence_points
            .push(SequencePoint::new(ids[1], "a.cs", (2, 1), (2, 5)));
        body.remove(ids[0]).unwrap();
        body.prune_sequence_points();
        assert_eq!(body.sequence_points.len(), 1);
        assert_eq!(body.sequence_points[0].instruction, ids[1]);
    }
}
