//! Stack safety analysis for the raw push primitive.
//!
//! `IL.Push(value)` is rewritten by deleting the call, leaving `value` on the
//! evaluation stack for the instructions that follow. That is only sound while the
//! slot holding `value` was written by straight-line code: once control flow merges,
//! or a handler is entered, the compiler may have spilled and reloaded stack slots
//! around the call.
//!
//! A single forward pass tracks, per instruction, the stack depth and a watermark: the
//! lowest depth the stack is known to have been reduced to since the last point where
//! its content became unreliable. A push whose argument slot (`depth - 1`) lies below
//! the watermark is reported.
//!
//! Joins follow "latest observation wins" for the depth and do not reconcile
//! disagreements; a join with more than one predecessor pins the watermark at the
//! merged depth.

use std::collections::{HashMap, HashSet};

use crate::assembly::{InstrId, Instruction, MethodBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct StackState {
    depth: u32,
    watermark: u32,
    forced: bool,
}

impl StackState {
    const fn forced(depth: u32, watermark: u32) -> Self {
        StackState {
            depth,
            watermark,
            forced: true,
        }
    }

    fn merge(self, other: StackState) -> StackState {
        if self.forced {
            return self;
        }
        if other.forced {
            return other;
        }

        StackState {
            depth: other.depth,
            watermark: self.watermark.max(other.watermark),
            forced: false,
        }
    }
}

/// Returns the push instructions whose argument is not reliably on the stack.
///
/// `is_push` selects the calls to check; `returns_value` tells what `ret` pops.
pub(crate) fn unsafe_pushes(
    body: &MethodBody,
    returns_value: bool,
    is_push: impl Fn(&Instruction) -> bool,
) -> HashSet<InstrId> {
    let mut predecessors: HashMap<InstrId, u32> = HashMap::new();
    for (id, instruction) in body.iter() {
        if !instruction.ends_flow() {
            if let Some(next) = body.next(id) {
                *predecessors.entry(next).or_default() += 1;
            }
        }
        for target in instruction.targets() {
            *predecessors.entry(target).or_default() += 1;
        }
    }

    let mut incoming: HashMap<InstrId, StackState> = HashMap::new();
    for handler in &body.exception_handlers {
        let entry = if handler.receives_exception() {
            StackState::forced(1, 1)
        } else {
            StackState::forced(0, 0)
        };
        incoming.insert(handler.handler_start, entry);
        if let Some(filter) = handler.filter_start {
            incoming.insert(filter, StackState::forced(1, 1));
        }
    }

    let mut flagged = HashSet::new();
    let mut fallthrough = Some(StackState::default());
    for (id, instruction) in body.iter() {
        let mut state = match (fallthrough, incoming.get(&id)) {
            (Some(current), Some(arriving)) => current.merge(*arriving),
            (Some(current), None) => current,
            (None, Some(arriving)) => *arriving,
            (None, None) => StackState::default(),
        };
        if !state.forced && predecessors.get(&id).copied().unwrap_or(0) >= 2 {
            state.watermark = state.watermark.max(state.depth);
        }

        if is_push(instruction) && (state.depth == 0 || state.depth - 1 < state.watermark) {
            flagged.insert(id);
        }

        let effect = instruction.stack_behavior(returns_value);
        if effect.clears {
            state = StackState::default();
        } else {
            state.depth = state.depth.saturating_sub(u32::from(effect.pops));
            state.watermark = state.watermark.min(state.depth);
            state.depth += u32::from(effect.pushes);
        }
        state.forced = false;

        for target in instruction.targets() {
            incoming
                .entry(target)
                .and_modify(|existing| *existing = existing.merge(state))
                .or_insert(state);
        }

        fallthrough = (!instruction.ends_flow()).then_some(state);
    }

    flagged
}
