//! Basic block membership of the instructions in a method body.
//!
//! A new block starts at the first instruction, at every branch or switch target, at
//! every exception handler boundary, and after every instruction that ends a block
//! (branches, returns, throws, `leave`, `endfinally`, `endfilter`).
//!
//! Membership is computed once, on the original body. Instructions created later have
//! no block, which makes them compare unequal to every original instruction.

use std::collections::HashSet;

use crate::assembly::{InstrId, MethodBody};

/// Basic block index of every instruction that existed when it was computed.
#[derive(Debug, Clone, Default)]
pub struct BasicBlocks {
    membership: Vec<Option<u32>>,
    count: u32,
}

impl BasicBlocks {
    /// Computes block membership for the current body.
    #[must_use]
    pub fn compute(body: &MethodBody) -> Self {
        let mut leaders: HashSet<InstrId> = HashSet::new();
        leaders.extend(body.first());
        for (id, instruction) in body.iter() {
            leaders.extend(instruction.targets());
            if instruction.is_terminal() {
                leaders.extend(body.next(id));
            }
        }
        for handler in &body.exception_handlers {
            leaders.extend(handler.boundaries());
        }

        let mut membership = Vec::new();
        let mut current: Option<u32> = None;
        let mut count = 0;
        for (id, _) in body.iter() {
            if current.is_none() || leaders.contains(&id) {
                current = Some(count);
                count += 1;
            }
            if membership.len() <= id.index() {
                membership.resize(id.index() + 1, None);
            }
            membership[id.index()] = current;
        }

        BasicBlocks { membership, count }
    }

    /// Block index of `id`, if it was part of the body when computed.
    #[must_use]
    pub fn block_of(&self, id: InstrId) -> Option<u32> {
        self.membership.get(id.index()).copied().flatten()
    }

    /// True if both instructions are known and belong to the same block.
    #[must_use]
    pub fn same_block(&self, a: InstrId, b: InstrId) -> bool {
        match (self.block_of(a), self.block_of(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// True if the body was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
