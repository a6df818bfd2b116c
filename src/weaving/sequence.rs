//! Sequence point maintenance across rewrites.
//!
//! A rewritten call site covers the marker call and every instruction consumed as its
//! argument. The points attached to those instructions are collapsed onto the
//! instruction that remains at the site, so stepping through woven code still lands on
//! the user's source line.

use std::collections::{HashMap, HashSet};

use crate::{
    assembly::{InstrId, MethodBody, SequencePoint},
    weaving::diagnostics::SourceLocation,
};

/// Source locations of the body as it was before rewriting.
///
/// Used to attach diagnostics to instructions that may no longer exist.
#[derive(Debug, Default)]
pub(crate) struct SourceLocator {
    positions: HashMap<InstrId, usize>,
    points: Vec<(usize, SourceLocation)>,
}

impl SourceLocator {
    pub(crate) fn new(body: &MethodBody) -> Self {
        let positions = body.positions();
        let mut points: Vec<(usize, SourceLocation)> = body
            .sequence_points
            .iter()
            .filter(|sp| !sp.is_hidden())
            .filter_map(|sp| {
                positions
                    .get(&sp.instruction)
                    .map(|position| (*position, SourceLocation::from(sp)))
            })
            .collect();
        points.sort_by_key(|(position, _)| *position);

        SourceLocator { positions, points }
    }

    /// Nearest visible location at or before `id`.
    pub(crate) fn locate(&self, id: InstrId) -> Option<SourceLocation> {
        let position = *self.positions.get(&id)?;
        let index = self.points.partition_point(|(p, _)| *p <= position);
        index
            .checked_sub(1)
            .and_then(|i| self.points.get(i))
            .map(|(_, location)| location.clone())
    }
}

/// Moves sequence points off instructions removed by a rewrite.
#[derive(Debug)]
pub(crate) struct SequenceMapper {
    enabled: bool,
}

impl SequenceMapper {
    pub(crate) fn new(enabled: bool) -> Self {
        SequenceMapper { enabled }
    }

    /// Collapses the points of `site` onto `target`.
    ///
    /// `site` lists every instruction the rewrite touched; `target` is the instruction
    /// left at its position, if any. Points on the site are dropped when the target
    /// already has a point of its own. A target directly preceded by a prefix carrying a
    /// point extends that point instead, keeping prefix and prefixed instruction on one
    /// step.
    pub(crate) fn map_site(&self, body: &mut MethodBody, site: &[InstrId], target: Option<InstrId>) {
        if !self.enabled {
            return;
        }

        let site: HashSet<InstrId> = site.iter().copied().collect();
        let (drained, kept): (Vec<SequencePoint>, Vec<SequencePoint>) =
            std::mem::take(&mut body.sequence_points)
                .into_iter()
                .partition(|sp| site.contains(&sp.instruction));
        body.sequence_points = kept;

        let Some(target) = target else {
            return;
        };
        if drained.is_empty() {
            return;
        }
        if !site.contains(&target)
            && body.sequence_points.iter().any(|sp| sp.instruction == target)
        {
            return;
        }

        let earliest = drained
            .iter()
            .filter(|sp| !sp.is_hidden())
            .min_by_key(|sp| (sp.start_line, sp.start_col))
            .or_else(|| drained.first());
        let Some(earliest) = earliest else {
            return;
        };

        let prefix = body
            .prev(target)
            .filter(|prev| body.get(*prev).is_some_and(|i| i.is_prefix()));
        if let Some(prefix) = prefix {
            if let Some(point) = body
                .sequence_points
                .iter_mut()
                .find(|sp| sp.instruction == prefix)
            {
                point.extend(earliest);
                return;
            }
        }

        body.sequence_points.push(earliest.moved_to(target));
    }

    /// Drops points on unlinked instructions and restores program order.
    pub(crate) fn finish(&self, body: &mut MethodBody) {
        body.prune_sequence_points();
        let positions = body.positions();
        body.sequence_points
            .sort_by_key(|sp| positions.get(&sp.instruction).copied().unwrap_or(usize::MAX));
        body.sequence_points.dedup_by_key(|sp| sp.instruction);
    }
}
