//! Partitioning a unit into its main body and nested subroutines.
//!
//! Subroutines are entered through `Jsr` and left through `Ret`. Their code is shared between
//! call sites and must be analysed on its own, so region discovery walks the unit without ever
//! following a subroutine call into its target. Calls are recorded as region boundaries instead,
//! and the walk continues at the call's return point.
//!
//! Every instruction is tagged with at most one region. The first region to reach an instruction
//! owns it; later walks treat tagged instructions as already visited.

use std::collections::VecDeque;

use tracing::debug;

use crate::{
    analysis::graph::{InstrKind, InstructionGraph},
    Result,
};

/// Identifier of a region; the main body is region 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(pub usize);

impl RegionId {
    /// The region containing the entry instruction.
    pub const MAIN: RegionId = RegionId(0);

    /// Returns the raw index of the region.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A subroutine call crossing a region boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubroutineCall {
    /// Index of the `Jsr` instruction.
    pub site: usize,
    /// Index of the subroutine entry.
    pub target: usize,
}

/// The result of walking one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionScan {
    /// Instructions newly tagged by this walk, in discovery order.
    pub visited: Vec<usize>,
    /// Subroutine calls found inside the region, in discovery order.
    pub boundary_calls: Vec<SubroutineCall>,
}

/// A discovered region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Region identifier.
    pub id: RegionId,
    /// First instruction of the region.
    pub entry: usize,
    /// `Jsr` instructions entering the region; empty for the main region.
    pub callers: Vec<usize>,
    /// Number of instructions tagged with this region.
    pub size: usize,
}

/// The region tag of every instruction plus the region table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMap {
    tags: Vec<Option<RegionId>>,
    regions: Vec<Region>,
}

impl RegionMap {
    /// Returns the region of an instruction, `None` if it is unreachable.
    #[must_use]
    pub fn region_of(&self, index: usize) -> Option<RegionId> {
        self.tags.get(index).copied().flatten()
    }

    /// Returns the tags of all instructions.
    #[must_use]
    pub fn tags(&self) -> &[Option<RegionId>] {
        &self.tags
    }

    /// Returns all regions, main region first.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Returns a region by id.
    #[must_use]
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    /// Returns the instructions of a region in index order.
    #[must_use]
    pub fn instructions(&self, id: RegionId) -> Vec<usize> {
        self.tags
            .iter()
            .enumerate()
            .filter(|(_, tag)| **tag == Some(id))
            .map(|(index, _)| index)
            .collect()
    }
}

/// Region discovery over one instruction graph.
///
/// # Examples
///
/// ```rust
/// use flowscope::analysis::{CodeAssembler, RegionFinder, RegionId};
///
/// let mut asm = CodeAssembler::new();
/// let addr = asm.local(0);
/// asm.jsr("finally")?
///     .ret_void()?
///     .label("finally")?
///     .store(addr)?
///     .ret(0)?;
/// let graph = asm.finish()?;
///
/// let map = RegionFinder::partition(&graph)?;
/// assert_eq!(map.instructions(RegionId::MAIN), vec![0, 1]);
/// assert_eq!(map.instructions(RegionId(1)), vec![2, 3, 4]);
/// assert_eq!(map.regions()[1].callers, vec![0]);
/// # Ok::<(), flowscope::Error>(())
/// ```
pub struct RegionFinder<'a> {
    graph: &'a InstructionGraph,
    tags: Vec<Option<RegionId>>,
}

impl<'a> RegionFinder<'a> {
    /// Creates a finder with every instruction untagged.
    #[must_use]
    pub fn new(graph: &'a InstructionGraph) -> Self {
        Self {
            graph,
            tags: vec![None; graph.len()],
        }
    }

    /// Returns the current tags.
    #[must_use]
    pub fn tags(&self) -> &[Option<RegionId>] {
        &self.tags
    }

    /// Tags every instruction reachable from `entry` without entering subroutines.
    ///
    /// Normal and exception-handler successors are followed. A `Jsr` is recorded as a boundary
    /// call and the walk continues at its return point; `Return`, `Throw` and `Ret` end a path.
    /// Instructions that already carry a tag are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the walk steps outside the instruction sequence.
    pub fn find_region(&mut self, entry: usize, region: RegionId) -> Result<RegionScan> {
        let count = self.graph.len();
        let mut scan = RegionScan::default();
        let mut stack = vec![entry];

        while let Some(index) = stack.pop() {
            if index >= count {
                return Err(malformed_error!(
                    "Region {} walks past the end of the code at {} ({} instructions)",
                    region.0,
                    index,
                    count
                ));
            }
            if self.tags[index].is_some() {
                continue;
            }
            self.tags[index] = Some(region);
            scan.visited.push(index);

            let kind = self.graph.kind(index);
            let mut next = Vec::new();
            match kind {
                InstrKind::Jsr(target) => {
                    scan.boundary_calls.push(SubroutineCall {
                        site: index,
                        target: *target,
                    });
                    next.push(index + 1);
                }
                InstrKind::Return { .. } | InstrKind::Throw | InstrKind::Ret(_) => {}
                _ => {
                    next.extend(kind.branch_targets());
                    if kind.falls_through() {
                        next.push(index + 1);
                    }
                }
            }
            next.extend_from_slice(self.graph.exception_successors(index));

            stack.extend(next.into_iter().rev());
        }

        Ok(scan)
    }

    /// Partitions the whole unit.
    ///
    /// The main region starts at instruction 0. Every distinct subroutine target discovered
    /// afterwards becomes its own region, in breadth-first order of discovery. A call whose
    /// target was already tagged by another walk is attributed to the region owning the target.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a walk steps outside the instruction sequence.
    pub fn partition(graph: &InstructionGraph) -> Result<RegionMap> {
        let mut finder = RegionFinder::new(graph);
        let mut regions = Vec::new();
        let mut pending: VecDeque<SubroutineCall> = VecDeque::new();

        let scan = finder.find_region(0, RegionId::MAIN)?;
        regions.push(Region {
            id: RegionId::MAIN,
            entry: 0,
            callers: Vec::new(),
            size: scan.visited.len(),
        });
        pending.extend(scan.boundary_calls);

        while let Some(call) = pending.pop_front() {
            if let Some(owner) = finder.tags.get(call.target).copied().flatten() {
                let region = &mut regions[owner.0];
                if !region.callers.contains(&call.site) {
                    region.callers.push(call.site);
                }
                continue;
            }

            let id = RegionId(regions.len());
            let scan = finder.find_region(call.target, id)?;
            regions.push(Region {
                id,
                entry: call.target,
                callers: vec![call.site],
                size: scan.visited.len(),
            });
            pending.extend(scan.boundary_calls);
        }

        debug!(
            instructions = graph.len(),
            regions = regions.len(),
            unreachable = finder.tags.iter().filter(|tag| tag.is_none()).count(),
            "partitioned unit into regions"
        );
        Ok(RegionMap {
            tags: finder.tags,
            regions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CodeAssembler, Dispatch};

    /// 0: nop, 1: jsr sub, 2: push, 3: jsr sub, 4: return,
    /// 5: label sub, 6: store addr, 7: jsr inner, 8: ret 0,
    /// 9: label inner, 10: store addr2, 11: ret 1
    fn nested() -> InstructionGraph {
        let mut asm = CodeAssembler::new();
        let addr = asm.local(0);
        let addr2 = asm.local(1);
        asm.nop()
            .unwrap()
            .jsr("sub")
            .unwrap()
            .push_const()
            .unwrap()
            .jsr("sub")
            .unwrap()
            .ret_value()
            .unwrap()
            .label("sub")
            .unwrap()
            .store(addr)
            .unwrap()
            .jsr("inner")
            .unwrap()
            .ret(0)
            .unwrap()
            .label("inner")
            .unwrap()
            .store(addr2)
            .unwrap()
            .ret(1)
            .unwrap();
        asm.finish().unwrap()
    }

    #[test]
    fn test_main_region_stops_at_calls() {
        let graph = nested();
        let mut finder = RegionFinder::new(&graph);
        let scan = finder.find_region(0, RegionId::MAIN).unwrap();

        assert_eq!(scan.visited, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            scan.boundary_calls,
            vec![
                SubroutineCall { site: 1, target: 5 },
                SubroutineCall { site: 3, target: 5 },
            ]
        );
        assert!(finder.tags()[5..].iter().all(Option::is_none));

        let again = finder.find_region(0, RegionId(7)).unwrap();
        assert!(again.visited.is_empty());
    }

    #[test]
    fn test_partition_nested_subroutines() {
        let graph = nested();
        let map = RegionFinder::partition(&graph).unwrap();

        assert_eq!(map.regions().len(), 3);
        assert_eq!(map.instructions(RegionId(1)), vec![5, 6, 7, 8]);
        assert_eq!(map.instructions(RegionId(2)), vec![9, 10, 11]);
        assert_eq!(map.regions()[1].callers, vec![1, 3]);
        assert_eq!(map.regions()[2].callers, vec![7]);
        assert_eq!(map.regions()[2].size, 3);
        assert_eq!(map.region_of(8), Some(RegionId(1)));
    }

    #[test]
    fn test_handlers_and_unreachable_code() {
        // 0: label try, 1: invoke, 2: label end, 3: return, 4: nop (dead),
        // 5: return, 6: label handler, 7: throw
        let mut asm = CodeAssembler::new();
        asm.label("try")
            .unwrap()
            .invoke(Dispatch::Static, 0, false)
            .unwrap()
            .label("end")
            .unwrap()
            .ret_void()
            .unwrap()
            .nop()
            .unwrap()
            .ret_void()
            .unwrap()
            .label("handler")
            .unwrap()
            .throw()
            .unwrap()
            .protect("try", "end", "handler")
            .unwrap();
        let graph = asm.finish().unwrap();
        let map = RegionFinder::partition(&graph).unwrap();

        assert_eq!(map.instructions(RegionId::MAIN), vec![0, 1, 2, 3, 6, 7]);
        assert_eq!(map.region_of(4), None);
        assert_eq!(map.region_of(5), None);
    }

    #[test]
    fn test_entry_out_of_range() {
        let graph = nested();
        let mut finder = RegionFinder::new(&graph);
        assert!(finder.find_region(12, RegionId::MAIN).is_err());
    }
}
