//! Per-(action, candidate-container) derived properties.
//!
//! `ActionContainerProperty` is recomputed for every feasibility call and
//! never persisted: it is a summary of how one action writes the proposed
//! container-state, used by the gates in `feasibility`.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use phv_model::alloc_slice::AllocSlice;
use phv_model::container::Container;
use phv_model::ids::ActionId;
use phv_model::slice::{BitRange, FieldSlice};

use crate::operand::OperandInfo;
use crate::snapshot::AllocSnapshot;
use crate::tracker::ConstraintTracker;

/// Operation-type classification of one action over one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    /// Nothing in the container is written by this action.
    None,
    Move,
    Bitwise,
    /// Every bit of the container is written.
    WholeContainer,
    /// Every bit is written and every written slice is the same field.
    WholeContainerSameField,
    PartOfContainer,
    /// Operation kinds were mixed; never synthesizable.
    Mixed,
}

/// Source accounting for one action over one container.
#[derive(Debug, Clone, Default)]
pub struct SourceCount {
    /// Distinct already-allocated source containers.
    pub allocated: BTreeSet<Container>,
    /// Distinct not-yet-allocated source field slices.
    pub unallocated: BTreeSet<FieldSlice>,
    /// Extra source-count increments for a source read twice by two
    /// concurrently-live destinations. Disjoint-lived readers of one
    /// source share it; concurrently-live readers need it twice.
    pub double_counted: usize,
    pub has_action_data: bool,
    pub has_constant: bool,
}

impl SourceCount {
    /// Number of PHV source containers the action needs, assuming every
    /// unallocated source lands in its own container.
    pub fn phv_sources(&self) -> usize {
        self.allocated.len() + self.unallocated.len() + self.double_counted
    }

    pub fn allocated_sources(&self) -> usize {
        self.allocated.len() + self.double_counted
    }
}

/// Derived property bag for one (action, container-state) pair.
#[derive(Debug, Clone)]
pub struct ActionContainerProperty {
    pub action: ActionId,
    pub op_type: OperationType,
    pub sources: SourceCount,
    /// Two PHV source containers participate, so each source must be
    /// byte-aligned with its destination.
    pub must_align: bool,
    /// Each written state slice with the source operands producing it.
    pub written: Vec<(AllocSlice, Vec<OperandInfo>)>,
    /// Container bits written by this action.
    pub write_mask: u64,
}

impl ActionContainerProperty {
    /// Summarize how `action` writes the proposed container-state.
    /// `state` holds every slice (candidate and pre-existing) of one
    /// container.
    pub fn derive(
        action: ActionId,
        container: Container,
        state: &[AllocSlice],
        tracker: &ConstraintTracker,
        snapshot: &dyn AllocSnapshot,
    ) -> Self {
        let mut written: Vec<(AllocSlice, Vec<OperandInfo>)> = Vec::new();
        let mut write_mask = 0u64;

        for slice in state {
            let fs = slice.field_slice();
            let ops = tracker.sources(&fs, action);
            if !ops.is_empty() {
                write_mask |= slice.container_range.mask();
                written.push((slice.clone(), ops));
            }
        }

        let op_type = classify(container, &written, write_mask);
        let sources = count_sources(&written, snapshot);
        let must_align = sources.allocated.len() == 2;

        ActionContainerProperty {
            action,
            op_type,
            sources,
            must_align,
            written,
            write_mask,
        }
    }

    pub fn writes_anything(&self) -> bool {
        !self.written.is_empty()
    }

    /// Distinct fields written by this action in the container.
    pub fn written_fields(&self) -> BTreeSet<phv_model::ids::FieldId> {
        self.written.iter().map(|(s, _)| s.field).collect()
    }
}

fn classify(
    container: Container,
    written: &[(AllocSlice, Vec<OperandInfo>)],
    write_mask: u64,
) -> OperationType {
    if written.is_empty() {
        return OperationType::None;
    }
    let mut any_move = false;
    let mut any_bitwise = false;
    let mut any_other = false;
    for (_, ops) in written {
        for op in ops {
            if op.is_move() {
                any_move = true;
            } else if op.is_bitwise() {
                any_bitwise = true;
            } else {
                any_other = true;
            }
        }
    }
    if (any_move as u8 + any_bitwise as u8 + any_other as u8) > 1 {
        return OperationType::Mixed;
    }
    // Bitwise ALU forms are whole-container by construction; the
    // whole-container classification below is about move coverage.
    if any_bitwise {
        return OperationType::Bitwise;
    }

    let full = write_mask == phv_model::slice::BitRange::at(0, container.bits()).mask();
    if full {
        let first = written[0].0.field;
        if written.iter().all(|(s, _)| s.field == first) {
            return OperationType::WholeContainerSameField;
        }
        return OperationType::WholeContainer;
    }
    if any_move {
        OperationType::Move
    } else {
        OperationType::PartOfContainer
    }
}

fn count_sources(
    written: &[(AllocSlice, Vec<OperandInfo>)],
    snapshot: &dyn AllocSnapshot,
) -> SourceCount {
    let mut count = SourceCount::default();

    // Which destinations read each source bit-range, for double counting.
    let mut readers_by_container: BTreeMap<Container, Vec<(BitRange, &AllocSlice)>> =
        BTreeMap::new();
    let mut readers_by_slice: BTreeMap<FieldSlice, Vec<&AllocSlice>> = BTreeMap::new();

    for (dest, ops) in written {
        for op in ops {
            if op.action_data.is_some() {
                count.has_action_data = true;
                continue;
            }
            if op.constant.is_some() {
                count.has_constant = true;
                continue;
            }
            let Some(src) = op.phv else { continue };
            let placed = snapshot.slices_of(&src);
            if placed.is_empty() {
                count.unallocated.insert(src);
                readers_by_slice.entry(src).or_default().push(dest);
            } else {
                for p in placed {
                    count.allocated.insert(p.container);
                    readers_by_container
                        .entry(p.container)
                        .or_default()
                        .push((p.container_range, dest));
                }
            }
        }
    }

    // Two concurrently-live destinations fed by the same source bits need
    // the source twice on the crossbar. Distinct sub-ranges of one source
    // container are one crossbar operand each and never double count.
    let mut double = 0usize;
    for readers in readers_by_container.values() {
        for (i, (ra, a)) in readers.iter().enumerate() {
            for (rb, b) in readers.iter().skip(i + 1) {
                if ra.intersect(rb).is_some()
                    && a.live.overlaps(&b.live)
                    && a.container_range != b.container_range
                {
                    double += 1;
                }
            }
        }
    }
    for readers in readers_by_slice.values() {
        for (i, a) in readers.iter().enumerate() {
            for b in readers.iter().skip(i + 1) {
                if a.live.overlaps(&b.live) && a.container_range != b.container_range {
                    double += 1;
                }
            }
        }
    }
    count.double_counted = double;
    count
}
