//! The allocation-snapshot seam.
//!
//! During one feasibility call the allocator's state is an immutable
//! snapshot; the engine only asks where field slices currently live and
//! which field pairs carry placement-derived restrictions.

use std::collections::{BTreeMap, HashSet};

use phv_model::alloc_slice::AllocSlice;
use phv_model::ids::FieldId;
use phv_model::slice::FieldSlice;

/// Read-only view of the allocator's state during one feasibility call.
pub trait AllocSnapshot {
    /// Placements overlapping `fs`, narrowed to the queried range.
    /// Empty when the slice is not yet allocated.
    fn slices_of(&self, fs: &FieldSlice) -> Vec<AllocSlice>;

    /// Whether two fields can never be live in the same packet.
    fn mutually_exclusive(&self, a: FieldId, b: FieldId) -> bool;

    /// Whether table placement recorded a no-co-pack constraint between
    /// the two fields.
    fn no_copack(&self, a: FieldId, b: FieldId) -> bool;

    /// True once table placement has run and live ranges use concrete
    /// pipeline stages. Liveness-based exceptions to no-co-pack
    /// constraints are only sound in that mode.
    fn uses_physical_liveranges(&self) -> bool;
}

fn ordered(a: FieldId, b: FieldId) -> (FieldId, FieldId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Map-backed snapshot implementation used by the allocator driver and
/// by tests.
#[derive(Debug, Default)]
pub struct Allocation {
    by_field: BTreeMap<FieldId, Vec<AllocSlice>>,
    mutex_pairs: HashSet<(FieldId, FieldId)>,
    no_copack_pairs: HashSet<(FieldId, FieldId)>,
    physical: bool,
}

impl Allocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_physical_liveranges() -> Self {
        Self {
            physical: true,
            ..Self::default()
        }
    }

    pub fn place(&mut self, slice: AllocSlice) {
        self.by_field.entry(slice.field).or_default().push(slice);
    }

    pub fn set_mutually_exclusive(&mut self, a: FieldId, b: FieldId) {
        self.mutex_pairs.insert(ordered(a, b));
    }

    pub fn forbid_copack(&mut self, a: FieldId, b: FieldId) {
        self.no_copack_pairs.insert(ordered(a, b));
    }
}

impl AllocSnapshot for Allocation {
    fn slices_of(&self, fs: &FieldSlice) -> Vec<AllocSlice> {
        self.by_field
            .get(&fs.field)
            .into_iter()
            .flatten()
            .filter_map(|s| s.narrowed_to(&fs.range))
            .collect()
    }

    fn mutually_exclusive(&self, a: FieldId, b: FieldId) -> bool {
        self.mutex_pairs.contains(&ordered(a, b))
    }

    fn no_copack(&self, a: FieldId, b: FieldId) -> bool {
        self.no_copack_pairs.contains(&ordered(a, b))
    }

    fn uses_physical_liveranges(&self) -> bool {
        self.physical
    }
}
