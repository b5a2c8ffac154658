//! Conditional constraints: the "yes, if" half of a feasibility answer.
//!
//! When a packing is legal only under additional placement decisions for
//! still-unallocated sources, those decisions come back to the allocator
//! as required bit positions, optional required containers, and co-pack
//! groups.

use std::collections::BTreeMap;
use std::fmt;

use phv_model::container::Container;
use phv_model::slice::FieldSlice;

/// Placement requirement for one unallocated source slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionalConstraint {
    /// Container bit the slice's low bit must land on.
    pub bit_position: u16,
    /// Specific container the slice must land in, when one is forced.
    pub container: Option<Container>,
}

/// The full conditional-constraint answer for one `can_pack` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalConstraints {
    /// Per-slice placement requirements.
    pub slices: BTreeMap<FieldSlice, ConditionalConstraint>,
    /// Groups of slices that must be packed into one container together.
    pub pack_together: Vec<Vec<FieldSlice>>,
}

impl ConditionalConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty() && self.pack_together.is_empty()
    }
}

impl fmt::Display for ConditionalConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(unconditional)");
        }
        for (slice, c) in &self.slices {
            write!(f, "{slice} @ bit {}", c.bit_position)?;
            if let Some(container) = c.container {
                write!(f, " in {container}")?;
            }
            writeln!(f)?;
        }
        for group in &self.pack_together {
            write!(f, "pack together:")?;
            for s in group {
                write!(f, " {s}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
