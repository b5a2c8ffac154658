//! Allocated slices: one physical placement decision for one field slice.

use std::fmt;

use crate::container::Container;
use crate::dark::DarkInitPrimitive;
use crate::ids::FieldId;
use crate::liverange::LiveRange;
use crate::slice::{BitRange, FieldSlice};

/// A field slice placed into a container bit range, carrying its liveness
/// interval and, for overlaid slices, the initialization primitive that
/// makes the overlay safe.
///
/// Created by the allocator when a slice is placed; the physical-liverange
/// finalizer may later widen `live`; rebuilt from scratch each allocation
/// round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocSlice {
    pub field: FieldId,
    pub container: Container,
    /// Bits of the field this slice covers.
    pub field_range: BitRange,
    /// Bits of the container this slice occupies. Same width as
    /// `field_range`.
    pub container_range: BitRange,
    pub live: LiveRange,
    pub init: Option<Box<DarkInitPrimitive>>,
}

impl AllocSlice {
    pub fn new(
        field: FieldId,
        container: Container,
        field_range: BitRange,
        container_range: BitRange,
        live: LiveRange,
    ) -> Self {
        assert_eq!(
            field_range.width(),
            container_range.width(),
            "field range {field_range} and container range {container_range} differ in width"
        );
        assert!(
            container_range.hi < container.bits(),
            "container range {container_range} exceeds {container}"
        );
        Self {
            field,
            container,
            field_range,
            container_range,
            live,
            init: None,
        }
    }

    pub fn width(&self) -> u16 {
        self.field_range.width()
    }

    pub fn field_slice(&self) -> FieldSlice {
        FieldSlice::new(self.field, self.field_range)
    }

    /// Signed offset from field bit position to container bit position.
    pub fn container_offset(&self) -> i32 {
        self.container_range.lo as i32 - self.field_range.lo as i32
    }

    /// True when this slice and `other` may not coexist: same container,
    /// overlapping container bits, overlapping lifetimes.
    pub fn conflicts_with(&self, other: &AllocSlice) -> bool {
        self.container == other.container
            && self.container_range.overlaps(&other.container_range)
            && self.live.overlaps(&other.live)
    }

    /// Restrict this allocation to a sub-range of the field, shifting the
    /// container range by the same amount.
    pub fn narrowed_to(&self, range: &BitRange) -> Option<AllocSlice> {
        let field_range = self.field_range.intersect(range)?;
        let shift = field_range.lo as i32 - self.field_range.lo as i32;
        let container_range = BitRange::at(
            (self.container_range.lo as i32 + shift) as u16,
            field_range.width(),
        );
        Some(AllocSlice {
            field: self.field,
            container: self.container,
            field_range,
            container_range,
            live: self.live,
            init: self.init.clone(),
        })
    }
}

impl fmt::Display for AllocSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} -> {}{} {}",
            self.field, self.field_range, self.container, self.container_range, self.live
        )
    }
}
