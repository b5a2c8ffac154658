//! Bit ranges and field slices: the basic unit of read/write accounting.

use std::fmt;

use crate::ids::FieldId;

/// A closed bit range `[lo, hi]`, little-endian bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitRange {
    pub lo: u16,
    pub hi: u16,
}

impl BitRange {
    pub fn new(lo: u16, hi: u16) -> Self {
        assert!(lo <= hi, "empty bit range [{lo}, {hi}]");
        Self { lo, hi }
    }

    /// Range covering `width` bits starting at `lo`.
    pub fn at(lo: u16, width: u16) -> Self {
        assert!(width > 0, "zero-width bit range at {lo}");
        Self {
            lo,
            hi: lo + width - 1,
        }
    }

    pub fn width(&self) -> u16 {
        self.hi - self.lo + 1
    }

    pub fn contains(&self, other: &BitRange) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }

    pub fn overlaps(&self, other: &BitRange) -> bool {
        self.lo <= other.hi && other.lo <= self.hi
    }

    pub fn intersect(&self, other: &BitRange) -> Option<BitRange> {
        let lo = self.lo.max(other.lo);
        let hi = self.hi.min(other.hi);
        (lo <= hi).then_some(BitRange { lo, hi })
    }

    /// Shift both endpoints by a signed bit offset.
    pub fn shifted(&self, by: i32) -> BitRange {
        let lo = self.lo as i32 + by;
        let hi = self.hi as i32 + by;
        assert!(lo >= 0, "bit range shifted below zero");
        BitRange {
            lo: lo as u16,
            hi: hi as u16,
        }
    }

    /// Bit mask with this range's bits set, for container-sized ranges.
    pub fn mask(&self) -> u64 {
        debug_assert!(self.hi < 64);
        let width = self.width() as u32;
        let ones = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
        ones << self.lo
    }

    /// True if `next` starts exactly one past this range's end.
    pub fn adjacent_below(&self, next: &BitRange) -> bool {
        self.hi + 1 == next.lo
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lo == self.hi {
            write!(f, "[{}]", self.lo)
        } else {
            write!(f, "[{}:{}]", self.lo, self.hi)
        }
    }
}

/// A (field, bit-range) pair. Total order: field id first, then range, so
/// `BTreeMap<FieldSlice, _>` iteration is deterministic across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldSlice {
    pub field: FieldId,
    pub range: BitRange,
}

impl FieldSlice {
    pub fn new(field: FieldId, range: BitRange) -> Self {
        Self { field, range }
    }

    pub fn whole(field: FieldId, size: u16) -> Self {
        Self {
            field,
            range: BitRange::at(0, size),
        }
    }

    pub fn width(&self) -> u16 {
        self.range.width()
    }

    /// Sub-slice of this slice restricted to `range` (absolute field bits).
    /// Returns `None` when the ranges do not intersect.
    pub fn narrowed_to(&self, range: &BitRange) -> Option<FieldSlice> {
        self.range
            .intersect(range)
            .map(|r| FieldSlice::new(self.field, r))
    }

    /// Same field, touching or overlapping ranges.
    pub fn joinable(&self, other: &FieldSlice) -> bool {
        self.field == other.field
            && (self.range.overlaps(&other.range)
                || self.range.adjacent_below(&other.range)
                || other.range.adjacent_below(&self.range))
    }
}

impl fmt::Display for FieldSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.field, self.range)
    }
}
