//! Liveness intervals over pipeline stages.
//!
//! A live range is a pair of (stage, access) endpoints. Stages are either
//! "logical" (table-dependency rank, before table placement) or "physical"
//! (concrete pipeline stage, after placement); the two must never be
//! compared against each other.

use std::fmt;

/// Access kind at a liveness endpoint. At one stage a read of the old
/// value happens at the input crossbar, before any write lands at the
/// output, so `Read` orders before `Write` within the same stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    Read,
    Write,
    /// Read and written by the same stage (e.g. `f = f & mask`).
    ReadWrite,
}

impl Access {
    pub fn is_read(&self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// Stage granularity of a live range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageMode {
    /// One integer per table-dependency rank ("min stage").
    Logical,
    /// Concrete pipeline stage after table placement.
    Physical,
}

/// One liveness endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageAndAccess {
    pub stage: u16,
    pub access: Access,
}

impl StageAndAccess {
    pub fn read(stage: u16) -> Self {
        Self {
            stage,
            access: Access::Read,
        }
    }

    pub fn write(stage: u16) -> Self {
        Self {
            stage,
            access: Access::Write,
        }
    }

    /// Ordering key: reads at a stage precede writes at the same stage.
    fn key(&self) -> (u16, u8) {
        let a = match self.access {
            Access::Read => 0,
            Access::ReadWrite => 1,
            Access::Write => 2,
        };
        (self.stage, a)
    }
}

impl PartialOrd for StageAndAccess {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StageAndAccess {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for StageAndAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = match self.access {
            Access::Read => "R",
            Access::Write => "W",
            Access::ReadWrite => "RW",
        };
        write!(f, "{}{}", self.stage, a)
    }
}

/// A liveness interval for one allocated slice.
///
/// Invariants: `start <= end`; the end access is always a read (end of
/// life means "the value must still be readable here"); the start access
/// is a read for fields live-in from the parser, a write otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiveRange {
    pub mode: StageMode,
    pub start: StageAndAccess,
    pub end: StageAndAccess,
}

impl LiveRange {
    pub fn new(mode: StageMode, start: StageAndAccess, end: StageAndAccess) -> Self {
        debug_assert!(start <= end, "inverted live range {start}..{end}");
        debug_assert!(
            end.access.is_read(),
            "live range must end in a read, got {end}"
        );
        Self { mode, start, end }
    }

    /// Two ranges are disjoint when one ends strictly before the other
    /// starts. A read-ending range and a write-starting range at the same
    /// stage are disjoint: the read happens at the stage input, the write
    /// at the stage output. Ranges of different granularity are never
    /// disjoint (they cannot be compared).
    pub fn disjoint(&self, other: &LiveRange) -> bool {
        if self.mode != other.mode {
            return false;
        }
        self.end < other.start || other.end < self.start
    }

    pub fn overlaps(&self, other: &LiveRange) -> bool {
        !self.disjoint(other)
    }

    pub fn covers_stage(&self, stage: u16) -> bool {
        self.start.stage <= stage && stage <= self.end.stage
    }

    /// Grow this range to include another endpoint.
    pub fn extend(&mut self, point: StageAndAccess) {
        if point < self.start {
            self.start = point;
        }
        if point > self.end {
            self.end = point;
        }
    }
}

impl fmt::Display for LiveRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.start, self.end)
    }
}
