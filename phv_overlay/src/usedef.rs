//! Per-field use/def points across the pipeline.
//!
//! The overlay engine reasons about *where* a field is touched: in the
//! parser, in a match-action stage, or in the deparser, and whether the
//! touch is a read or a write. Uses landing in dark containers do not
//! count against overlay legality and are recorded with the `dark` flag.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use phv_model::ids::{FieldId, TableId};
use phv_model::liverange::Access;

/// Most fields are touched a handful of times; keep the records inline.
type UseList = SmallVec<[FieldUse; 8]>;

/// A point in the pipeline where a field can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipeUnit {
    Parser,
    Stage(u16),
    Deparser,
}

impl PipeUnit {
    /// Stage index for comparisons against live-range stages. The parser
    /// collapses onto stage 0 and the deparser onto the last stage.
    pub fn stage(&self, stages: u16) -> u16 {
        match self {
            PipeUnit::Parser => 0,
            PipeUnit::Stage(s) => *s,
            PipeUnit::Deparser => stages.saturating_sub(1),
        }
    }

    /// Bit position in a use/def mask: parser, then one bit per stage,
    /// then the deparser.
    fn bit(&self, stages: u16) -> u64 {
        match self {
            PipeUnit::Parser => 1,
            PipeUnit::Stage(s) => {
                debug_assert!(*s < stages, "stage {s} out of range");
                1 << (1 + s)
            }
            PipeUnit::Deparser => 1 << (1 + stages),
        }
    }
}

/// One recorded use of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldUse {
    pub unit: PipeUnit,
    pub access: Access,
    /// Table through which the use happens; `None` for parser and
    /// deparser uses.
    pub table: Option<TableId>,
    /// The use reads/writes a dark container and does not constrain
    /// overlay legality.
    pub dark: bool,
}

impl FieldUse {
    pub fn read(unit: PipeUnit, table: Option<TableId>) -> Self {
        Self {
            unit,
            access: Access::Read,
            table,
            dark: false,
        }
    }

    pub fn write(unit: PipeUnit, table: Option<TableId>) -> Self {
        Self {
            unit,
            access: Access::Write,
            table,
            dark: false,
        }
    }

    pub fn in_dark(mut self) -> Self {
        self.dark = true;
        self
    }
}

/// Read/write bitmasks over {parser, stage 0..N-1, deparser} per field,
/// with the underlying use records kept for table lookups.
#[derive(Debug, Default)]
pub struct UseDefMatrix {
    stages: u16,
    uses: BTreeMap<FieldId, UseList>,
}

impl UseDefMatrix {
    pub fn new(stages: u16) -> Self {
        Self {
            stages,
            uses: BTreeMap::new(),
        }
    }

    pub fn stages(&self) -> u16 {
        self.stages
    }

    pub fn record(&mut self, field: FieldId, r#use: FieldUse) {
        self.uses.entry(field).or_default().push(r#use);
    }

    pub fn uses(&self, field: FieldId) -> &[FieldUse] {
        self.uses.get(&field).map(SmallVec::as_slice).unwrap_or(&[])
    }

    /// Units with any non-dark use of the field.
    pub fn use_mask(&self, field: FieldId) -> u64 {
        self.uses(field)
            .iter()
            .filter(|u| !u.dark)
            .map(|u| u.unit.bit(self.stages))
            .fold(0, |m, b| m | b)
    }

    /// Non-dark reads of the field strictly after `stage`.
    pub fn reads_after(&self, field: FieldId, stage: u16) -> Vec<FieldUse> {
        self.uses(field)
            .iter()
            .filter(|u| !u.dark && u.access.is_read() && u.unit.stage(self.stages) > stage)
            .copied()
            .collect()
    }

    /// First non-dark use in pipeline order.
    pub fn first_use(&self, field: FieldId) -> Option<FieldUse> {
        self.uses(field)
            .iter()
            .filter(|u| !u.dark)
            .min_by_key(|u| (u.unit.stage(self.stages), u.access))
            .copied()
    }

    /// Table carrying the first non-dark read strictly after `stage`.
    pub fn table_reading_after(&self, field: FieldId, stage: u16) -> Option<TableId> {
        self.reads_after(field, stage)
            .iter()
            .min_by_key(|u| u.unit.stage(self.stages))
            .and_then(|u| u.table)
    }

    /// Tables with any non-dark use of the field.
    pub fn use_tables(&self, field: FieldId) -> Vec<TableId> {
        let mut tables: Vec<TableId> = self
            .uses(field)
            .iter()
            .filter(|u| !u.dark)
            .filter_map(|u| u.table)
            .collect();
        tables.sort();
        tables.dedup();
        tables
    }
}
