//! Operand records: the flat, pre-extracted view of one action's writes.
//!
//! The IR traversal that discovers how an action reads and writes fields
//! happens upstream; this core only ever sees the result as [`ActionOps`],
//! a list of destination slices with their source operands. Built once per
//! action by the tracker and never mutated afterward.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use phv_model::slice::FieldSlice;

/// Specialty source marker. Values produced by these units arrive on
/// dedicated buses with their own placement rules, so writes fed by them
/// carry extra packing restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpecialtyKind {
    /// Plain action data, no restrictions beyond normal operand rules.
    None,
    MeterColor,
    HashDist,
    Random,
    MeterAlu,
    StatefulAlu,
}

impl SpecialtyKind {
    pub fn is_special(&self) -> bool {
        *self != SpecialtyKind::None
    }
}

/// One source operand of a write, as reported by action analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOperand {
    /// A PHV field slice. `stateful` marks reads that feed a stateful ALU.
    Phv { slice: FieldSlice, stateful: bool },
    /// Action data from the table entry, with its specialty kind.
    ActionData(SpecialtyKind),
    /// An immediate value.
    Constant(i64),
}

impl SourceOperand {
    pub fn phv(slice: FieldSlice) -> Self {
        SourceOperand::Phv {
            slice,
            stateful: false,
        }
    }

    pub fn phv_slice(&self) -> Option<&FieldSlice> {
        match self {
            SourceOperand::Phv { slice, .. } => Some(slice),
            _ => None,
        }
    }

    pub fn is_action_data(&self) -> bool {
        matches!(self, SourceOperand::ActionData(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, SourceOperand::Constant(_))
    }
}

/// One write performed by an action: destination slice, instruction name,
/// and the source operands feeding it.
#[derive(Debug, Clone)]
pub struct WriteDesc {
    pub dest: FieldSlice,
    pub operation: String,
    pub sources: Vec<SourceOperand>,
}

impl WriteDesc {
    pub fn new(dest: FieldSlice, operation: impl Into<String>, sources: Vec<SourceOperand>) -> Self {
        Self {
            dest,
            operation: operation.into(),
            sources,
        }
    }
}

/// The complete structural analysis of one action, ready for ingestion.
#[derive(Debug, Clone, Default)]
pub struct ActionOps {
    pub writes: Vec<WriteDesc>,
}

impl ActionOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(mut self, desc: WriteDesc) -> Self {
        self.writes.push(desc);
        self
    }
}

/// Operation-kind flags attached to an operand record. Container-level
/// classification (whole-container, mixed kinds) is derived per
/// (action, container) in [`crate::property::OperationType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct OperandFlags(u8);

impl OperandFlags {
    pub const NONE: OperandFlags = OperandFlags(0);
    /// Plain move (`set`).
    pub const MOVE: OperandFlags = OperandFlags(1 << 0);
    /// Bitwise operation (`and`, `or`, `xor`, ...).
    pub const BITWISE: OperandFlags = OperandFlags(1 << 1);
    /// A second operand of the same instruction exists.
    pub const ANOTHER_OPERAND: OperandFlags = OperandFlags(1 << 2);

    pub fn contains(&self, other: OperandFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: OperandFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for OperandFlags {
    type Output = OperandFlags;

    fn bitor(self, rhs: OperandFlags) -> OperandFlags {
        OperandFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OperandFlags {
    fn bitor_assign(&mut self, rhs: OperandFlags) {
        self.0 |= rhs.0;
    }
}

/// Per-operand record held by the tracker indices: what the operand
/// touches (PHV slice, action data, or constant), the instruction name,
/// and the operation-kind flags. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandInfo {
    /// PHV slice this operand touches, if it is a PHV operand.
    pub phv: Option<FieldSlice>,
    /// Set when the operand is action data.
    pub action_data: Option<SpecialtyKind>,
    /// Set when the operand is an immediate.
    pub constant: Option<i64>,
    /// This PHV read feeds a stateful ALU.
    pub stateful: bool,
    pub operation: String,
    pub flags: OperandFlags,
}

impl OperandInfo {
    pub fn from_source(source: &SourceOperand, operation: &str, flags: OperandFlags) -> Self {
        let (phv, action_data, constant, stateful) = match source {
            SourceOperand::Phv { slice, stateful } => (Some(*slice), None, None, *stateful),
            SourceOperand::ActionData(kind) => (None, Some(*kind), None, false),
            SourceOperand::Constant(v) => (None, None, Some(*v), false),
        };
        Self {
            phv,
            action_data,
            constant,
            stateful,
            operation: operation.to_string(),
            flags,
        }
    }

    pub fn specialty(&self) -> SpecialtyKind {
        self.action_data.unwrap_or(SpecialtyKind::None)
    }

    pub fn is_move(&self) -> bool {
        self.flags.contains(OperandFlags::MOVE)
    }

    pub fn is_bitwise(&self) -> bool {
        self.flags.contains(OperandFlags::BITWISE)
    }
}

impl fmt::Display for OperandInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(slice) = &self.phv {
            write!(f, "{}({slice})", self.operation)
        } else if let Some(kind) = &self.action_data {
            write!(f, "{}(ad:{kind:?})", self.operation)
        } else if let Some(v) = &self.constant {
            write!(f, "{}(#{v})", self.operation)
        } else {
            write!(f, "{}()", self.operation)
        }
    }
}

/// Classify an instruction by name into MOVE / BITWISE flags. Names the
/// classifier does not know yield no flag and are treated as opaque
/// part-of-container operations.
pub fn op_class(operation: &str) -> OperandFlags {
    match operation {
        "set" => OperandFlags::MOVE,
        "and" | "or" | "xor" | "not" | "nor" | "nand" | "xnor" | "andca" | "andcb" | "orca"
        | "orcb" => OperandFlags::BITWISE,
        _ => OperandFlags::NONE,
    }
}
