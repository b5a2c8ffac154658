//! The recoverable feasibility-failure taxonomy.
//!
//! Every variant names one specific hardware-synthesizability reason a
//! candidate packing is illegal. These are expected outcomes of a large
//! search: the allocator catches them and tries a different packing.
//! Nothing here is thrown; invariant violations from upstream
//! collaborators panic instead (see `tracker`).

use thiserror::Error;

use phv_model::alloc_slice::AllocSlice;
use phv_model::container::Container;
use phv_model::ids::{ActionId, FieldId};
use phv_model::slice::FieldSlice;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackError {
    #[error("table placement forbids co-packing {a} with {b}")]
    PackConstraintPresent { a: FieldSlice, b: FieldSlice },

    #[error("stateful ALU reads of {field} require two different rotational alignments")]
    StatefulDestAlignment { field: FieldId },

    #[error("action {action} would need a non-contiguous bitmasked write of specialty action data")]
    BitmaskedSetRequired { action: ActionId },

    #[error("specialty-written destination {dest} must be the only field written by action {action} in its container")]
    SpecialtyDataIsolation { dest: FieldSlice, action: ActionId },

    #[error("action {action} mixes operation kinds on one container")]
    MixedOperation { action: ActionId },

    #[error("whole-container write in action {action} draws from non-adjacent source slices")]
    NonAdjacentWholeContainer { action: ActionId },

    #[error("bitwise operation in action {action} covers the container only partially with action data")]
    BitwiseMixedActionData { action: ActionId },

    #[error("action {action} mixes two distinct specialty action-data kinds")]
    ComplexActionDataPacking { action: ActionId },

    #[error("action {action} needs {count} PHV source containers, at most 2 are supported")]
    MoreThanTwoSources { action: ActionId, count: usize },

    #[error("action {action} needs two PHV source containers plus action data or constant")]
    TwoSourcesAndConstant { action: ActionId },

    #[error("{container} admits a single PHV source, action {action} needs {count}")]
    WholeContainerMultipleSources {
        action: ActionId,
        container: Container,
        count: usize,
    },

    #[error("{container} requires whole-container writes, action {action} leaves some slices unwritten")]
    WholeContainerPartialWrite {
        action: ActionId,
        container: Container,
    },

    #[error("action {action} produces a non-contiguous write mask, deposit-field cannot synthesize it")]
    InvalidWriteMask { action: ActionId },

    #[error("action {action} reads two PHV sources that are both rotated against the destination")]
    BothSourcesRotated { action: ActionId },

    #[error("source slices of {field} in action {action} carry inconsistent rotational offsets")]
    SliceOffsetMismatch { action: ActionId, field: FieldId },

    #[error("source of action {action} sits at a rotation of {rotation} bits, which no instruction realizes here")]
    SliceAlignment { action: ActionId, rotation: i32 },

    #[error("slice {slice} would need two different bit positions at once")]
    MultipleAlignments { slice: FieldSlice },

    #[error("required positions of {a} and {b} collide and the fields are not mutually exclusive")]
    OverlappingSlices { a: FieldSlice, b: FieldSlice },

    #[error("instruction solver rejected the packing: {reason}")]
    SolverFailed {
        reason: String,
        slices: Vec<AllocSlice>,
    },
}

impl PackError {
    /// Render the failure with enough context for a human reading a
    /// "no legal packing exists" diagnostic. The presentation layer wraps
    /// this with source positions; this core only knows slices and
    /// actions.
    pub fn diagnose(&self) -> String {
        match self {
            PackError::SolverFailed { reason, slices } => {
                let mut out = format!("no legal instruction sequence: {reason}");
                if !slices.is_empty() {
                    out.push_str("\n  offending slices:");
                    for s in slices {
                        out.push_str(&format!("\n    {s}"));
                    }
                }
                out
            }
            other => other.to_string(),
        }
    }
}
