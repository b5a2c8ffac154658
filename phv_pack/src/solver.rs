//! Per-container-kind ALU instruction synthesis check.
//!
//! The feasibility gates prune most illegal packings structurally; this
//! solver is the final cross-check that a concrete instruction exists for
//! each action. Normal containers synthesize deposit-field and
//! bitmasked-set forms; mocha and dark containers only admit a single
//! whole-container write.

use std::collections::BTreeSet;
use std::fmt;

use phv_model::container::Container;
use phv_model::slice::BitRange;

/// Where one destination range gets its bits from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverSource {
    /// An allocated PHV source: container plus bit range within it.
    Phv { container: Container, range: BitRange },
    /// A source not yet allocated; the conditional constraints pin its
    /// eventual position to `bit_position`, so it behaves as aligned.
    Pending { bit_position: u16 },
    ActionData,
    Constant(i64),
}

/// Why a write participates in the plan. Initialization writes come from
/// the overlay engine and are synthesized exactly like regular writes,
/// but are reported separately on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Regular,
    MetadataInit,
    DarkInit,
}

/// One (destination-bits <- source) assignment.
#[derive(Debug, Clone)]
pub struct MoveAssign {
    pub dest: BitRange,
    pub source: SolverSource,
    pub kind: WriteKind,
}

/// The instruction-synthesis problem for one action on one container.
#[derive(Debug, Clone)]
pub struct MovePlan {
    pub container: Container,
    pub assigns: Vec<MoveAssign>,
    /// Container bits that hold live data the action does not write and
    /// must therefore survive the instruction.
    pub preserved: u64,
}

impl MovePlan {
    pub fn write_mask(&self) -> u64 {
        self.assigns.iter().fold(0, |m, a| m | a.dest.mask())
    }
}

/// Diagnostic produced on solver rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverFailure {
    pub reason: String,
}

impl SolverFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SolverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// A device-specific instruction synthesizer.
pub trait InstructionSolver {
    fn solve(&self, plan: &MovePlan) -> Result<(), SolverFailure>;
}

/// Pick the solver for a container kind. Tagalong containers never reach
/// the solver: the engine accepts them before building a plan.
pub fn solver_for(container: Container) -> &'static dyn InstructionSolver {
    if container.whole_container_writes_only() {
        &WholeContainerSolver
    } else {
        &NormalSolver
    }
}

fn is_contiguous(mask: u64) -> bool {
    if mask == 0 {
        return false;
    }
    let shifted = mask >> mask.trailing_zeros();
    (shifted & (shifted + 1)) == 0
}

/// Solver for normal containers: deposit-field and bitmasked-set forms.
pub struct NormalSolver;

impl InstructionSolver for NormalSolver {
    fn solve(&self, plan: &MovePlan) -> Result<(), SolverFailure> {
        let mut phv_containers: BTreeSet<Container> = BTreeSet::new();
        let mut rotations: BTreeSet<i32> = BTreeSet::new();
        let mut ad_mask = 0u64;
        let mut phv_mask = 0u64;

        for a in &plan.assigns {
            match &a.source {
                SolverSource::Phv { container, range } => {
                    phv_containers.insert(*container);
                    rotations.insert(a.dest.lo as i32 - range.lo as i32);
                    phv_mask |= a.dest.mask();
                }
                SolverSource::Pending { bit_position } => {
                    // Pinned by conditional constraints: behaves as a
                    // source already sitting at the required offset.
                    rotations.insert(a.dest.lo as i32 - *bit_position as i32);
                    phv_mask |= a.dest.mask();
                }
                SolverSource::ActionData | SolverSource::Constant(_) => {
                    ad_mask |= a.dest.mask();
                }
            }
        }

        let writes = plan.write_mask();
        let has_preserved = plan.preserved & !writes != 0;

        if phv_containers.len() > 2 {
            return Err(SolverFailure::new(format!(
                "{} PHV source containers, the ALU reads at most 2",
                phv_containers.len()
            )));
        }

        if phv_containers.len() == 2 {
            // Byte-rotate-merge: both sources feed the full-width merge,
            // no background read of the old destination is possible.
            if has_preserved {
                return Err(SolverFailure::new(
                    "two PHV sources leave no operand for preserved destination bits",
                ));
            }
            if ad_mask != 0 {
                return Err(SolverFailure::new(
                    "two PHV sources cannot be combined with action data",
                ));
            }
            for &rot in &rotations {
                if rot % 8 != 0 {
                    return Err(SolverFailure::new(format!(
                        "byte-rotate-merge needs byte-aligned sources, got rotation {rot}"
                    )));
                }
            }
            return Ok(());
        }

        // Single PHV source (or none): deposit-field. One rotation, one
        // contiguous destination mask; the old destination value is the
        // background operand.
        if phv_mask != 0 {
            if rotations.len() > 1 {
                return Err(SolverFailure::new(format!(
                    "deposit-field needs one rotation, sources disagree: {rotations:?}"
                )));
            }
            if !is_contiguous(phv_mask) {
                return Err(SolverFailure::new(
                    "deposit-field needs a contiguous write mask for its PHV source",
                ));
            }
        }

        // Action data / constant: deposit-field when contiguous, else
        // bitmasked-set, which is only available when action data is the
        // sole source kind.
        if ad_mask != 0 && !is_contiguous(ad_mask) && phv_mask != 0 {
            return Err(SolverFailure::new(
                "non-contiguous action-data mask cannot merge with a PHV source",
            ));
        }

        Ok(())
    }
}

/// Solver for mocha/dark containers: one source, whole-container write,
/// nothing preserved.
pub struct WholeContainerSolver;

impl InstructionSolver for WholeContainerSolver {
    fn solve(&self, plan: &MovePlan) -> Result<(), SolverFailure> {
        // Unoccupied bits are free to take the source's background; only
        // live resident bits must be covered by the write.
        let writes = plan.write_mask();
        if plan.preserved & !writes != 0 {
            return Err(SolverFailure::new(format!(
                "{} admits only whole-container writes, live bits {:#x} are not written",
                plan.container,
                plan.preserved & !writes
            )));
        }

        let mut phv_containers: BTreeSet<Container> = BTreeSet::new();
        let mut rotations: BTreeSet<i32> = BTreeSet::new();
        for a in &plan.assigns {
            match &a.source {
                SolverSource::Phv { container, range } => {
                    phv_containers.insert(*container);
                    rotations.insert(a.dest.lo as i32 - range.lo as i32);
                }
                SolverSource::Pending { bit_position } => {
                    rotations.insert(a.dest.lo as i32 - *bit_position as i32);
                }
                SolverSource::ActionData | SolverSource::Constant(_) => {}
            }
        }
        if phv_containers.len() > 1 {
            return Err(SolverFailure::new(format!(
                "{} reads a single PHV source, got {}",
                plan.container,
                phv_containers.len()
            )));
        }
        if rotations.len() > 1 || rotations.iter().any(|&r| r != 0) {
            return Err(SolverFailure::new(
                "whole-container write cannot rotate its source",
            ));
        }
        Ok(())
    }
}
