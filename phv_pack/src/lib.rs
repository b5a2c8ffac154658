//! phv_pack: Feasibility oracle for PHV container packing.
//!
//! Given a candidate packing of field slices into one container, decides
//! whether every pipeline action touching those slices can be realized by
//! legal ALU instructions, and when the answer depends on slices not yet
//! allocated, emits the alignment/co-location constraints that make it so.
//!
//! The engine is a pure function of pre-extracted facts: the
//! [`tracker::ConstraintTracker`] holds per-action read/write structure
//! ingested once per compilation pass, and the allocation snapshot is read
//! through the [`snapshot::AllocSnapshot`] seam, never mutated.

pub mod conditional;
pub mod error;
pub mod feasibility;
pub mod operand;
pub mod property;
pub mod snapshot;
pub mod solver;
pub mod tracker;

pub use conditional::{ConditionalConstraint, ConditionalConstraints};
pub use error::PackError;
pub use feasibility::{ActionPhvConstraints, InitActions};
pub use snapshot::{AllocSnapshot, Allocation};
pub use tracker::{BuildContext, ConstraintTracker};

#[cfg(test)]
mod tests;
