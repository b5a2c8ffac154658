//! Dead-slot reclamation through dark containers and live-range shrinking.
//!
//! Two fields whose live ranges are not provably disjoint may still share
//! a container if the earlier resident can be parked in a spare dark
//! container while the later one occupies the slot, and moved back
//! afterwards. This crate decides whether such an overlay is legal and
//! where the initialization/move instructions go. Every infeasibility is
//! a `None` return: the allocator simply tries a different packing.

pub mod dark;
pub mod flow;
pub mod model;
pub mod usedef;

pub use dark::DarkLiveRange;
pub use flow::TableFlowGraph;
pub use model::{PipelineModel, StaticPipeline};
pub use usedef::{FieldUse, PipeUnit, UseDefMatrix};
