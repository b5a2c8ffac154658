//! phv_model: Value types for PHV allocation.
//!
//! Fields, field slices, hardware containers, liveness intervals, allocated
//! slices, and dark-initialization primitives. Everything here is plain data:
//! the feasibility engine (`phv_pack`) and the overlay engine (`phv_overlay`)
//! consume these types but all policy lives there.

pub mod alloc_slice;
pub mod container;
pub mod dark;
pub mod device;
pub mod field;
pub mod ids;
pub mod liverange;
pub mod slice;
