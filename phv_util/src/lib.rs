//! phv_util: Generic data structures and graph utilities.
//!
//! Nothing here knows about PHV semantics; these are the small containers
//! and graph algorithms the allocation crates are built on.

pub mod scc;
pub mod small_set;
pub mod union_find;

pub use scc::SccTopoSorter;
pub use small_set::SmallSet;
pub use union_find::UnionFind;

#[cfg(test)]
mod tests;
