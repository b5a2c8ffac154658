//! Dark-overlay initialization primitives.
//!
//! When two fields share a container through live-range shrinking, the
//! overlay engine emits the initialization/move instructions that make the
//! sharing safe. These values are consumed by a later code-generation pass.

use std::fmt;

use crate::alloc_slice::AllocSlice;
use crate::ids::TableId;

/// What the initialization writes into its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitSource {
    /// Zero-fill the destination.
    Zero,
    /// Move the value currently held by another allocated slice.
    Slice(AllocSlice),
    /// Nothing to write; the entry only records ordering.
    Nop,
}

/// One required hardware initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DarkInitPrimitive {
    pub source: InitSource,
    /// Inserted as an Always-Run-Action (fires every pass through the
    /// stage regardless of match) rather than into an existing action.
    pub always_run: bool,
    /// Table whose actions carry the initialization, when not always-run.
    pub table: Option<TableId>,
}

impl DarkInitPrimitive {
    pub fn zero_at(table: TableId) -> Self {
        Self {
            source: InitSource::Zero,
            always_run: false,
            table: Some(table),
        }
    }

    pub fn move_from(source: AllocSlice, table: TableId) -> Self {
        Self {
            source: InitSource::Slice(source),
            always_run: false,
            table: Some(table),
        }
    }

    pub fn always_run(source: InitSource) -> Self {
        Self {
            source,
            always_run: true,
            table: None,
        }
    }

    pub fn nop() -> Self {
        Self {
            source: InitSource::Nop,
            always_run: false,
            table: None,
        }
    }

    pub fn is_nop(&self) -> bool {
        matches!(self.source, InitSource::Nop)
    }
}

/// A destination plus its initialization, with ordering links to other
/// entries of the same overlay (chained spill sequences must execute in
/// order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DarkInitEntry {
    pub dest: AllocSlice,
    pub prim: DarkInitPrimitive,
    /// Indices of entries that must execute before this one.
    pub prior: Vec<usize>,
    /// Indices of entries that must execute after this one.
    pub post: Vec<usize>,
}

impl DarkInitEntry {
    pub fn new(dest: AllocSlice, prim: DarkInitPrimitive) -> Self {
        Self {
            dest,
            prim,
            prior: Vec::new(),
            post: Vec::new(),
        }
    }
}

impl fmt::Display for DarkInitEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prim.source {
            InitSource::Zero => write!(f, "{} = 0", self.dest)?,
            InitSource::Slice(src) => write!(f, "{} = {}", self.dest, src)?,
            InitSource::Nop => write!(f, "{} (nop)", self.dest)?,
        }
        if self.prim.always_run {
            write!(f, " [always-run]")?;
        } else if let Some(t) = self.prim.table {
            write!(f, " @{t}")?;
        }
        Ok(())
    }
}
