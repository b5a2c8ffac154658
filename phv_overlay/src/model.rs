//! Seam to the table-placement and dependency-graph collaborators.

use std::collections::{BTreeMap, BTreeSet};

use phv_model::ids::TableId;

/// Placement and dependency facts about the match-action pipeline,
/// queried per call and never cached here.
pub trait PipelineModel {
    /// Earliest stage the table can be placed in, per the dependency
    /// graph.
    fn min_stage(&self, table: TableId) -> u16;

    /// Concrete stages the table occupies after placement; empty before
    /// placement, when only `min_stage` is known.
    fn physical_stages(&self, table: TableId) -> Vec<u16>;

    /// Length of the control/anti dependency chain hanging off this
    /// table. A table at stage `s` with tail `t` forces the pipeline to
    /// be at least `s + t + 1` stages long.
    fn dependence_tail_size(&self, table: TableId) -> u16;

    /// Whether two tables can never both execute on one packet.
    fn mutually_exclusive(&self, a: TableId, b: TableId) -> bool;

    /// Immediate dominator in the non-gateway table control flow, or
    /// `None` at the entry.
    fn dominator(&self, table: TableId) -> Option<TableId>;

    /// Tables excluded from carrying initializations: too large,
    /// multi-stage, or pragma-excluded.
    fn do_not_init(&self, table: TableId) -> bool;
}

/// Map-backed [`PipelineModel`] filled in by the placement pass.
#[derive(Debug, Default)]
pub struct StaticPipeline {
    min_stage: BTreeMap<TableId, u16>,
    physical: BTreeMap<TableId, Vec<u16>>,
    tail: BTreeMap<TableId, u16>,
    dominator: BTreeMap<TableId, TableId>,
    mutex: BTreeSet<(TableId, TableId)>,
    no_init: BTreeSet<TableId>,
}

impl StaticPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stage(&mut self, table: TableId, stage: u16) {
        self.min_stage.insert(table, stage);
    }

    pub fn set_physical_stages(&mut self, table: TableId, stages: Vec<u16>) {
        self.physical.insert(table, stages);
    }

    pub fn set_tail(&mut self, table: TableId, tail: u16) {
        self.tail.insert(table, tail);
    }

    pub fn set_dominator(&mut self, table: TableId, dom: TableId) {
        self.dominator.insert(table, dom);
    }

    pub fn set_mutually_exclusive(&mut self, a: TableId, b: TableId) {
        self.mutex.insert(ordered(a, b));
    }

    pub fn forbid_init(&mut self, table: TableId) {
        self.no_init.insert(table);
    }
}

impl PipelineModel for StaticPipeline {
    fn min_stage(&self, table: TableId) -> u16 {
        self.min_stage.get(&table).copied().unwrap_or(0)
    }

    fn physical_stages(&self, table: TableId) -> Vec<u16> {
        self.physical.get(&table).cloned().unwrap_or_default()
    }

    fn dependence_tail_size(&self, table: TableId) -> u16 {
        self.tail.get(&table).copied().unwrap_or(0)
    }

    fn mutually_exclusive(&self, a: TableId, b: TableId) -> bool {
        self.mutex.contains(&ordered(a, b))
    }

    fn dominator(&self, table: TableId) -> Option<TableId> {
        self.dominator.get(&table).copied()
    }

    fn do_not_init(&self, table: TableId) -> bool {
        self.no_init.contains(&table)
    }
}

fn ordered(a: TableId, b: TableId) -> (TableId, TableId) {
    if a.0 <= b.0 {
        (a, b)
    } else {
        (b, a)
    }
}
