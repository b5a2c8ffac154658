//! Table-dependency flow graph, used to veto Always-Run-Action edges.

use std::collections::{BTreeMap, BTreeSet};

use phv_model::ids::TableId;

/// Directed dependency edges between tables. Inserting an Always-Run
/// initialization between two tables adds a direct edge to this graph;
/// the insertion is illegal if the edge would close a cycle.
#[derive(Debug, Default)]
pub struct TableFlowGraph {
    succs: BTreeMap<TableId, BTreeSet<TableId>>,
}

impl TableFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, from: TableId, to: TableId) {
        self.succs.entry(from).or_default().insert(to);
    }

    /// Whether adding `from -> to` would create a cycle: true when `from`
    /// is already reachable from `to`.
    pub fn creates_cycle(&self, from: TableId, to: TableId) -> bool {
        if from == to {
            return true;
        }
        let mut stack = vec![to];
        let mut seen: BTreeSet<TableId> = BTreeSet::new();
        while let Some(t) = stack.pop() {
            if t == from {
                return true;
            }
            if !seen.insert(t) {
                continue;
            }
            if let Some(next) = self.succs.get(&t) {
                stack.extend(next.iter().copied());
            }
        }
        false
    }
}
