//! Dependency ranking robust to cycles.
//!
//! Computes strongly connected components and assigns every node in the
//! same component the same rank, with ranks increasing from sources to
//! sinks. Used to order field slices by "source before destination"
//! precedence; a dependency cycle collapses to one rank instead of
//! wedging the ordering.

use std::collections::HashMap;

use smallvec::SmallVec;

/// SCC-based topological sorter over small dependency graphs.
///
/// Node ids start at 1 and grow monotonically. There are no failure
/// modes: every graph, cyclic or not, produces a total rank.
#[derive(Debug, Default)]
pub struct SccTopoSorter {
    /// Successor lists, indexed by node id - 1. `succs[a]` contains `b`
    /// when b depends on a.
    succs: Vec<SmallVec<[u32; 4]>>,
}

impl SccTopoSorter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh node. Ids start at 1.
    pub fn new_node(&mut self) -> u32 {
        self.succs.push(SmallVec::new());
        self.succs.len() as u32
    }

    /// Record "`b` depends on `a`". Duplicate edges are ignored.
    pub fn add_dep(&mut self, a: u32, b: u32) {
        let n = self.succs.len() as u32;
        assert!(a >= 1 && a <= n && b >= 1 && b <= n, "unknown node in dep {a} -> {b}");
        let list = &mut self.succs[(a - 1) as usize];
        if !list.contains(&b) {
            list.push(b);
        }
    }

    /// Compute per-node ranks. Nodes in one SCC share a rank; rank 1 means
    /// no unresolved dependency; a node's rank is one more than the
    /// largest rank among the components it depends on.
    pub fn scc_topo_sort(&self) -> HashMap<u32, u32> {
        let n = self.succs.len();
        let comp = self.tarjan();

        // Component successor sets and in-degrees, skipping intra-SCC edges.
        let comp_count = comp.iter().copied().max().map_or(0, |c| c as usize + 1);
        let mut comp_succs: Vec<SmallVec<[u32; 4]>> = vec![SmallVec::new(); comp_count];
        let mut indegree = vec![0u32; comp_count];
        for a in 0..n {
            for &b in &self.succs[a] {
                let (ca, cb) = (comp[a], comp[(b - 1) as usize]);
                if ca != cb && !comp_succs[ca as usize].contains(&cb) {
                    comp_succs[ca as usize].push(cb);
                    indegree[cb as usize] += 1;
                }
            }
        }

        // Longest path from sources over the condensation (a DAG).
        let mut rank = vec![1u32; comp_count];
        let mut ready: Vec<u32> = (0..comp_count as u32)
            .filter(|&c| indegree[c as usize] == 0)
            .collect();
        while let Some(c) = ready.pop() {
            for &s in &comp_succs[c as usize] {
                rank[s as usize] = rank[s as usize].max(rank[c as usize] + 1);
                indegree[s as usize] -= 1;
                if indegree[s as usize] == 0 {
                    ready.push(s);
                }
            }
        }

        (0..n)
            .map(|i| (i as u32 + 1, rank[comp[i] as usize]))
            .collect()
    }

    /// Iterative Tarjan. Returns the component index of each node
    /// (0-based, indexed by node id - 1).
    fn tarjan(&self) -> Vec<u32> {
        let n = self.succs.len();
        const UNVISITED: u32 = u32::MAX;

        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0u32; n];
        let mut on_stack = vec![false; n];
        let mut comp = vec![UNVISITED; n];
        let mut stack: Vec<u32> = Vec::new();
        let mut next_index = 0u32;
        let mut comp_count = 0u32;

        // Explicit DFS frames: (node, next successor position).
        let mut frames: Vec<(u32, usize)> = Vec::new();

        for root in 0..n as u32 {
            if index[root as usize] != UNVISITED {
                continue;
            }
            frames.push((root, 0));
            while let Some(frame) = frames.last_mut() {
                let v = frame.0;
                let vi = v as usize;
                if frame.1 == 0 {
                    index[vi] = next_index;
                    lowlink[vi] = next_index;
                    next_index += 1;
                    stack.push(v);
                    on_stack[vi] = true;
                }
                let mut descend = None;
                while frame.1 < self.succs[vi].len() {
                    let w = self.succs[vi][frame.1] - 1;
                    frame.1 += 1;
                    let wi = w as usize;
                    if index[wi] == UNVISITED {
                        descend = Some(w);
                        break;
                    } else if on_stack[wi] {
                        lowlink[vi] = lowlink[vi].min(index[wi]);
                    }
                }
                if let Some(w) = descend {
                    frames.push((w, 0));
                    continue;
                }
                // All successors processed: close the frame.
                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    let pi = parent as usize;
                    lowlink[pi] = lowlink[pi].min(lowlink[vi]);
                }
                if lowlink[vi] == index[vi] {
                    loop {
                        let w = stack.pop().expect("scc stack underflow");
                        on_stack[w as usize] = false;
                        comp[w as usize] = comp_count;
                        if w == v {
                            break;
                        }
                    }
                    comp_count += 1;
                }
            }
        }
        comp
    }
}
