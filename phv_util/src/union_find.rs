//! Union-find over arbitrary hashable values.
//!
//! Backs the "these unallocated slices must land in one container"
//! co-pack grouping: every `union` merges two requirement sets, and
//! `groups` reads the final partition back out.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Default)]
pub struct UnionFind<T: Eq + Hash + Clone> {
    ids: HashMap<T, usize>,
    values: Vec<T>,
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl<T: Eq + Hash + Clone> UnionFind<T> {
    pub fn new() -> Self {
        Self {
            ids: HashMap::new(),
            values: Vec::new(),
            parent: Vec::new(),
            size: Vec::new(),
        }
    }

    /// Ensure `value` is tracked, as a singleton if previously unseen.
    pub fn insert(&mut self, value: T) -> usize {
        if let Some(&id) = self.ids.get(&value) {
            return id;
        }
        let id = self.parent.len();
        self.ids.insert(value.clone(), id);
        self.values.push(value);
        self.parent.push(id);
        self.size.push(1);
        id
    }

    /// Merge the sets containing `a` and `b` (inserting either if new).
    pub fn union(&mut self, a: T, b: T) {
        let ra = self.insert(a);
        let rb = self.insert(b);
        let (mut ra, mut rb) = (self.find(ra), self.find(rb));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }

    /// Whether `a` and `b` are known to be in the same set.
    pub fn same_set(&mut self, a: &T, b: &T) -> bool {
        match (self.ids.get(a).copied(), self.ids.get(b).copied()) {
            (Some(ia), Some(ib)) => self.find(ia) == self.find(ib),
            _ => false,
        }
    }

    /// The current partition, singletons included. Each group lists values
    /// in insertion order; groups are ordered by their earliest member.
    pub fn groups(&mut self) -> Vec<Vec<T>> {
        let mut by_root: HashMap<usize, (usize, Vec<T>)> = HashMap::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            let entry = by_root.entry(root).or_insert_with(|| (i, Vec::new()));
            entry.1.push(self.values[i].clone());
        }
        let mut groups: Vec<(usize, Vec<T>)> = by_root.into_values().collect();
        groups.sort_unstable_by_key(|(first, _)| *first);
        groups.into_iter().map(|(_, g)| g).collect()
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            // Path halving.
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }
}
