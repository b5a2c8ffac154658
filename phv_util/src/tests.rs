//! Tests for the generic utilities.

use crate::scc::SccTopoSorter;
use crate::small_set::SmallSet;
use crate::union_find::UnionFind;

// ---------------------------------------------------------------------------
// SccTopoSorter
// ---------------------------------------------------------------------------

#[test]
fn scc_ids_start_at_one() {
    let mut sorter = SccTopoSorter::new();
    assert_eq!(sorter.new_node(), 1);
    assert_eq!(sorter.new_node(), 2);
    assert_eq!(sorter.new_node(), 3);
}

#[test]
fn scc_linear_chain_ranks() {
    let mut sorter = SccTopoSorter::new();
    let a = sorter.new_node();
    let b = sorter.new_node();
    let c = sorter.new_node();
    sorter.add_dep(a, b);
    sorter.add_dep(b, c);

    let ranks = sorter.scc_topo_sort();
    assert_eq!(ranks[&a], 1);
    assert_eq!(ranks[&b], 2);
    assert_eq!(ranks[&c], 3);
}

#[test]
fn scc_cycle_collapses_to_one_rank() {
    // a -> b -> c -> a, plus d -> b.
    let mut sorter = SccTopoSorter::new();
    let a = sorter.new_node();
    let b = sorter.new_node();
    let c = sorter.new_node();
    let d = sorter.new_node();
    sorter.add_dep(a, b);
    sorter.add_dep(b, c);
    sorter.add_dep(c, a);
    sorter.add_dep(d, b);

    let ranks = sorter.scc_topo_sort();
    assert_eq!(ranks[&a], ranks[&b]);
    assert_eq!(ranks[&b], ranks[&c]);
    // d feeds the cycle, so the cycle ranks strictly above d.
    assert!(ranks[&d] < ranks[&a]);
    assert_eq!(ranks[&d], 1);
}

#[test]
fn scc_consumer_of_cycle_ranks_above_it() {
    let mut sorter = SccTopoSorter::new();
    let a = sorter.new_node();
    let b = sorter.new_node();
    let c = sorter.new_node();
    let sink = sorter.new_node();
    sorter.add_dep(a, b);
    sorter.add_dep(b, c);
    sorter.add_dep(c, a);
    sorter.add_dep(c, sink);

    let ranks = sorter.scc_topo_sort();
    assert_eq!(ranks[&a], 1);
    assert_eq!(ranks[&b], 1);
    assert_eq!(ranks[&c], 1);
    assert_eq!(ranks[&sink], 2);
}

#[test]
fn scc_duplicate_edges_ignored() {
    let mut sorter = SccTopoSorter::new();
    let a = sorter.new_node();
    let b = sorter.new_node();
    sorter.add_dep(a, b);
    sorter.add_dep(a, b);
    sorter.add_dep(a, b);

    let ranks = sorter.scc_topo_sort();
    assert_eq!(ranks[&a], 1);
    assert_eq!(ranks[&b], 2);
}

#[test]
fn scc_disconnected_nodes_rank_one() {
    let mut sorter = SccTopoSorter::new();
    let a = sorter.new_node();
    let b = sorter.new_node();
    let ranks = sorter.scc_topo_sort();
    assert_eq!(ranks[&a], 1);
    assert_eq!(ranks[&b], 1);
}

// ---------------------------------------------------------------------------
// SmallSet
// ---------------------------------------------------------------------------

#[test]
fn small_set_basic_ops() {
    let mut set: SmallSet<u32, 4> = SmallSet::new();
    assert!(set.is_empty());
    assert!(set.insert(3));
    assert!(set.insert(1));
    assert!(!set.insert(3));
    assert_eq!(set.len(), 2);
    assert!(set.contains(&1));
    assert!(!set.contains(&2));
    assert!(set.remove(&1));
    assert!(!set.remove(&1));
    assert_eq!(set.len(), 1);
}

#[test]
fn small_set_promotion_preserves_contents_and_order() {
    let mut set: SmallSet<u32, 4> = SmallSet::new();
    let values = [9, 2, 7, 4];
    for v in values {
        set.insert(v);
    }
    let before: Vec<u32> = set.iter().copied().collect();
    assert_eq!(before, vec![9, 2, 7, 4]);

    // The fifth distinct element forces promotion.
    assert!(set.insert(11));
    assert_eq!(set.len(), 5);
    for v in values {
        assert!(set.contains(&v));
    }
    assert!(set.contains(&11));

    // The first four keep their insertion order across promotion.
    let after: Vec<u32> = set.iter().copied().collect();
    assert_eq!(&after[..4], &before[..]);
    assert_eq!(after[4], 11);
}

#[test]
fn small_set_remove_after_promotion() {
    let mut set: SmallSet<u32, 2> = SmallSet::new();
    for v in [1, 2, 3, 4, 5] {
        set.insert(v);
    }
    assert!(set.remove(&3));
    assert!(!set.contains(&3));
    assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![1, 2, 4, 5]);
    // Shrinking below N does not demote; inserting still works.
    set.remove(&1);
    set.remove(&2);
    set.remove(&4);
    assert!(set.insert(6));
    assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![5, 6]);
}

#[test]
fn small_set_remove_all() {
    let mut a: SmallSet<u32, 4> = [1, 2, 3, 4, 5].into_iter().collect();
    let b: SmallSet<u32, 4> = [2, 4, 9].into_iter().collect();
    a.remove_all(&b);
    assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![1, 3, 5]);
}

// ---------------------------------------------------------------------------
// UnionFind
// ---------------------------------------------------------------------------

#[test]
fn union_find_groups() {
    let mut uf: UnionFind<&str> = UnionFind::new();
    uf.union("a", "b");
    uf.union("c", "d");
    uf.union("b", "d");
    uf.insert("lone");

    assert!(uf.same_set(&"a", &"c"));
    assert!(!uf.same_set(&"a", &"lone"));
    assert!(!uf.same_set(&"a", &"never-seen"));

    let groups = uf.groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0], vec!["a", "b", "c", "d"]);
    assert_eq!(groups[1], vec!["lone"]);
}
