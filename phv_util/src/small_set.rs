//! A set optimized for very small cardinalities.
//!
//! Almost every operand set and init-point set in a real program has four
//! or fewer members; a linear scan over an inline vector beats hash-set
//! overhead there by a wide margin. Once the set outgrows `N` it is
//! promoted, once, to an insertion-ordered index set. Promotion is never
//! reversed, so iteration order stays stable across the transition.

use std::hash::Hash;

use indexmap::IndexSet;
use smallvec::SmallVec;

/// Internal representation: a tagged union with a one-way transition
/// from `Linear` to `Indexed`.
#[derive(Debug, Clone)]
enum Repr<T: Eq + Hash, const N: usize> {
    /// Insertion-ordered inline vector, linear-scan lookup.
    Linear(SmallVec<[T; N]>),
    /// Insertion-ordered hash set, used once the set outgrows `N`.
    Indexed(IndexSet<T>),
}

/// Hybrid small-cardinality set. Semantics are identical before and after
/// promotion; callers cannot observe the representation except through
/// performance.
#[derive(Debug, Clone)]
pub struct SmallSet<T: Eq + Hash, const N: usize = 4> {
    repr: Repr<T, N>,
}

impl<T: Eq + Hash, const N: usize> Default for SmallSet<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash, const N: usize> SmallSet<T, N> {
    pub fn new() -> Self {
        Self {
            repr: Repr::Linear(SmallVec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Linear(v) => v.len(),
            Repr::Indexed(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, value: &T) -> bool {
        match &self.repr {
            Repr::Linear(v) => v.contains(value),
            Repr::Indexed(s) => s.contains(value),
        }
    }

    /// Insert, returning whether the value was newly added. Inserting the
    /// `N+1`-th distinct element promotes the representation in place.
    pub fn insert(&mut self, value: T) -> bool {
        match &mut self.repr {
            Repr::Linear(v) => {
                if v.contains(&value) {
                    return false;
                }
                if v.len() < N {
                    v.push(value);
                } else {
                    self.promote();
                    let Repr::Indexed(s) = &mut self.repr else {
                        unreachable!("promote leaves the set indexed");
                    };
                    s.insert(value);
                }
                true
            }
            Repr::Indexed(s) => s.insert(value),
        }
    }

    /// Remove a value, returning whether it was present. A promoted set
    /// never demotes, even if it shrinks below `N`.
    pub fn remove(&mut self, value: &T) -> bool {
        match &mut self.repr {
            Repr::Linear(v) => match v.iter().position(|x| x == value) {
                Some(i) => {
                    v.remove(i);
                    true
                }
                None => false,
            },
            // shift_remove keeps insertion order, matching the linear repr.
            Repr::Indexed(s) => s.shift_remove(value),
        }
    }

    /// Remove every element of `other` from this set.
    pub fn remove_all(&mut self, other: &SmallSet<T, N>) {
        for value in other.iter() {
            self.remove(value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        match &self.repr {
            Repr::Linear(v) => Iter::Linear(v.iter()),
            Repr::Indexed(s) => Iter::Indexed(s.iter()),
        }
    }

    pub fn clear(&mut self) {
        self.repr = Repr::Linear(SmallVec::new());
    }

    /// Switch to the indexed representation. Insertion order is preserved;
    /// the transition is irreversible.
    fn promote(&mut self) {
        if let Repr::Linear(v) = &mut self.repr {
            let set: IndexSet<T> = std::mem::take(v).into_iter().collect();
            self.repr = Repr::Indexed(set);
        }
    }
}

impl<T: Eq + Hash, const N: usize> FromIterator<T> for SmallSet<T, N> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl<T: Eq + Hash, const N: usize> Extend<T> for SmallSet<T, N> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

enum Iter<'a, T> {
    Linear(std::slice::Iter<'a, T>),
    Indexed(indexmap::set::Iter<'a, T>),
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        match self {
            Iter::Linear(it) => it.next(),
            Iter::Indexed(it) => it.next(),
        }
    }
}
