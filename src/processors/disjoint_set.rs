//! Disjoint-set (union-find) with enumerable subsets.
//!
//! Elements live in a flat arena addressed by insertion slot. Each record
//! holds a parent slot, a subtree size and a `next` slot forming a circular
//! list through every member of the same subset, so a subset can be listed in
//! O(size) without materialising any collection eagerly.
//!
//! - `find` uses path halving: every visited node is re-pointed at its
//!   grandparent on the way up
//! - `merge` is by size; on equal sizes the root inserted first absorbs the
//!   other, which keeps results independent of argument order
//!
//! The structure is sequential by nature. Callers discovering pairs in
//! parallel must funnel them through a single `merge` loop.
//!
//! Keys are mapped to slots through a hash map, one lookup per key argument.
//! Polygon ids reaching the clusterer need not be dense or start at zero
//! (callers may pass any subset of a layer), so the slot of a key cannot be
//! derived from the key itself. Everything after that lookup runs on slots.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use thiserror::Error;

/// Errors raised by [`DisjointSet`] lookups.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DisjointSetError {
    /// The element was never registered with [`DisjointSet::add`].
    #[error("unknown element {0}")]
    UnknownElement(String),
}

/// Result type for disjoint-set operations.
pub type Result<T> = std::result::Result<T, DisjointSetError>;

#[derive(Debug, Clone, Copy)]
struct Element {
    parent: usize,
    size: usize,
    next: usize,
}

/// Union-find over arbitrary copyable keys.
///
/// # Example
///
/// ```
/// use clearcut_clusters::processors::disjoint_set::DisjointSet;
///
/// let mut ds: DisjointSet<u32> = (0..4).collect();
/// assert!(ds.merge(0, 1).unwrap());
/// assert!(ds.merge(1, 3).unwrap());
/// assert!(!ds.merge(3, 0).unwrap());
/// assert_eq!(ds.subsets(), vec![vec![0, 1, 3], vec![2]]);
/// ```
#[derive(Debug, Clone)]
pub struct DisjointSet<K> {
    elements: Vec<Element>,
    keys: Vec<K>,
    slots: HashMap<K, usize>,
    subset_count: usize,
}

impl<K> Default for DisjointSet<K>
where
    K: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DisjointSet<K>
where
    K: Copy + Eq + Hash + Debug,
{
    /// Create an empty structure.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty structure with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: Vec::with_capacity(capacity),
            keys: Vec::with_capacity(capacity),
            slots: HashMap::with_capacity(capacity),
            subset_count: 0,
        }
    }

    /// Number of registered elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of distinct subsets.
    #[inline]
    pub fn subset_count(&self) -> usize {
        self.subset_count
    }

    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    /// Register `key` as a singleton subset.
    ///
    /// Returns `false` and leaves the structure untouched if `key` is already
    /// present. The insertion slot (current element count) is the tie-break
    /// key used by [`DisjointSet::merge`] and is never reassigned.
    pub fn add(&mut self, key: K) -> bool {
        if self.slots.contains_key(&key) {
            return false;
        }
        let slot = self.elements.len();
        self.elements.push(Element {
            parent: slot,
            size: 1,
            next: slot,
        });
        self.keys.push(key);
        self.slots.insert(key, slot);
        self.subset_count += 1;
        true
    }

    fn slot(&self, key: &K) -> Result<usize> {
        self.slots
            .get(key)
            .copied()
            .ok_or_else(|| DisjointSetError::UnknownElement(format!("{:?}", key)))
    }

    /// Root slot of `slot`, halving the path on the way.
    fn find_slot(&mut self, mut slot: usize) -> usize {
        loop {
            let parent = self.elements[slot].parent;
            if parent == slot {
                return slot;
            }
            let grandparent = self.elements[parent].parent;
            self.elements[slot].parent = grandparent;
            slot = grandparent;
        }
    }

    /// Representative of the subset containing `key`.
    ///
    /// # Errors
    ///
    /// [`DisjointSetError::UnknownElement`] if `key` was never added.
    pub fn find(&mut self, key: K) -> Result<K> {
        let slot = self.slot(&key)?;
        let root = self.find_slot(slot);
        Ok(self.keys[root])
    }

    /// True if `a` and `b` belong to the same subset.
    pub fn connected(&mut self, a: K, b: K) -> Result<bool> {
        let (a, b) = (self.slot(&a)?, self.slot(&b)?);
        Ok(self.find_slot(a) == self.find_slot(b))
    }

    /// Merge the subsets of `a` and `b`.
    ///
    /// Returns `false` if they were already connected. Otherwise the larger
    /// subset absorbs the smaller one, or the earlier-inserted root on a tie,
    /// and the membership rings of both subsets are spliced into one.
    pub fn merge(&mut self, a: K, b: K) -> Result<bool> {
        let (a, b) = (self.slot(&a)?, self.slot(&b)?);
        let (root_a, root_b) = (self.find_slot(a), self.find_slot(b));
        if root_a == root_b {
            return Ok(false);
        }

        let (size_a, size_b) = (self.elements[root_a].size, self.elements[root_b].size);
        let (parent, child) = if size_a > size_b || (size_a == size_b && root_a < root_b) {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };

        self.elements[child].parent = parent;
        self.elements[parent].size += self.elements[child].size;

        // Swapping the successors of two nodes of distinct rings joins the rings
        let next_parent = self.elements[parent].next;
        self.elements[parent].next = self.elements[child].next;
        self.elements[child].next = next_parent;

        self.subset_count -= 1;
        Ok(true)
    }

    /// Number of members in the subset containing `key`.
    pub fn subset_size(&mut self, key: K) -> Result<usize> {
        let slot = self.slot(&key)?;
        let root = self.find_slot(slot);
        Ok(self.elements[root].size)
    }

    /// Members of the subset containing `key`, in ring order starting at `key`.
    pub fn subset(&self, key: K) -> Result<Vec<K>> {
        let start = self.slot(&key)?;
        Ok(self.ring(start).map(|slot| self.keys[slot]).collect())
    }

    fn ring(&self, start: usize) -> impl Iterator<Item = usize> + '_ {
        let mut current = Some(start);
        std::iter::from_fn(move || {
            let slot = current?;
            let next = self.elements[slot].next;
            current = (next != start).then_some(next);
            Some(slot)
        })
    }

    /// Every subset, each listed in insertion order.
    ///
    /// Subsets are ordered by their earliest-inserted member. Elements are
    /// visited in insertion order; the first unvisited element of a subset
    /// walks its ring and marks every member seen.
    pub fn subsets(&self) -> Vec<Vec<K>> {
        let mut visited = vec![false; self.elements.len()];
        let mut result = Vec::with_capacity(self.subset_count);

        for start in 0..self.elements.len() {
            if visited[start] {
                continue;
            }
            let mut members: Vec<usize> = self.ring(start).collect();
            for &slot in &members {
                visited[slot] = true;
            }
            members.sort_unstable();
            result.push(members.into_iter().map(|slot| self.keys[slot]).collect());
        }
        result
    }
}

impl<K> FromIterator<K> for DisjointSet<K>
where
    K: Copy + Eq + Hash + Debug,
{
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut set = Self::with_capacity(iter.size_hint().0);
        for key in iter {
            set.add(key);
        }
        set
    }
}
