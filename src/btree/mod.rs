//! The tree core: four multiway B-tree variants sharing one on-disk page
//! format and one set of traversal primitives, differing only in their
//! occupancy bounds and in how they split, share and merge nodes.

mod dot;
mod tree;

pub use dot::write_dot;
pub use tree::Tree;

/// Which member of the family a [`Tree`] implements. Stored only in memory —
/// a tree file does not record its own kind, the same way the original
/// library required the caller to pick a tree type up front when opening a
/// file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Classical B-tree: keys and child pointers live in every node, split
    /// promotes (and removes) the median key, rebalancing merges or borrows
    /// one key at a time.
    BTree,
    /// B+-tree: interior nodes hold routing copies only; all keys live in
    /// the leaves. A leaf split copies its new first key up as a router
    /// instead of removing it from the leaf.
    BPlusTree,
    /// B*-tree: nodes are kept at least two-thirds full. A full node first
    /// tries to share one key with a sibling before splitting; when it must
    /// split, two full siblings become three roughly-even nodes instead of
    /// one node becoming two.
    BStarTree,
    /// B*+-tree: B*-tree occupancy and split/share policy, with B+-tree leaf
    /// semantics (leaves retain their keys; interior nodes hold routers).
    BStarPlusTree,
}

impl Kind {
    pub fn is_star(self) -> bool {
        matches!(self, Kind::BStarTree | Kind::BStarPlusTree)
    }

    pub fn is_plus(self) -> bool {
        matches!(self, Kind::BPlusTree | Kind::BStarPlusTree)
    }
}

/// Occupancy bounds derived from a tree's `order`, fixed for the lifetime of
/// the tree and recomputed identically whenever a file is reopened.
///
/// Every page on disk has the same physical capacity, `max_keys`, which is
/// why `max_root_keys` (the largest bound any node, including the root,
/// ever needs) sizes the page rather than the ordinary non-root `max_keys`
/// bound: a star-family root that has not yet split can hold more keys than
/// its eventual children will.
#[derive(Debug, Clone, Copy)]
pub struct Derived {
    /// The variant these bounds were derived for.
    pub kind: Kind,
    /// Maximum keys a non-root internal node may hold (and, for every kind
    /// but plain B+-tree, a non-root leaf too).
    pub max_keys: usize,
    /// Minimum keys a non-root internal node must hold after any operation
    /// (and, for every kind but plain B+-tree, a non-root leaf too).
    pub min_keys: usize,
    /// Maximum keys the root may hold before it must split. Only star kinds
    /// give the root a roomier ceiling than `max_keys`; see
    /// [`Derived::max_root_keys_for`].
    pub max_root_keys: usize,
    /// Maximum keys a non-root leaf may hold. Equal to `max_keys` except for
    /// plain B+-tree, whose leaves use `2t` instead of the internal `2t−1`.
    pub max_leaf_keys: usize,
    /// Minimum keys a non-root leaf must hold. Equal to `min_keys` except
    /// for plain B+-tree, whose leaves use `t` instead of the internal `t−1`.
    pub min_leaf_keys: usize,
    /// Three-way split product sizes for star kinds (unused otherwise): a
    /// full node's keys, its separator, and a full sibling's keys divide
    /// into these three roughly-even groups. `short_right_split` is used
    /// in place of `right_split` when only one of the two siblings being
    /// split was actually full.
    pub left_split: usize,
    pub middle_split: usize,
    pub right_split: usize,
    pub short_right_split: usize,
}

impl Derived {
    pub fn for_kind(kind: Kind, order: u16) -> Self {
        let t = order as usize;
        if kind.is_star() {
            let max_keys = t;
            let min_keys = (2 * t - 2 + 2) / 3; // ceil((2t-2)/3)
            Derived {
                kind,
                max_keys,
                min_keys,
                max_root_keys: 2 * min_keys + 1,
                max_leaf_keys: max_keys,
                min_leaf_keys: min_keys,
                left_split: (2 * t - 1) / 3,
                middle_split: (2 * t) / 3,
                right_split: (2 * t + 1) / 3,
                short_right_split: (2 * t + 1) / 3 - 1,
            }
        } else {
            let max_keys = 2 * t - 1;
            let min_keys = t - 1;
            // Plain B+-tree leaves hold every key (interior nodes hold
            // routing copies only), so they run to a full `2t` instead of
            // the `2t−1` an interior node stops at.
            let (max_leaf_keys, min_leaf_keys) = if kind == Kind::BPlusTree {
                (2 * t, t)
            } else {
                (max_keys, min_keys)
            };
            Derived {
                kind,
                max_keys,
                min_keys,
                max_root_keys: max_keys,
                max_leaf_keys,
                min_leaf_keys,
                left_split: 0,
                middle_split: 0,
                right_split: 0,
                short_right_split: 0,
            }
        }
    }

    /// Maximum keys a non-root page of the given leaf-ness may hold.
    pub fn max_keys_for(&self, is_leaf: bool) -> usize {
        if is_leaf {
            self.max_leaf_keys
        } else {
            self.max_keys
        }
    }

    /// Minimum keys a non-root page of the given leaf-ness must hold.
    pub fn min_keys_for(&self, is_leaf: bool) -> usize {
        if is_leaf {
            self.min_leaf_keys
        } else {
            self.min_keys
        }
    }

    /// Overflow bound for the root specifically: star kinds get a roomier
    /// ceiling regardless of whether the root is currently a leaf; other
    /// kinds give the root the same bound any other page of that shape gets.
    pub fn max_root_keys_for(&self, is_leaf: bool) -> usize {
        if self.kind.is_star() {
            self.max_root_keys
        } else {
            self.max_keys_for(is_leaf)
        }
    }

    /// Physical per-page key capacity: every page in the file is sized to
    /// hold the largest bound any node kind or shape admits.
    pub fn page_max_keys(&self) -> usize {
        self.max_root_keys.max(self.max_keys).max(self.max_leaf_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classical_bounds_match_minimum_degree_definition() {
        let d = Derived::for_kind(Kind::BTree, 4);
        assert_eq!(d.max_keys, 7);
        assert_eq!(d.min_keys, 3);
        assert_eq!(d.max_root_keys, 7);
    }

    #[test]
    fn star_bounds_enforce_two_thirds_fill_and_a_roomier_root() {
        let d = Derived::for_kind(Kind::BStarTree, 4);
        assert_eq!(d.max_keys, 4);
        assert_eq!(d.min_keys, 2);
        assert_eq!(d.max_root_keys, 5);
        assert_eq!(d.left_split, 2);
        assert_eq!(d.middle_split, 2);
        assert_eq!(d.right_split, 3);
        assert_eq!(d.short_right_split, 2);
        // Star leaves share the internal bound; no separate leaf ceiling.
        assert_eq!(d.max_leaf_keys, d.max_keys);
        assert_eq!(d.min_leaf_keys, d.min_keys);
    }

    #[test]
    fn bplus_leaf_bounds_differ_from_internal_bounds() {
        let d = Derived::for_kind(Kind::BPlusTree, 4);
        assert_eq!(d.max_keys, 7);
        assert_eq!(d.min_keys, 3);
        assert_eq!(d.max_leaf_keys, 8);
        assert_eq!(d.min_leaf_keys, 4);
        assert_eq!(d.page_max_keys(), 8);
    }

    #[test]
    fn plain_btree_leaves_share_the_internal_bound() {
        let d = Derived::for_kind(Kind::BTree, 4);
        assert_eq!(d.max_leaf_keys, d.max_keys);
        assert_eq!(d.min_leaf_keys, d.min_keys);
    }

    #[test]
    fn star_plus_leaves_share_the_star_bound_not_a_doubled_one() {
        let d = Derived::for_kind(Kind::BStarPlusTree, 4);
        assert_eq!(d.max_leaf_keys, d.max_keys);
        assert_eq!(d.min_leaf_keys, d.min_keys);
    }
}
