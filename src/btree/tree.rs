//! The shared tree engine: one generic [`Tree`] type implements all four
//! variants by branching on [`Kind`] only where the variants actually
//! disagree — occupancy bounds, whether a full node splits outright or
//! shares a key with a sibling first, and whether a leaf split/merge copies
//! its boundary key up as a router or promotes (and removes) it. Traversal,
//! the page codec and the disk layer are identical for every variant.

use std::path::Path;

use tracing::{debug, trace};

use crate::btree::{Derived, Kind};
use crate::comparator::{ByteComparator, Comparator};
use crate::error::{Result, TreeError};
use crate::page::{PageBuf, MAX_KEYS_NUM};
use crate::printer::KeyPrinter;
use crate::storage::paged_file::NULL_PAGE;
use crate::storage::PagedFile;

pub struct Tree<C: Comparator = ByteComparator> {
    file: PagedFile,
    kind: Kind,
    derived: Derived,
    comparator: C,
    max_search_depth: usize,
}

impl<C: Comparator> Tree<C> {
    /// Creates a brand-new, empty tree file. `order` must be at least 2;
    /// `rec_size` is the fixed byte length of every key this tree will
    /// store.
    pub fn create(path: &Path, kind: Kind, order: u16, rec_size: u16, comparator: C) -> Result<Self> {
        if kind.is_star() && order < 4 {
            return Err(TreeError::argument(format!(
                "{kind:?} requires order >= 4, got {order}"
            )));
        }
        let derived = Derived::for_kind(kind, order);
        if derived.page_max_keys() > MAX_KEYS_NUM {
            return Err(TreeError::argument(format!(
                "order {order} pushes per-page key capacity to {}, exceeding the {MAX_KEYS_NUM} ceiling",
                derived.page_max_keys()
            )));
        }
        let file = PagedFile::create(path, order, rec_size, derived.page_max_keys())?;
        debug!(
            "created {kind:?} tree at {path:?} (max_keys={}, min_keys={}, max_root_keys={})",
            derived.max_keys, derived.min_keys, derived.max_root_keys
        );
        Ok(Self {
            file,
            kind,
            derived,
            comparator,
            max_search_depth: 0,
        })
    }

    /// Opens an existing tree file. The caller must supply the same `kind`
    /// the file was created with; nothing on disk records it.
    pub fn open(path: &Path, kind: Kind, comparator: C) -> Result<Self> {
        let header = PagedFile::peek_header(path)?;
        if kind.is_star() && header.order < 4 {
            return Err(TreeError::argument(format!(
                "{kind:?} requires order >= 4, file header has order {}",
                header.order
            )));
        }
        let derived = Derived::for_kind(kind, header.order);
        if derived.page_max_keys() > MAX_KEYS_NUM {
            return Err(TreeError::corruption(format!(
                "header order {} pushes per-page key capacity to {}, exceeding the {MAX_KEYS_NUM} ceiling",
                header.order,
                derived.page_max_keys()
            )));
        }
        let file = PagedFile::open(path, derived.page_max_keys())?;
        debug!(
            "opened {kind:?} tree at {path:?} root_page_num={} last_page_num={}",
            file.root_page_num(),
            file.last_page_num()
        );
        Ok(Self {
            file,
            kind,
            derived,
            comparator,
            max_search_depth: 0,
        })
    }

    pub fn close(mut self) -> Result<()> {
        self.file.flush()
    }

    // ---- diagnostics -----------------------------------------------------

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn order(&self) -> u16 {
        self.file.order()
    }

    pub fn rec_size(&self) -> usize {
        self.file.rec_size() as usize
    }

    pub fn max_keys(&self) -> usize {
        self.derived.max_keys
    }

    pub fn min_keys(&self) -> usize {
        self.derived.min_keys
    }

    pub fn max_root_keys(&self) -> usize {
        self.derived.max_root_keys
    }

    pub fn max_leaf_keys(&self) -> usize {
        self.derived.max_leaf_keys
    }

    pub fn min_leaf_keys(&self) -> usize {
        self.derived.min_leaf_keys
    }

    pub fn last_page_num(&self) -> u32 {
        self.file.last_page_num()
    }

    pub fn root_page_num(&self) -> u32 {
        self.file.root_page_num()
    }

    pub fn max_search_depth(&self) -> usize {
        self.max_search_depth
    }

    pub fn disk_operations_count(&self) -> u64 {
        self.file.disk_operations_count()
    }

    pub fn reset_disk_operations_count(&mut self) {
        self.file.reset_disk_operations_count();
    }

    pub fn write_dot(&mut self, path: &Path, printer: &dyn KeyPrinter) -> Result<()> {
        crate::btree::dot::write_dot(&mut self.file, printer, path)
    }

    // ---- key helpers -------------------------------------------------

    fn validate_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.rec_size() {
            return Err(TreeError::argument(format!(
                "key is {} bytes, tree record size is {}",
                key.len(),
                self.rec_size()
            )));
        }
        Ok(())
    }

    /// First index `i` in `[0, page.keys_count()]` such that `key < page.key(i)`.
    fn upper_bound(&self, page: &PageBuf, key: &[u8]) -> usize {
        let rec = self.rec_size();
        let count = page.keys_count();
        let mut i = 0;
        while i < count && !self.comparator.less(key, page.key(i), rec) {
            i += 1;
        }
        i
    }

    fn find_equal(&self, page: &PageBuf, key: &[u8]) -> Option<usize> {
        let rec = self.rec_size();
        (0..page.keys_count()).find(|&i| self.comparator.equal(page.key(i), key, rec))
    }

    fn build_page(&self, keys: &[Vec<u8>], cursors: &[u32], leaf: bool) -> PageBuf {
        let mut page = PageBuf::new(self.file.max_keys(), self.file.rec_size() as usize);
        page.set_leaf(leaf);
        for (i, k) in keys.iter().enumerate() {
            page.set_key(i, k);
        }
        if !leaf {
            for (i, c) in cursors.iter().enumerate() {
                page.set_cursor(i, *c);
            }
        }
        page.set_keys_count(keys.len());
        page
    }

    // ---- search ------------------------------------------------------

    pub fn search(&mut self, key: &[u8]) -> Result<bool> {
        self.validate_key(key)?;
        if self.file.root_page_num() == NULL_PAGE {
            return Ok(false);
        }
        let mut cur_num = self.file.root_page_num();
        let mut depth = 1;
        loop {
            let cur = self.file.read_page(cur_num)?;
            if !self.kind.is_plus() && self.find_equal(&cur, key).is_some() {
                self.max_search_depth = self.max_search_depth.max(depth);
                return Ok(true);
            }
            if cur.is_leaf() {
                let idx = self.upper_bound(&cur, key);
                let found = idx > 0 && self.comparator.equal(cur.key(idx - 1), key, self.rec_size());
                self.max_search_depth = self.max_search_depth.max(depth);
                return Ok(found);
            }
            let idx = self.upper_bound(&cur, key);
            cur_num = cur.cursor(idx);
            depth += 1;
        }
    }

    /// Returns every stored record the comparator considers equal to `key`.
    /// For a comparator that orders by full key identity this is at most
    /// one record; comparators that consider only part of a key can return
    /// several, possibly spanning more than one leaf, which is why the
    /// descent below always continues one child past the last matching
    /// position rather than stopping at the first miss.
    pub fn search_all(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.validate_key(key)?;
        let mut out = Vec::new();
        if self.file.root_page_num() != NULL_PAGE {
            let root = self.file.root_page_num();
            self.collect_all(root, key, &mut out, 1)?;
        }
        Ok(out)
    }

    fn collect_all(&mut self, node_num: u32, key: &[u8], out: &mut Vec<Vec<u8>>, depth: usize) -> Result<()> {
        let node = self.file.read_page(node_num)?;
        self.max_search_depth = self.max_search_depth.max(depth);
        let rec = self.rec_size();

        if node.is_leaf() {
            for i in 0..node.keys_count() {
                if self.comparator.equal(node.key(i), key, rec) {
                    out.push(node.key(i).to_vec());
                }
            }
            return Ok(());
        }
        if !self.kind.is_plus() {
            for i in 0..node.keys_count() {
                if self.comparator.equal(node.key(i), key, rec) {
                    out.push(node.key(i).to_vec());
                }
            }
        }
        let idx = self.upper_bound(&node, key);
        let mut lo = idx;
        while lo > 0 && self.comparator.equal(node.key(lo - 1), key, rec) {
            lo -= 1;
        }
        let hi = idx.min(node.keys_count());
        for c in lo..=hi {
            let child_num = node.cursor(c);
            if child_num != NULL_PAGE {
                self.collect_all(child_num, key, out, depth + 1)?;
            }
        }
        Ok(())
    }

    // ---- insert --------------------------------------------------------

    pub fn insert(&mut self, key: &[u8]) -> Result<bool> {
        self.validate_key(key)?;

        if self.file.root_page_num() == NULL_PAGE {
            let (num, mut page) = self.file.alloc_page()?;
            page.set_leaf(true);
            page.set_key(0, key);
            page.set_keys_count(1);
            self.file.write_page(num, &page)?;
            self.file.set_root_page_num(num)?;
            self.max_search_depth = self.max_search_depth.max(1);
            return Ok(true);
        }

        let mut cur_num = self.file.root_page_num();
        let mut cur = self.file.read_page(cur_num)?;
        if cur.keys_count() >= self.derived.max_root_keys_for(cur.is_leaf()) {
            cur_num = self.split_root(cur_num, cur)?;
            cur = self.file.read_page(cur_num)?;
        }

        // The structure is a multiset: every call places a new key, subject
        // only to split bookkeeping along the way down. Duplicates are not
        // special-cased here; `search`/`remove` are where first-match
        // semantics live.
        let mut depth = 1;
        loop {
            if cur.is_leaf() {
                let idx = self.upper_bound(&cur, key);
                cur.open_key_gap(idx);
                cur.set_key(idx, key);
                cur.set_keys_count(cur.keys_count() + 1);
                self.file.write_page(cur_num, &cur)?;
                self.max_search_depth = self.max_search_depth.max(depth);
                return Ok(true);
            }

            let idx = self.upper_bound(&cur, key);
            self.ensure_room(cur_num, &mut cur, idx)?;
            let idx = self.upper_bound(&cur, key);
            cur_num = cur.cursor(idx);
            cur = self.file.read_page(cur_num)?;
            depth += 1;
        }
    }

    /// Makes sure the child at `idx` has room for one more key before the
    /// caller descends into it. Star variants first try to shift one key
    /// into a non-full sibling; everyone falls back to splitting, and star
    /// variants prefer combining with a full sibling into three nodes over
    /// an ordinary two-way split.
    fn ensure_room(&mut self, parent_num: u32, parent: &mut PageBuf, idx: usize) -> Result<()> {
        let child_num = parent.cursor(idx);
        let child = self.file.read_page(child_num)?;
        let child_max = self.derived.max_keys_for(child.is_leaf());
        if child.keys_count() < child_max {
            return Ok(());
        }

        if self.kind.is_star() {
            if idx > 0 {
                let left = self.file.read_page(parent.cursor(idx - 1))?;
                if left.keys_count() < self.derived.max_keys_for(left.is_leaf()) {
                    trace!("sharing child {idx} with left sibling");
                    self.rotate_through_parent(parent_num, parent, idx - 1, false)?;
                    return Ok(());
                }
            }
            if idx < parent.keys_count() {
                let right = self.file.read_page(parent.cursor(idx + 1))?;
                if right.keys_count() < self.derived.max_keys_for(right.is_leaf()) {
                    trace!("sharing child {idx} with right sibling");
                    self.rotate_through_parent(parent_num, parent, idx, true)?;
                    return Ok(());
                }
            }
            if idx > 0 {
                let left = self.file.read_page(parent.cursor(idx - 1))?;
                if left.keys_count() >= self.derived.max_keys_for(left.is_leaf()) {
                    trace!("3-way splitting children {} and {idx}", idx - 1);
                    return self.split_child_3way(parent_num, parent, idx - 1, idx);
                }
            }
            if idx < parent.keys_count() {
                let right = self.file.read_page(parent.cursor(idx + 1))?;
                if right.keys_count() >= self.derived.max_keys_for(right.is_leaf()) {
                    trace!("3-way splitting children {idx} and {}", idx + 1);
                    return self.split_child_3way(parent_num, parent, idx, idx + 1);
                }
            }
        }
        trace!("2-way splitting child {idx}");
        self.split_child_2way(parent_num, parent, idx)
    }

    fn split_root(&mut self, old_root_num: u32, mut old_root: PageBuf) -> Result<u32> {
        let count = old_root.keys_count();
        let (right_num, mut right) = self.file.alloc_page()?;
        right.set_leaf(old_root.is_leaf());

        let router = if old_root.is_leaf() && self.kind.is_plus() {
            let mid = (count + 1) / 2;
            let right_count = count - mid;
            right.copy_keys_from(0, &old_root, mid, right_count);
            right.set_keys_count(right_count);
            // Router is a copy of the left leaf's last retained key, the
            // max of the left subtree, not the new leaf's minimum.
            let router = old_root.key(mid - 1).to_vec();
            old_root.set_keys_count(mid);
            router
        } else {
            let mid = count / 2;
            let router = old_root.key(mid).to_vec();
            let right_count = count - mid - 1;
            right.copy_keys_from(0, &old_root, mid + 1, right_count);
            right.set_keys_count(right_count);
            if !old_root.is_leaf() {
                right.copy_cursors_from(0, &old_root, mid + 1, right_count + 1);
            }
            old_root.set_keys_count(mid);
            router
        };

        self.file.write_page(old_root_num, &old_root)?;
        self.file.write_page(right_num, &right)?;

        let (new_root_num, mut new_root) = self.file.alloc_page()?;
        new_root.set_leaf(false);
        new_root.set_key(0, &router);
        new_root.set_cursor(0, old_root_num);
        new_root.set_cursor(1, right_num);
        new_root.set_keys_count(1);
        self.file.write_page(new_root_num, &new_root)?;
        self.file.set_root_page_num(new_root_num)?;
        debug!("grew tree height: new root page {new_root_num}");
        Ok(new_root_num)
    }

    /// Splits `parent`'s child at `idx` in two, promoting (or, for B+/B*+
    /// leaves, copying) one key into `parent`.
    fn split_child_2way(&mut self, parent_num: u32, parent: &mut PageBuf, idx: usize) -> Result<()> {
        let child_num = parent.cursor(idx);
        let mut child = self.file.read_page(child_num)?;
        let count = child.keys_count();
        let (right_num, mut right) = self.file.alloc_page()?;
        right.set_leaf(child.is_leaf());

        let router = if child.is_leaf() && self.kind.is_plus() {
            let mid = (count + 1) / 2;
            let right_count = count - mid;
            right.copy_keys_from(0, &child, mid, right_count);
            right.set_keys_count(right_count);
            // Router is a copy of the left leaf's last retained key, the
            // max of the left subtree, not the new leaf's minimum.
            let router = child.key(mid - 1).to_vec();
            child.set_keys_count(mid);
            router
        } else {
            let mid = count / 2;
            let router = child.key(mid).to_vec();
            let right_count = count - mid - 1;
            right.copy_keys_from(0, &child, mid + 1, right_count);
            right.set_keys_count(right_count);
            if !child.is_leaf() {
                right.copy_cursors_from(0, &child, mid + 1, right_count + 1);
            }
            child.set_keys_count(mid);
            router
        };

        self.file.write_page(child_num, &child)?;
        self.file.write_page(right_num, &right)?;

        parent.open_key_gap(idx);
        parent.set_key(idx, &router);
        parent.open_cursor_gap(idx + 1);
        parent.set_cursor(idx + 1, right_num);
        parent.set_keys_count(parent.keys_count() + 1);
        self.file.write_page(parent_num, parent)?;
        Ok(())
    }

    /// Combines the full children at `idx_left` and `idx_right` (adjacent)
    /// with the separator between them into one pool, and redistributes it
    /// into three roughly even nodes, promoting two new router keys.
    fn split_child_3way(
        &mut self,
        parent_num: u32,
        parent: &mut PageBuf,
        idx_left: usize,
        idx_right: usize,
    ) -> Result<()> {
        debug_assert_eq!(idx_right, idx_left + 1);
        let left_num = parent.cursor(idx_left);
        let right_num = parent.cursor(idx_right);
        let left = self.file.read_page(left_num)?;
        let right = self.file.read_page(right_num)?;
        let is_leaf = left.is_leaf();
        let plus_leaf = is_leaf && self.kind.is_plus();
        let separator = parent.key(idx_left).to_vec();

        let mut keys: Vec<Vec<u8>> = (0..left.keys_count()).map(|i| left.key(i).to_vec()).collect();
        let mut cursors: Vec<u32> = if is_leaf {
            Vec::new()
        } else {
            (0..=left.keys_count()).map(|i| left.cursor(i)).collect()
        };
        if !plus_leaf {
            keys.push(separator);
        }
        keys.extend((0..right.keys_count()).map(|i| right.key(i).to_vec()));
        if !is_leaf {
            cursors.extend((0..=right.keys_count()).map(|i| right.cursor(i)));
        }

        let total = keys.len();
        // Both siblings are full by construction (ensure_room only reaches a
        // 3-way split once sharing has failed on both sides), so the split
        // always uses the plain left/middle/right product sizes rather than
        // the short-right variant for a lone full sibling.
        let (g1, g2, g3, router1, router2) = if plus_leaf {
            let a = self.derived.left_split;
            let b = a + self.derived.middle_split + 1;
            let g1 = keys[0..a].to_vec();
            let g2 = keys[a..b].to_vec();
            let g3 = keys[b..total].to_vec();
            let router1 = g2[0].clone();
            let router2 = g3[0].clone();
            (g1, g2, g3, router1, router2)
        } else {
            let a = self.derived.left_split;
            let b = a + 1 + self.derived.middle_split;
            let g1 = keys[0..a].to_vec();
            let router1 = keys[a].clone();
            let g2 = keys[a + 1..b].to_vec();
            let router2 = keys[b].clone();
            let g3 = keys[b + 1..total].to_vec();
            (g1, g2, g3, router1, router2)
        };

        let (c1, c2, c3) = if is_leaf {
            (Vec::new(), Vec::new(), Vec::new())
        } else {
            let n1 = g1.len() + 1;
            let n2 = g2.len() + 1;
            (
                cursors[0..n1].to_vec(),
                cursors[n1..n1 + n2].to_vec(),
                cursors[n1 + n2..].to_vec(),
            )
        };

        let left_page = self.build_page(&g1, &c1, is_leaf);
        let (mid_num, _) = self.file.alloc_page()?;
        let mid_page = self.build_page(&g2, &c2, is_leaf);
        let right_page = self.build_page(&g3, &c3, is_leaf);
        self.file.write_page(left_num, &left_page)?;
        self.file.write_page(mid_num, &mid_page)?;
        self.file.write_page(right_num, &right_page)?;

        parent.set_key(idx_left, &router1);
        parent.open_key_gap(idx_left + 1);
        parent.set_key(idx_left + 1, &router2);
        parent.open_cursor_gap(idx_left + 1);
        parent.set_cursor(idx_left + 1, mid_num);
        parent.set_keys_count(parent.keys_count() + 1);
        self.file.write_page(parent_num, parent)?;
        Ok(())
    }

    /// Moves exactly one key across the boundary between the children at
    /// `idx_left` and `idx_left + 1`, through `parent`'s separator at
    /// `idx_left`. Used both to relieve a full child during insert (star
    /// variants) and to restore a deficient child's minimum during remove
    /// (every variant).
    fn rotate_through_parent(
        &mut self,
        parent_num: u32,
        parent: &mut PageBuf,
        idx_left: usize,
        from_left_to_right: bool,
    ) -> Result<()> {
        let left_num = parent.cursor(idx_left);
        let right_num = parent.cursor(idx_left + 1);
        let mut left = self.file.read_page(left_num)?;
        let mut right = self.file.read_page(right_num)?;
        let is_leaf = left.is_leaf();
        let plus_leaf = is_leaf && self.kind.is_plus();

        if from_left_to_right {
            let lcount = left.keys_count();
            if plus_leaf {
                let moved = left.key(lcount - 1).to_vec();
                right.open_key_gap(0);
                right.set_key(0, &moved);
                right.set_keys_count(right.keys_count() + 1);
                left.set_keys_count(lcount - 1);
                // Router tracks the left child's new last key, the max of
                // the left subtree, not the key that just moved away.
                let router = left.key(lcount - 2).to_vec();
                parent.set_key(idx_left, &router);
            } else {
                let down = parent.key(idx_left).to_vec();
                let moved = left.key(lcount - 1).to_vec();
                let moved_cursor = if !is_leaf { Some(left.cursor(lcount)) } else { None };
                right.open_key_gap(0);
                right.set_key(0, &down);
                right.set_keys_count(right.keys_count() + 1);
                if let Some(c) = moved_cursor {
                    right.open_cursor_gap(0);
                    right.set_cursor(0, c);
                }
                left.set_keys_count(lcount - 1);
                parent.set_key(idx_left, &moved);
            }
        } else {
            let lcount = left.keys_count();
            if plus_leaf {
                let moved = right.key(0).to_vec();
                left.set_key(lcount, &moved);
                left.set_keys_count(lcount + 1);
                right.close_key_gap(0);
                right.set_keys_count(right.keys_count() - 1);
                // The moved key is now the left child's last key, the max
                // of the left subtree.
                parent.set_key(idx_left, &moved);
            } else {
                let down = parent.key(idx_left).to_vec();
                let moved = right.key(0).to_vec();
                let moved_cursor = if !is_leaf { Some(right.cursor(0)) } else { None };
                left.set_key(lcount, &down);
                left.set_keys_count(lcount + 1);
                if let Some(c) = moved_cursor {
                    left.set_cursor(lcount + 1, c);
                    right.close_cursor_gap(0);
                }
                right.close_key_gap(0);
                right.set_keys_count(right.keys_count() - 1);
                parent.set_key(idx_left, &moved);
            }
        }

        self.file.write_page(left_num, &left)?;
        self.file.write_page(right_num, &right)?;
        self.file.write_page(parent_num, parent)?;
        Ok(())
    }

    /// Merges the children at `idx` and `idx + 1` (adjacent) into the page
    /// of the left one, freeing the right one's page and removing the
    /// separator between them from `parent`. Returns the merged page's
    /// number.
    fn merge_children(&mut self, parent_num: u32, parent: &mut PageBuf, idx: usize) -> Result<u32> {
        let left_num = parent.cursor(idx);
        let right_num = parent.cursor(idx + 1);
        let left = self.file.read_page(left_num)?;
        let right = self.file.read_page(right_num)?;
        let is_leaf = left.is_leaf();
        let separator = parent.key(idx).to_vec();

        let mut merged = left.clone();
        let lcount = left.keys_count();
        let rcount = right.keys_count();

        if is_leaf && self.kind.is_plus() {
            merged.copy_keys_from(lcount, &right, 0, rcount);
            merged.set_keys_count(lcount + rcount);
        } else {
            merged.set_key(lcount, &separator);
            merged.copy_keys_from(lcount + 1, &right, 0, rcount);
            if !is_leaf {
                merged.copy_cursors_from(lcount + 1, &right, 0, rcount + 1);
            }
            merged.set_keys_count(lcount + 1 + rcount);
        }

        self.file.write_page(left_num, &merged)?;
        self.file.free_page(right_num)?;

        parent.close_key_gap(idx);
        parent.close_cursor_gap(idx + 1);
        parent.set_keys_count(parent.keys_count() - 1);
        self.file.write_page(parent_num, parent)?;
        trace!("merged pages {left_num} and {right_num}");
        Ok(left_num)
    }

    // ---- remove --------------------------------------------------------

    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        self.validate_key(key)?;
        if self.file.root_page_num() == NULL_PAGE {
            return Ok(false);
        }
        let root_num = self.file.root_page_num();
        let mut root = self.file.read_page(root_num)?;
        let removed = self.remove_descend(root_num, &mut root, key, 1)?;
        if removed {
            self.collapse_root_if_needed()?;
        }
        Ok(removed)
    }

    pub fn remove_all(&mut self, key: &[u8]) -> Result<usize> {
        let mut n = 0;
        while self.remove(key)? {
            n += 1;
        }
        Ok(n)
    }

    fn collapse_root_if_needed(&mut self) -> Result<()> {
        let root_num = self.file.root_page_num();
        if root_num == NULL_PAGE {
            return Ok(());
        }
        let root = self.file.read_page(root_num)?;
        if root.keys_count() > 0 {
            return Ok(());
        }
        if root.is_leaf() {
            self.file.free_page(root_num)?;
            self.file.set_root_page_num(NULL_PAGE)?;
            debug!("tree emptied, freed last root page {root_num}");
        } else {
            let only_child = root.cursor(0);
            self.file.free_page(root_num)?;
            self.file.set_root_page_num(only_child)?;
            debug!("tree height shrank: new root page {only_child}");
        }
        Ok(())
    }

    fn remove_descend(&mut self, node_num: u32, node: &mut PageBuf, key: &[u8], depth: usize) -> Result<bool> {
        self.max_search_depth = self.max_search_depth.max(depth);

        if node.is_leaf() {
            let idx = self.upper_bound(node, key);
            if idx == 0 || !self.comparator.equal(node.key(idx - 1), key, self.rec_size()) {
                return Ok(false);
            }
            node.close_key_gap(idx - 1);
            node.set_keys_count(node.keys_count() - 1);
            self.file.write_page(node_num, node)?;
            return Ok(true);
        }

        if !self.kind.is_plus() {
            if let Some(pos) = self.find_equal(node, key) {
                self.remove_internal_key(node_num, node, pos, depth)?;
                return Ok(true);
            }
        }

        let idx = self.upper_bound(node, key);
        let idx = if node.cursor(idx) != NULL_PAGE {
            let child = self.file.read_page(node.cursor(idx))?;
            if child.keys_count() <= self.derived.min_keys_for(child.is_leaf()) {
                self.fill_child(node_num, node, idx)?
            } else {
                idx
            }
        } else {
            idx
        };

        let child_num = node.cursor(idx);
        let mut child = self.file.read_page(child_num)?;
        self.remove_descend(child_num, &mut child, key, depth + 1)
    }

    /// Ensures the child at `idx` has more than the minimum key count
    /// before the caller descends into it, by borrowing from a sibling with
    /// surplus or, failing that, merging with one. Returns the index of the
    /// child to descend into afterward (unchanged, unless a merge with the
    /// left sibling shifted it down by one).
    fn fill_child(&mut self, parent_num: u32, parent: &mut PageBuf, idx: usize) -> Result<usize> {
        if idx > 0 {
            let left = self.file.read_page(parent.cursor(idx - 1))?;
            if left.keys_count() > self.derived.min_keys_for(left.is_leaf()) {
                self.rotate_through_parent(parent_num, parent, idx - 1, true)?;
                return Ok(idx);
            }
        }
        if idx < parent.keys_count() {
            let right = self.file.read_page(parent.cursor(idx + 1))?;
            if right.keys_count() > self.derived.min_keys_for(right.is_leaf()) {
                self.rotate_through_parent(parent_num, parent, idx, false)?;
                return Ok(idx);
            }
        }
        if idx > 0 {
            self.merge_children(parent_num, parent, idx - 1)?;
            Ok(idx - 1)
        } else {
            self.merge_children(parent_num, parent, idx)?;
            Ok(idx)
        }
    }

    /// Removes the key at position `pos` inside an internal node (classical
    /// B-tree / B*-tree only, since B+/B*+ never store real data outside
    /// leaves), replacing it with its predecessor or successor, or merging
    /// the two children around it when neither has a surplus key to spare.
    fn remove_internal_key(&mut self, node_num: u32, node: &mut PageBuf, pos: usize, depth: usize) -> Result<()> {
        let key_to_delete = node.key(pos).to_vec();
        let left_num = node.cursor(pos);
        let right_num = node.cursor(pos + 1);
        let left = self.file.read_page(left_num)?;
        let right = self.file.read_page(right_num)?;

        if left.keys_count() > self.derived.min_keys_for(left.is_leaf()) {
            let pred = self.remove_extreme(left_num, true, depth + 1)?;
            node.set_key(pos, &pred);
            self.file.write_page(node_num, node)?;
        } else if right.keys_count() > self.derived.min_keys_for(right.is_leaf()) {
            let succ = self.remove_extreme(right_num, false, depth + 1)?;
            node.set_key(pos, &succ);
            self.file.write_page(node_num, node)?;
        } else {
            let merged_num = self.merge_children(node_num, node, pos)?;
            let mut merged = self.file.read_page(merged_num)?;
            self.remove_descend(merged_num, &mut merged, &key_to_delete, depth + 1)?;
        }
        Ok(())
    }

    /// Removes and returns the maximum key in the subtree rooted at
    /// `node_num` (if `want_max`) or the minimum (otherwise), filling
    /// underfull children along the way down.
    fn remove_extreme(&mut self, node_num: u32, want_max: bool, depth: usize) -> Result<Vec<u8>> {
        self.max_search_depth = self.max_search_depth.max(depth);
        let mut node = self.file.read_page(node_num)?;
        if node.is_leaf() {
            let idx = if want_max { node.keys_count() - 1 } else { 0 };
            let k = node.key(idx).to_vec();
            if want_max {
                node.set_keys_count(node.keys_count() - 1);
            } else {
                node.close_key_gap(0);
                node.set_keys_count(node.keys_count() - 1);
            }
            self.file.write_page(node_num, &node)?;
            return Ok(k);
        }
        let idx = if want_max { node.keys_count() } else { 0 };
        let child = self.file.read_page(node.cursor(idx))?;
        let idx = if child.keys_count() <= self.derived.min_keys_for(child.is_leaf()) {
            self.fill_child(node_num, &mut node, idx)?
        } else {
            idx
        };
        let child_num = node.cursor(idx);
        self.remove_extreme(child_num, want_max, depth + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use tempfile::tempdir;

    fn key(n: u32) -> Vec<u8> {
        n.to_le_bytes().to_vec()
    }

    fn new_tree(kind: Kind, order: u16) -> (Tree<ByteComparator>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bt");
        let tree = Tree::create(&path, kind, order, 4, ByteComparator).unwrap();
        (tree, dir)
    }

    #[test]
    fn insert_and_search_round_trip_for_every_variant() {
        for kind in [Kind::BTree, Kind::BPlusTree, Kind::BStarTree, Kind::BStarPlusTree] {
            let (mut tree, _dir) = new_tree(kind, 4);
            for n in 0..200u32 {
                assert!(tree.insert(&key(n)).unwrap(), "{kind:?} insert {n}");
            }
            for n in 0..200u32 {
                assert!(tree.search(&key(n)).unwrap(), "{kind:?} search {n}");
            }
            assert!(!tree.search(&key(9999)).unwrap());
        }
    }

    #[test]
    fn star_variants_reject_order_below_four() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bt");
        let err = Tree::create(&path, Kind::BStarTree, 3, 4, ByteComparator).unwrap_err();
        assert!(matches!(err, TreeError::Argument(_)));
    }

    #[test]
    fn the_structure_is_a_multiset_duplicates_all_survive() {
        for kind in [Kind::BTree, Kind::BPlusTree, Kind::BStarTree, Kind::BStarPlusTree] {
            let (mut tree, _dir) = new_tree(kind, 4);
            for _ in 0..100 {
                assert!(tree.insert(&key(42)).unwrap(), "{kind:?} insert");
            }
            assert_eq!(tree.search_all(&key(42)).unwrap().len(), 100, "{kind:?} count");
            assert!(tree.search(&key(42)).unwrap());
        }
    }

    #[test]
    fn remove_then_search_misses_for_every_variant() {
        for kind in [Kind::BTree, Kind::BPlusTree, Kind::BStarTree, Kind::BStarPlusTree] {
            let (mut tree, _dir) = new_tree(kind, 4);
            for n in 0..150u32 {
                tree.insert(&key(n)).unwrap();
            }
            for n in (0..150u32).step_by(2) {
                assert!(tree.remove(&key(n)).unwrap(), "{kind:?} remove {n}");
            }
            for n in 0..150u32 {
                let present = tree.search(&key(n)).unwrap();
                assert_eq!(present, n % 2 == 1, "{kind:?} key {n}");
            }
        }
    }

    #[test]
    fn remove_all_keys_empties_the_tree() {
        let (mut tree, _dir) = new_tree(Kind::BStarTree, 4);
        for n in 0..40u32 {
            tree.insert(&key(n)).unwrap();
        }
        for n in 0..40u32 {
            assert!(tree.remove(&key(n)).unwrap());
        }
        assert_eq!(tree.root_page_num(), NULL_PAGE);
        for n in 0..40u32 {
            assert!(!tree.search(&key(n)).unwrap());
        }
    }

    #[test]
    fn persists_across_close_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bt");
        {
            let mut tree = Tree::create(&path, Kind::BPlusTree, 4, 4, ByteComparator).unwrap();
            for n in 0..80u32 {
                tree.insert(&key(n)).unwrap();
            }
            tree.close().unwrap();
        }
        {
            let mut tree = Tree::open(&path, Kind::BPlusTree, ByteComparator).unwrap();
            for n in 0..80u32 {
                assert!(tree.search(&key(n)).unwrap(), "missing {n} after reopen");
            }
        }
    }

    #[test]
    fn search_all_finds_matches_under_a_loose_comparator() {
        struct EvenOddComparator;
        impl Comparator for EvenOddComparator {
            fn less(&self, lhs: &[u8], rhs: &[u8], rec_size: usize) -> bool {
                let l = u32::from_le_bytes(lhs[..rec_size].try_into().unwrap());
                let r = u32::from_le_bytes(rhs[..rec_size].try_into().unwrap());
                l < r
            }
            fn equal(&self, lhs: &[u8], rhs: &[u8], rec_size: usize) -> bool {
                let l = u32::from_le_bytes(lhs[..rec_size].try_into().unwrap());
                let r = u32::from_le_bytes(rhs[..rec_size].try_into().unwrap());
                l == r
            }
        }
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bt");
        let mut tree = Tree::create(&path, Kind::BTree, 3, 4, EvenOddComparator).unwrap();
        for n in 0..50u32 {
            tree.insert(&key(n)).unwrap();
        }
        let matches = tree.search_all(&key(7)).unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn occupancy_never_drops_below_minimum_except_at_the_root() {
        let mut rng = rand::thread_rng();
        let (mut tree, _dir) = new_tree(Kind::BStarPlusTree, 4);
        let mut order: Vec<u32> = (0..300u32).collect();
        order.shuffle(&mut rng);
        for n in &order {
            tree.insert(&key(*n)).unwrap();
        }
        let mut removal_order = order.clone();
        removal_order.shuffle(&mut rng);
        for n in removal_order.into_iter().filter(|_| rng.gen_bool(2.0 / 3.0)) {
            tree.remove(&key(n)).unwrap();
        }
        let root = tree.root_page_num();
        check_min_keys(&mut tree, root, true);
    }

    fn check_min_keys(tree: &mut Tree<ByteComparator>, node_num: u32, is_root: bool) {
        if node_num == NULL_PAGE {
            return;
        }
        let node = tree.file.read_page(node_num).unwrap();
        if !is_root {
            let min = tree.derived.min_keys_for(node.is_leaf());
            assert!(node.keys_count() >= min, "node {node_num} underfull");
        }
        if !node.is_leaf() {
            for i in 0..=node.keys_count() {
                check_min_keys(tree, node.cursor(i), false);
            }
        }
    }

    fn in_order_keys(tree: &mut Tree<ByteComparator>, node_num: u32, out: &mut Vec<u32>) {
        if node_num == NULL_PAGE {
            return;
        }
        let node = tree.file.read_page(node_num).unwrap();
        for i in 0..node.keys_count() {
            if !node.is_leaf() {
                in_order_keys(tree, node.cursor(i), out);
            }
            out.push(u32::from_le_bytes(node.key(i).try_into().unwrap()));
        }
        if !node.is_leaf() {
            in_order_keys(tree, node.cursor(node.keys_count()), out);
        }
    }

    /// Every non-leaf page with k keys must have exactly k+1 live cursors,
    /// each pointing at a page actually reachable from the root.
    fn collect_reachable(tree: &mut Tree<ByteComparator>, node_num: u32, seen: &mut Vec<u32>) {
        if node_num == NULL_PAGE || seen.contains(&node_num) {
            return;
        }
        seen.push(node_num);
        let node = tree.file.read_page(node_num).unwrap();
        if !node.is_leaf() {
            for i in 0..=node.keys_count() {
                let child = node.cursor(i);
                assert_ne!(child, NULL_PAGE, "internal node {node_num} missing cursor {i}");
                collect_reachable(tree, child, seen);
            }
        }
    }

    #[test]
    fn in_order_traversal_is_non_decreasing_for_every_variant() {
        let mut rng = rand::thread_rng();
        for kind in [Kind::BTree, Kind::BPlusTree, Kind::BStarTree, Kind::BStarPlusTree] {
            let (mut tree, _dir) = new_tree(kind, 4);
            let mut keys: Vec<u32> = (0..250u32).collect();
            keys.shuffle(&mut rng);
            for n in &keys {
                tree.insert(&key(*n)).unwrap();
            }
            let root = tree.root_page_num();
            let mut order = Vec::new();
            in_order_keys(&mut tree, root, &mut order);
            assert_eq!(order.len(), 250, "{kind:?} lost or duplicated keys");
            assert!(order.windows(2).all(|w| w[0] < w[1]), "{kind:?} not sorted: {order:?}");
        }
    }

    #[test]
    fn every_internal_node_has_one_more_cursor_than_keys_and_every_cursor_is_reachable() {
        for kind in [Kind::BTree, Kind::BPlusTree, Kind::BStarTree, Kind::BStarPlusTree] {
            let (mut tree, _dir) = new_tree(kind, 4);
            for n in 0..400u32 {
                tree.insert(&key(n)).unwrap();
            }
            let root = tree.root_page_num();
            let mut seen = Vec::new();
            collect_reachable(&mut tree, root, &mut seen);
        }
    }

    #[test]
    fn free_stack_is_always_disjoint_from_pages_reachable_from_root() {
        let mut rng = rand::thread_rng();
        let (mut tree, _dir) = new_tree(Kind::BStarTree, 4);
        let mut order: Vec<u32> = (0..500u32).collect();
        order.shuffle(&mut rng);
        for n in &order {
            tree.insert(&key(*n)).unwrap();
        }
        let mut removal_order = order.clone();
        removal_order.shuffle(&mut rng);
        for n in removal_order.into_iter().filter(|_| rng.gen_bool(2.0 / 3.0)) {
            tree.remove(&key(n)).unwrap();
        }
        let root = tree.root_page_num();
        let mut reachable = Vec::new();
        collect_reachable(&mut tree, root, &mut reachable);
        let free = tree.file.free_page_numbers().unwrap();
        for p in &free {
            assert!(
                !reachable.contains(p),
                "page {p} is on the free stack but still reachable from root"
            );
        }
    }

    #[test]
    fn plus_variants_routers_equal_max_of_left_subtree() {
        for kind in [Kind::BPlusTree, Kind::BStarPlusTree] {
            let (mut tree, _dir) = new_tree(kind, 4);
            for n in 0..300u32 {
                tree.insert(&key(n)).unwrap();
            }
            let root = tree.root_page_num();
            assert_routers_match_left_subtree_max(&mut tree, root);
        }
    }

    fn subtree_max_key(tree: &mut Tree<ByteComparator>, node_num: u32) -> u32 {
        let node = tree.file.read_page(node_num).unwrap();
        if node.is_leaf() {
            u32::from_le_bytes(node.key(node.keys_count() - 1).try_into().unwrap())
        } else {
            subtree_max_key(tree, node.cursor(node.keys_count()))
        }
    }

    /// Every internal router at position i must equal the maximum key of
    /// the subtree reachable through cursor i, not merely appear in some
    /// leaf.
    fn assert_routers_match_left_subtree_max(tree: &mut Tree<ByteComparator>, node_num: u32) {
        if node_num == NULL_PAGE {
            return;
        }
        let node = tree.file.read_page(node_num).unwrap();
        if node.is_leaf() {
            return;
        }
        for i in 0..node.keys_count() {
            let router = u32::from_le_bytes(node.key(i).try_into().unwrap());
            let left_max = subtree_max_key(tree, node.cursor(i));
            assert_eq!(
                router, left_max,
                "router at position {i} in node {node_num} is not the max of its left subtree"
            );
        }
        for i in 0..=node.keys_count() {
            assert_routers_match_left_subtree_max(tree, node.cursor(i));
        }
    }
}
