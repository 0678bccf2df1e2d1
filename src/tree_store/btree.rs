use crate::tree_store::btree_base::{AccessGuard, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use crate::tree_store::btree_iters::BtreeRangeIter;
use crate::tree_store::btree_mutator::MutateHelper;
use crate::tree_store::page_store::{PageNumber, PageStore, PAGE_SIZE};
use crate::tree_store::{BRANCH, HEADER, LEAF};
#[cfg(feature = "logging")]
use log::trace;
use std::cmp::max;

/// Page counts and height of a tree, gathered by a full walk.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BtreeStats {
    pub tree_height: usize,
    pub leaf_pages: usize,
    pub branch_pages: usize,
}

/// A copy-on-write B+-tree mapping byte keys to byte values, backed by a
/// [`PageStore`]. Mutations rewrite every node along the root-to-leaf path
/// into fresh pages and free the replaced ones; no page is ever modified in
/// place.
pub struct Btree<S: PageStore> {
    root: Option<PageNumber>,
    store: S,
}

impl<S: PageStore> Btree<S> {
    pub fn new(store: S) -> Self {
        // A single maximal key-value pair must fit in one page
        assert!(HEADER + 8 + 2 + 4 + MAX_KEY_SIZE + MAX_VALUE_SIZE <= PAGE_SIZE);
        Self { root: None, store }
    }

    /// Inserts the pair, replacing the value if the key is already present.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) {
        assert!(!key.is_empty(), "the empty key is reserved");
        assert!(key.len() <= MAX_KEY_SIZE);
        assert!(val.len() <= MAX_VALUE_SIZE);
        #[cfg(feature = "logging")]
        trace!(
            "Btree(root={:?}): inserting {} key bytes, {} value bytes",
            self.root,
            key.len(),
            val.len()
        );
        MutateHelper::new(&mut self.root, &mut self.store).insert(key, val);
    }

    /// Deletes the key, returning whether it was present. An absent key
    /// leaves the tree untouched.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        assert!(!key.is_empty(), "the empty key is reserved");
        assert!(key.len() <= MAX_KEY_SIZE);
        #[cfg(feature = "logging")]
        trace!("Btree(root={:?}): deleting {} key bytes", self.root, key.len());
        MutateHelper::new(&mut self.root, &mut self.store).delete(key)
    }

    /// Looks up the value stored under the key.
    pub fn get(&self, key: &[u8]) -> Option<AccessGuard> {
        if key.is_empty() {
            return None;
        }
        let mut page = self.store.get(self.root?);
        loop {
            let i = page.lookup_le(key);
            match page.btype() {
                LEAF => {
                    if page.get_key(i) == key {
                        let range = page.val_range(i);
                        return Some(AccessGuard::new(page, range));
                    }
                    return None;
                }
                BRANCH => {
                    page = self.store.get(page.get_ptr(i));
                }
                _ => unreachable!("unknown node tag"),
            }
        }
    }

    /// Ascending iterator over all entries.
    pub fn range(&self) -> BtreeRangeIter<'_, S> {
        BtreeRangeIter::new(self.root, &self.store)
    }

    /// Number of entries. Walks the whole tree.
    pub fn len(&self) -> usize {
        self.range().count()
    }

    pub fn is_empty(&self) -> bool {
        self.range().next().is_none()
    }

    pub fn stats(&self) -> BtreeStats {
        match self.root {
            Some(root) => self.stats_helper(root),
            None => BtreeStats {
                tree_height: 0,
                leaf_pages: 0,
                branch_pages: 0,
            },
        }
    }

    fn stats_helper(&self, ptr: PageNumber) -> BtreeStats {
        let page = self.store.get(ptr);
        match page.btype() {
            LEAF => BtreeStats {
                tree_height: 1,
                leaf_pages: 1,
                branch_pages: 0,
            },
            BRANCH => {
                let mut stats = BtreeStats {
                    tree_height: 0,
                    leaf_pages: 0,
                    branch_pages: 1,
                };
                for i in 0..page.nkeys() {
                    let child = self.stats_helper(page.get_ptr(i));
                    stats.tree_height = max(stats.tree_height, child.tree_height);
                    stats.leaf_pages += child.leaf_pages;
                    stats.branch_pages += child.branch_pages;
                }
                stats.tree_height += 1;
                stats
            }
            _ => unreachable!("unknown node tag"),
        }
    }

    #[allow(dead_code)]
    pub(crate) fn print_debug(&self) {
        match self.root {
            Some(root) => self.print_helper(root, 0),
            None => eprintln!("empty tree"),
        }
    }

    #[allow(dead_code)]
    fn print_helper(&self, ptr: PageNumber, depth: usize) {
        let page = self.store.get(ptr);
        let pad = "  ".repeat(depth);
        match page.btype() {
            LEAF => {
                eprint!("{pad}Leaf[ (page={ptr:?})");
                for i in 0..page.nkeys() {
                    eprint!(
                        " {:?}={:?}",
                        String::from_utf8_lossy(page.get_key(i)),
                        String::from_utf8_lossy(page.get_val(i))
                    );
                }
                eprintln!("]");
            }
            BRANCH => {
                eprint!("{pad}Branch[ (page={ptr:?})");
                for i in 0..page.nkeys() {
                    eprint!(
                        " key_{}={:?} child_{}={:?}",
                        i,
                        String::from_utf8_lossy(page.get_key(i)),
                        i,
                        page.get_ptr(i)
                    );
                }
                eprintln!("]");
                for i in 0..page.nkeys() {
                    self.print_helper(page.get_ptr(i), depth + 1);
                }
            }
            _ => unreachable!("unknown node tag"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree_store::MemoryBackend;
    use rand::prelude::SliceRandom;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    fn create_tree() -> Btree<MemoryBackend> {
        Btree::new(MemoryBackend::new())
    }

    fn self_root(tree: &Btree<MemoryBackend>) -> PageNumber {
        tree.root.unwrap()
    }

    impl Btree<MemoryBackend> {
        fn check_invariants(&self) {
            if let Some(root) = self.root {
                self.check_node(root);
            }
        }

        // Verifies every reachable node: it fits a page, holds at least one
        // entry with strictly ascending keys, and every branch separator
        // equals the first key of its child's subtree.
        fn check_node(&self, ptr: PageNumber) -> Vec<u8> {
            let page = self.store.get(ptr);
            assert!(page.nbytes() <= PAGE_SIZE);
            assert!(page.nkeys() >= 1);
            for i in 1..page.nkeys() {
                assert!(page.get_key(i - 1) < page.get_key(i));
            }
            match page.btype() {
                LEAF => page.get_key(0).to_vec(),
                BRANCH => {
                    for i in 0..page.nkeys() {
                        let child_min = self.check_node(page.get_ptr(i));
                        assert_eq!(page.get_key(i), child_min);
                    }
                    page.get_key(0).to_vec()
                }
                _ => unreachable!("unknown node tag"),
            }
        }
    }

    #[test]
    fn first_insert_seeds_the_sentinel() {
        let mut tree = create_tree();
        tree.insert(b"k", b"v");
        let root = self_root(&tree);
        let page = tree.store.get(root);
        assert_eq!(page.btype(), LEAF);
        assert_eq!(page.nkeys(), 2);
        assert_eq!(page.get_key(0), b"");
        assert_eq!(page.get_val(0), b"");
        assert_eq!(page.get_key(1), b"k");
        assert_eq!(page.get_val(1), b"v");
        tree.check_invariants();
    }

    #[test]
    fn empty_tree_delete_allocates_nothing() {
        let mut tree = create_tree();
        assert!(!tree.delete(b"k"));
        assert_eq!(tree.store.len(), 0);
    }

    #[test]
    fn cow_frees_the_replaced_path() {
        // One live page per level: the store never accumulates stale pages
        let mut tree = create_tree();
        tree.insert(b"a", b"1");
        assert_eq!(tree.store.len(), 1);
        tree.insert(b"b", b"2");
        assert_eq!(tree.store.len(), 1);
        assert!(tree.delete(b"a"));
        assert_eq!(tree.store.len(), 1);
    }

    #[test]
    fn delete_on_missing_key_keeps_the_root() {
        let mut tree = create_tree();
        tree.insert(b"a", b"1");
        let root = self_root(&tree);
        assert!(!tree.delete(b"b"));
        assert_eq!(self_root(&tree), root);
    }

    #[test]
    fn invariants_hold_under_random_churn() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut tree = create_tree();
        let mut reference: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        for _ in 0..2000 {
            let key = format!("key-{:03}", rng.gen_range(0..250)).into_bytes();
            if rng.gen_bool(0.7) {
                let val = vec![rng.gen::<u8>(); rng.gen_range(0..64)];
                tree.insert(&key, &val);
                reference.insert(key, val);
            } else {
                assert_eq!(tree.delete(&key), reference.remove(&key).is_some());
            }
            tree.check_invariants();
        }

        assert_eq!(tree.len(), reference.len());
        for (key, val) in &reference {
            assert_eq!(tree.get(key).unwrap().value(), val.as_slice());
        }
    }

    #[test]
    fn random_deletion_order_collapses_cleanly() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut tree = create_tree();
        let mut keys: Vec<Vec<u8>> = (0..500)
            .map(|i| format!("entry-{i:04}").into_bytes())
            .collect();
        for key in &keys {
            tree.insert(key, &[0xcc; 24]);
        }
        assert!(tree.stats().tree_height >= 2);

        keys.shuffle(&mut rng);
        for key in &keys {
            assert!(tree.delete(key));
            tree.check_invariants();
        }
        assert!(tree.is_empty());
        // Only the sentinel leaf remains
        assert_eq!(tree.stats().tree_height, 1);
        assert_eq!(tree.store.len(), 1);
    }
}
