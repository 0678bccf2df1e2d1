use crate::tree_store::btree_base::{Node, BRANCH, HEADER, LEAF};
use crate::tree_store::page_store::{PageNumber, PageStore, PAGE_SIZE};
use std::sync::Arc;

enum MergeDirection {
    Left(Arc<Node>),
    Right(Arc<Node>),
    None,
}

pub(crate) struct MutateHelper<'a, S: PageStore> {
    root: &'a mut Option<PageNumber>,
    store: &'a mut S,
}

impl<'a, S: PageStore> MutateHelper<'a, S> {
    pub(crate) fn new(root: &'a mut Option<PageNumber>, store: &'a mut S) -> Self {
        Self { root, store }
    }

    pub(crate) fn insert(&mut self, key: &[u8], val: &[u8]) {
        let Some(root_ptr) = *self.root else {
            // First node. The empty key at slot 0 makes the tree cover the
            // whole key space, so a lookup always finds a containing child.
            let mut root = Node::new(PAGE_SIZE);
            root.set_header(LEAF, 2);
            root.append_kv(0, PageNumber::NULL, &[], &[]);
            root.append_kv(1, PageNumber::NULL, key, val);
            *self.root = Some(self.store.new(root));
            return;
        };

        let node = self.insert_helper(self.store.get(root_ptr), key, val);
        let parts = node.split3();
        self.store.del(root_ptr);
        if parts.len() > 1 {
            // The root was split, add a new level
            let mut new_root = Node::new(PAGE_SIZE);
            new_root.set_header(BRANCH, parts.len());
            for (i, part) in parts.into_iter().enumerate() {
                let first_key = part.get_key(0).to_vec();
                let ptr = self.store.new(part);
                new_root.append_kv(i, ptr, &first_key, &[]);
            }
            *self.root = Some(self.store.new(new_root));
        } else {
            let part = parts.into_iter().next().unwrap();
            *self.root = Some(self.store.new(part));
        }
    }

    pub(crate) fn delete(&mut self, key: &[u8]) -> bool {
        let Some(root_ptr) = *self.root else {
            return false;
        };
        let Some(updated) = self.delete_helper(self.store.get(root_ptr), key) else {
            return false;
        };

        self.store.del(root_ptr);
        if updated.btype() == BRANCH && updated.nkeys() == 1 {
            // Remove a level. The remaining child page is already
            // registered, so it becomes the root as-is.
            *self.root = Some(updated.get_ptr(0));
        } else {
            *self.root = Some(self.store.new(updated));
        }
        true
    }

    // Inserts the key into the subtree rooted at node, returning the
    // rewritten node. The result may exceed one page; the caller splits it
    // and registers the pieces, and frees the node it replaces.
    fn insert_helper(&mut self, node: Arc<Node>, key: &[u8], val: &[u8]) -> Node {
        let i = node.lookup_le(key);
        match node.btype() {
            LEAF => {
                if node.get_key(i) == key {
                    node.leaf_update(i, key, val)
                } else {
                    // node.get_key(i) < key, so insert after it. The new key
                    // never lands in slot 0; the sentinel stays put.
                    node.leaf_insert(i + 1, key, val)
                }
            }
            BRANCH => {
                let kid_ptr = node.get_ptr(i);
                let kid = self.insert_helper(self.store.get(kid_ptr), key, val);
                let parts = kid.split3();
                self.store.del(kid_ptr);
                self.replace_kid_n(&node, i, parts)
            }
            _ => unreachable!("unknown node tag"),
        }
    }

    // Rewrites a branch replacing the child at position i with the given
    // nodes. Each new child is registered with the store and its first key
    // becomes the separator.
    fn replace_kid_n(&mut self, node: &Node, i: usize, kids: Vec<Node>) -> Node {
        let inc = kids.len();
        let mut new = Node::new(2 * PAGE_SIZE);
        new.set_header(BRANCH, node.nkeys() + inc - 1);
        new.append_range(node, 0, 0, i);
        for (j, kid) in kids.into_iter().enumerate() {
            let first_key = kid.get_key(0).to_vec();
            let ptr = self.store.new(kid);
            new.append_kv(i + j, ptr, &first_key, &[]);
        }
        new.append_range(node, i + inc, i + 1, node.nkeys() - (i + 1));
        new
    }

    // Deletes the key from the subtree rooted at node. None means the key
    // was absent and nothing changed.
    fn delete_helper(&mut self, node: Arc<Node>, key: &[u8]) -> Option<Node> {
        let i = node.lookup_le(key);
        match node.btype() {
            LEAF => {
                if node.get_key(i) != key {
                    return None;
                }
                Some(node.leaf_delete(i))
            }
            BRANCH => self.node_delete(&node, i, key),
            _ => unreachable!("unknown node tag"),
        }
    }

    fn node_delete(&mut self, node: &Node, i: usize, key: &[u8]) -> Option<Node> {
        let kid_ptr = node.get_ptr(i);
        let updated = self.delete_helper(self.store.get(kid_ptr), key)?;
        self.store.del(kid_ptr);

        match self.should_merge(node, i, &updated) {
            MergeDirection::Left(sibling) => {
                let merged = Node::merge(&sibling, &updated);
                self.store.del(node.get_ptr(i - 1));
                let first_key = merged.get_key(0).to_vec();
                let ptr = self.store.new(merged);
                Some(node.replace_2_kid(i - 1, ptr, &first_key))
            }
            MergeDirection::Right(sibling) => {
                let merged = Node::merge(&updated, &sibling);
                self.store.del(node.get_ptr(i + 1));
                let first_key = merged.get_key(0).to_vec();
                let ptr = self.store.new(merged);
                Some(node.replace_2_kid(i, ptr, &first_key))
            }
            MergeDirection::None => {
                if updated.nkeys() == 0 {
                    // The child emptied out with no sibling to absorb it,
                    // which can only happen when it was the sole child. The
                    // parent becomes empty too and collapses higher up.
                    assert!(node.nkeys() == 1 && i == 0);
                    let mut new = Node::new(PAGE_SIZE);
                    new.set_header(BRANCH, 0);
                    Some(new)
                } else {
                    Some(self.replace_kid_n(node, i, vec![updated]))
                }
            }
        }
    }

    // A shrunken child merges with a sibling when it falls below a quarter
    // page and the combined node still fits in one page. The left sibling is
    // preferred.
    fn should_merge(&self, node: &Node, i: usize, updated: &Node) -> MergeDirection {
        if updated.nbytes() > PAGE_SIZE / 4 {
            return MergeDirection::None;
        }

        if i > 0 {
            let sibling = self.store.get(node.get_ptr(i - 1));
            let merged = sibling.nbytes() + updated.nbytes() - HEADER;
            if merged <= PAGE_SIZE {
                return MergeDirection::Left(sibling);
            }
        }
        if i + 1 < node.nkeys() {
            let sibling = self.store.get(node.get_ptr(i + 1));
            let merged = sibling.nbytes() + updated.nbytes() - HEADER;
            if merged <= PAGE_SIZE {
                return MergeDirection::Right(sibling);
            }
        }
        MergeDirection::None
    }
}
