use crate::tree_store::btree_base::Node;
use crate::tree_store::page_store::{PageNumber, PageStore};
use crate::tree_store::{BRANCH, LEAF};
use std::sync::Arc;

/// One entry yielded by [`BtreeRangeIter`]. Holds the containing page alive
/// for zero-copy access to the key and value bytes.
pub struct EntryGuard {
    page: Arc<Node>,
    entry: usize,
}

impl EntryGuard {
    pub fn key(&self) -> &[u8] {
        self.page.get_key(self.entry)
    }

    pub fn value(&self) -> &[u8] {
        self.page.get_val(self.entry)
    }
}

enum RangeIterState {
    Leaf {
        page: Arc<Node>,
        entry: usize,
        parent: Option<Box<RangeIterState>>,
    },
    Branch {
        page: Arc<Node>,
        // index of the next child to descend into
        child: usize,
        parent: Option<Box<RangeIterState>>,
    },
}

/// Ascending in-order iterator over every entry of a tree. The slot-0
/// sentinel of the leftmost leaf is not an entry and is skipped.
pub struct BtreeRangeIter<'a, S: PageStore> {
    state: Option<RangeIterState>,
    store: &'a S,
}

impl<'a, S: PageStore> BtreeRangeIter<'a, S> {
    pub(crate) fn new(root: Option<PageNumber>, store: &'a S) -> Self {
        let state = root.map(|ptr| Self::descend(store, ptr, None));
        Self { state, store }
    }

    // Walks down to the leftmost leaf under ptr, recording the return path.
    fn descend(
        store: &S,
        ptr: PageNumber,
        parent: Option<Box<RangeIterState>>,
    ) -> RangeIterState {
        let page = store.get(ptr);
        match page.btype() {
            LEAF => RangeIterState::Leaf {
                page,
                entry: 0,
                parent,
            },
            BRANCH => {
                let child = page.get_ptr(0);
                let parent = Some(Box::new(RangeIterState::Branch {
                    page,
                    child: 1,
                    parent,
                }));
                Self::descend(store, child, parent)
            }
            _ => unreachable!("unknown node tag"),
        }
    }
}

impl<S: PageStore> Iterator for BtreeRangeIter<'_, S> {
    type Item = EntryGuard;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state.take()? {
                RangeIterState::Leaf {
                    page,
                    entry,
                    parent,
                } => {
                    if entry < page.nkeys() {
                        let guard = EntryGuard {
                            page: page.clone(),
                            entry,
                        };
                        self.state = Some(RangeIterState::Leaf {
                            page,
                            entry: entry + 1,
                            parent,
                        });
                        if guard.key().is_empty() {
                            // the sentinel
                            continue;
                        }
                        return Some(guard);
                    }
                    self.state = parent.map(|state| *state);
                }
                RangeIterState::Branch {
                    page,
                    child,
                    parent,
                } => {
                    if child < page.nkeys() {
                        let ptr = page.get_ptr(child);
                        let parent = Some(Box::new(RangeIterState::Branch {
                            page,
                            child: child + 1,
                            parent,
                        }));
                        self.state = Some(Self::descend(self.store, ptr, parent));
                    } else {
                        self.state = parent.map(|state| *state);
                    }
                }
            }
        }
    }
}
