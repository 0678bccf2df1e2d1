mod btree;
mod btree_base;
mod btree_iters;
mod btree_mutator;
mod page_store;

pub use btree::{Btree, BtreeStats};
pub use btree_base::{AccessGuard, Node, MAX_KEY_SIZE, MAX_VALUE_SIZE};
pub(crate) use btree_base::{BRANCH, HEADER, LEAF};
pub use btree_iters::{BtreeRangeIter, EntryGuard};
pub use page_store::{MemoryBackend, PageNumber, PageStore, PAGE_SIZE};
