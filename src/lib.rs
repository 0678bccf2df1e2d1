pub use tree_store::{
    AccessGuard, Btree, BtreeRangeIter, BtreeStats, EntryGuard, MemoryBackend, Node, PageNumber,
    PageStore, MAX_KEY_SIZE, MAX_VALUE_SIZE, PAGE_SIZE,
};

mod tree_store;
