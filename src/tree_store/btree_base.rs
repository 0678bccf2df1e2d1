use crate::tree_store::page_store::{PageNumber, PAGE_SIZE};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::ops::Range;
use std::sync::Arc;

pub(crate) const BRANCH: u16 = 1;
pub(crate) const LEAF: u16 = 2;

pub(crate) const HEADER: usize = 4;

/// Maximum length of a key, in bytes.
pub const MAX_KEY_SIZE: usize = 1000;
/// Maximum length of a value, in bytes.
pub const MAX_VALUE_SIZE: usize = 3000;

// A node holding a single maximal key-value pair must fit in one page
const _: () = assert!(HEADER + 8 + 2 + 4 + MAX_KEY_SIZE + MAX_VALUE_SIZE <= PAGE_SIZE);
// Offsets and record lengths are stored as u16
const _: () = assert!(2 * PAGE_SIZE <= u16::MAX as usize + 1);

// Every node is a single byte buffer, ready to be handed to the page store.
// Layout is:
// 2 bytes: node type (1 = branch, 2 = leaf)
// 2 bytes: number of keys
// repeating (nkeys times):
// * 8 bytes: child page number (zero in leaves)
// repeating (nkeys times):
// * 2 bytes: end offset of the nth record, relative to the start of the
//   record area. The end of record 0 is the first stored entry; its start
//   offset is implicitly zero.
// repeating (nkeys times):
// * 2 bytes: key length
// * 2 bytes: value length
// * n bytes: key data
// * n bytes: value data (empty in branches)
// trailing bytes up to the page size are unused.
//
// All integers are little-endian. During construction a buffer may be up to
// twice the page size; it must be split or trimmed before it is persisted.
pub struct Node {
    data: Vec<u8>,
}

impl Node {
    pub(crate) fn new(size: usize) -> Self {
        debug_assert!(size == PAGE_SIZE || size == 2 * PAGE_SIZE);
        Self {
            data: vec![0; size],
        }
    }

    pub(crate) fn btype(&self) -> u16 {
        u16::from_le_bytes(self.data[0..2].try_into().unwrap())
    }

    pub(crate) fn nkeys(&self) -> usize {
        u16::from_le_bytes(self.data[2..4].try_into().unwrap()) as usize
    }

    pub(crate) fn set_header(&mut self, btype: u16, nkeys: usize) {
        debug_assert!(btype == BRANCH || btype == LEAF);
        self.data[0..2].copy_from_slice(&btype.to_le_bytes());
        self.data[2..4].copy_from_slice(&u16::try_from(nkeys).unwrap().to_le_bytes());
    }

    pub(crate) fn get_ptr(&self, i: usize) -> PageNumber {
        assert!(i < self.nkeys());
        let pos = HEADER + 8 * i;
        PageNumber::from_le_bytes(self.data[pos..(pos + 8)].try_into().unwrap())
    }

    pub(crate) fn set_ptr(&mut self, i: usize, ptr: PageNumber) {
        assert!(i < self.nkeys());
        let pos = HEADER + 8 * i;
        self.data[pos..(pos + 8)].copy_from_slice(&ptr.to_le_bytes());
    }

    fn offset_pos(&self, i: usize) -> usize {
        assert!(1 <= i && i <= self.nkeys());
        HEADER + 8 * self.nkeys() + 2 * (i - 1)
    }

    pub(crate) fn get_offset(&self, i: usize) -> usize {
        if i == 0 {
            return 0;
        }
        let pos = self.offset_pos(i);
        u16::from_le_bytes(self.data[pos..(pos + 2)].try_into().unwrap()) as usize
    }

    fn set_offset(&mut self, i: usize, offset: usize) {
        let pos = self.offset_pos(i);
        self.data[pos..(pos + 2)].copy_from_slice(&u16::try_from(offset).unwrap().to_le_bytes());
    }

    // Position of the nth record relative to the whole node. kv_pos(nkeys)
    // is one past the last record, i.e. the node's total byte extent.
    pub(crate) fn kv_pos(&self, i: usize) -> usize {
        assert!(i <= self.nkeys());
        HEADER + 10 * self.nkeys() + self.get_offset(i)
    }

    pub(crate) fn get_key(&self, i: usize) -> &[u8] {
        assert!(i < self.nkeys());
        let pos = self.kv_pos(i);
        let klen = u16::from_le_bytes(self.data[pos..(pos + 2)].try_into().unwrap()) as usize;
        &self.data[(pos + 4)..(pos + 4 + klen)]
    }

    pub(crate) fn get_val(&self, i: usize) -> &[u8] {
        &self.data[self.val_range(i)]
    }

    pub(crate) fn val_range(&self, i: usize) -> Range<usize> {
        assert!(i < self.nkeys());
        let pos = self.kv_pos(i);
        let klen = u16::from_le_bytes(self.data[pos..(pos + 2)].try_into().unwrap()) as usize;
        let vlen = u16::from_le_bytes(self.data[(pos + 2)..(pos + 4)].try_into().unwrap()) as usize;
        (pos + 4 + klen)..(pos + 4 + klen + vlen)
    }

    /// Total byte extent of the node, including the header.
    pub fn nbytes(&self) -> usize {
        self.kv_pos(self.nkeys())
    }

    // Drops the scratch area beyond one page. Must only be called once the
    // node's contents fit a single page.
    pub(crate) fn trim(&mut self) {
        assert!(self.nbytes() <= PAGE_SIZE);
        self.data.truncate(PAGE_SIZE);
    }

    // Returns the greatest index whose key compares <= the query key. Slot 0
    // holds a copy of the subtree minimum, so it is always <= any in-range
    // query and the result is well-defined.
    pub(crate) fn lookup_le(&self, key: &[u8]) -> usize {
        let mut found = 0;
        let mut min_entry = 1; // inclusive
        let mut max_entry = self.nkeys(); // exclusive
        while min_entry < max_entry {
            let mid = (min_entry + max_entry) / 2;
            match self.get_key(mid).cmp(key) {
                Ordering::Less => {
                    found = mid;
                    min_entry = mid + 1;
                }
                Ordering::Equal => {
                    return mid;
                }
                Ordering::Greater => {
                    max_entry = mid;
                }
            }
        }
        found
    }

    // Writes the record at slot i. The header must already be set, and
    // records must be appended in index order so that the running offset in
    // the offset array stays valid.
    pub(crate) fn append_kv(&mut self, i: usize, ptr: PageNumber, key: &[u8], val: &[u8]) {
        self.set_ptr(i, ptr);
        let pos = self.kv_pos(i);
        self.data[pos..(pos + 2)]
            .copy_from_slice(&u16::try_from(key.len()).unwrap().to_le_bytes());
        self.data[(pos + 2)..(pos + 4)]
            .copy_from_slice(&u16::try_from(val.len()).unwrap().to_le_bytes());
        self.data[(pos + 4)..(pos + 4 + key.len())].copy_from_slice(key);
        self.data[(pos + 4 + key.len())..(pos + 4 + key.len() + val.len())].copy_from_slice(val);
        self.set_offset(i + 1, self.get_offset(i) + 4 + key.len() + val.len());
    }

    // Copies n consecutive entries from src, preserving their order.
    pub(crate) fn append_range(&mut self, src: &Node, dst_start: usize, src_start: usize, n: usize) {
        assert!(src_start + n <= src.nkeys());
        assert!(dst_start + n <= self.nkeys());
        if n == 0 {
            return;
        }

        for i in 0..n {
            self.set_ptr(dst_start + i, src.get_ptr(src_start + i));
        }

        let dst_begin = self.get_offset(dst_start);
        let src_begin = src.get_offset(src_start);
        for i in 1..=n {
            let offset = dst_begin + src.get_offset(src_start + i) - src_begin;
            self.set_offset(dst_start + i, offset);
        }

        let begin = src.kv_pos(src_start);
        let end = src.kv_pos(src_start + n);
        let dst_pos = self.kv_pos(dst_start);
        self.data[dst_pos..(dst_pos + end - begin)].copy_from_slice(&src.data[begin..end]);
    }

    pub(crate) fn leaf_insert(&self, i: usize, key: &[u8], val: &[u8]) -> Node {
        let mut new = Node::new(2 * PAGE_SIZE);
        new.set_header(LEAF, self.nkeys() + 1);
        new.append_range(self, 0, 0, i);
        new.append_kv(i, PageNumber::NULL, key, val);
        new.append_range(self, i + 1, i, self.nkeys() - i);
        new
    }

    pub(crate) fn leaf_update(&self, i: usize, key: &[u8], val: &[u8]) -> Node {
        let mut new = Node::new(2 * PAGE_SIZE);
        new.set_header(LEAF, self.nkeys());
        new.append_range(self, 0, 0, i);
        new.append_kv(i, PageNumber::NULL, key, val);
        new.append_range(self, i + 1, i + 1, self.nkeys() - i - 1);
        new
    }

    pub(crate) fn leaf_delete(&self, i: usize) -> Node {
        let mut new = Node::new(PAGE_SIZE);
        new.set_header(LEAF, self.nkeys() - 1);
        new.append_range(self, 0, 0, i);
        new.append_range(self, i, i + 1, self.nkeys() - i - 1);
        new
    }

    // Concatenates two nodes of the same type. The caller is responsible for
    // checking that the result fits in one page.
    pub(crate) fn merge(left: &Node, right: &Node) -> Node {
        debug_assert_eq!(left.btype(), right.btype());
        let mut new = Node::new(PAGE_SIZE);
        new.set_header(left.btype(), left.nkeys() + right.nkeys());
        new.append_range(left, 0, 0, left.nkeys());
        new.append_range(right, left.nkeys(), 0, right.nkeys());
        new
    }

    // Rewrites a branch replacing the two adjacent children at i and i+1
    // with the single merged child.
    pub(crate) fn replace_2_kid(&self, i: usize, ptr: PageNumber, key: &[u8]) -> Node {
        debug_assert_eq!(self.btype(), BRANCH);
        let mut new = Node::new(2 * PAGE_SIZE);
        new.set_header(BRANCH, self.nkeys() - 1);
        new.append_range(self, 0, 0, i);
        new.append_kv(i, ptr, key, &[]);
        new.append_range(self, i + 2, i + 2, self.nkeys() - i - 2);
        new
    }

    // Splits an over-large node in two such that the right half fits in one
    // page. The boundary starts at the balanced midpoint, moves left until
    // the left half fits, then right until the right half fits; the left
    // half may still exceed one page and is split again by split3.
    fn split2(&self) -> (Node, Node) {
        assert!(self.nkeys() >= 2);

        let left_bytes = |n: usize| HEADER + 10 * n + self.get_offset(n);
        let right_bytes = |n: usize| self.nbytes() - left_bytes(n) + HEADER;

        let mut nleft = self.nkeys() / 2;
        while left_bytes(nleft) > PAGE_SIZE {
            nleft -= 1;
        }
        assert!(nleft >= 1);
        while right_bytes(nleft) > PAGE_SIZE {
            nleft += 1;
        }
        assert!(nleft < self.nkeys());
        let nright = self.nkeys() - nleft;

        let mut left = Node::new(2 * PAGE_SIZE);
        let mut right = Node::new(PAGE_SIZE);
        left.set_header(self.btype(), nleft);
        right.set_header(self.btype(), nright);
        left.append_range(self, 0, 0, nleft);
        right.append_range(self, 0, nleft, nright);
        assert!(right.nbytes() <= PAGE_SIZE);
        (left, right)
    }

    // Splits a node that may be up to twice the page size into 1-3 nodes
    // that each fit in one page. Three nodes occur when a single huge record
    // dominates the left half.
    pub(crate) fn split3(mut self) -> Vec<Node> {
        if self.nbytes() <= PAGE_SIZE {
            self.trim();
            return vec![self];
        }
        let (mut left, right) = self.split2();
        if left.nbytes() <= PAGE_SIZE {
            left.trim();
            return vec![left, right];
        }
        let (mut leftleft, middle) = left.split2();
        leftleft.trim();
        vec![leftleft, middle, right]
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Node(type={}, nkeys={}, {} bytes)",
            self.btype(),
            self.nkeys(),
            self.nbytes()
        )
    }
}

/// A value guard returned by [`crate::Btree::get`]. Holds the containing
/// page alive for zero-copy access to the value bytes.
pub struct AccessGuard {
    page: Arc<Node>,
    range: Range<usize>,
}

impl AccessGuard {
    pub(crate) fn new(page: Arc<Node>, range: Range<usize>) -> Self {
        Self { page, range }
    }

    pub fn value(&self) -> &[u8] {
        &self.page.data[self.range.clone()]
    }
}
