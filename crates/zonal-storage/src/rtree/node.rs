//! Borrowed accessors over node blocks.
//!
//! [`NodeRef`] and [`NodeMut`] bind a block slice to a [`NodeLayout`] and
//! expose the header fields and the packed entry array. They own nothing;
//! handles live only for the duration of one tree operation and are
//! re-resolved from block addresses after any allocation.
//!
//! Entries are unordered within a block. Insertion appends; deletion
//! shifts the tail left, keeping live entries prefix-packed.

use super::layout::{BlockKind, NodeHeader, NodeLayout};
use zonal_common::{Mbr, Result};

/// Read-only view of one node block.
pub struct NodeRef<'a> {
    data: &'a [u8],
    layout: NodeLayout,
    header: NodeHeader,
}

impl<'a> NodeRef<'a> {
    /// Binds a block slice, validating the header tag.
    pub fn new(data: &'a [u8], layout: NodeLayout) -> Result<Self> {
        let header = NodeHeader::from_bytes(data)?;
        Ok(Self {
            data,
            layout,
            header,
        })
    }

    pub fn kind(&self) -> BlockKind {
        self.header.kind
    }

    pub fn is_leaf(&self) -> bool {
        self.header.kind == BlockKind::Leaf
    }

    pub fn count(&self) -> u64 {
        self.header.entry_count
    }

    pub fn self_addr(&self) -> u64 {
        self.header.self_addr
    }

    pub fn capacity(&self) -> u64 {
        self.layout.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity()
    }

    /// Decoded MBR of entry `idx`.
    pub fn key(&self, idx: u64) -> Mbr {
        debug_assert!(idx < self.count());
        let off = self.layout.entry_offset(idx);
        Mbr::decode(&self.data[off..], self.layout.dimensions)
    }

    /// Raw value bytes of entry `idx`.
    pub fn value(&self, idx: u64) -> &'a [u8] {
        debug_assert!(idx < self.count());
        let off = self.layout.entry_offset(idx) + self.layout.key_size as usize;
        &self.data[off..off + self.layout.value_size as usize]
    }

    /// Child block address of entry `idx` (inner blocks only).
    pub fn child_addr(&self, idx: u64) -> u64 {
        debug_assert!(!self.is_leaf());
        let v = self.value(idx);
        u64::from_le_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]])
    }

    /// Union of all entry MBRs, or None for an empty node.
    pub fn covering_mbr(&self) -> Option<Mbr> {
        if self.count() == 0 {
            return None;
        }
        let mut mbr = self.key(0);
        for i in 1..self.count() {
            mbr.expand(&self.key(i));
        }
        Some(mbr)
    }
}

/// Mutable view of one node block.
pub struct NodeMut<'a> {
    data: &'a mut [u8],
    layout: NodeLayout,
}

impl<'a> NodeMut<'a> {
    /// Binds an existing block slice, validating the header tag.
    pub fn new(data: &'a mut [u8], layout: NodeLayout) -> Result<Self> {
        NodeHeader::from_bytes(data)?;
        Ok(Self { data, layout })
    }

    /// Initializes a fresh block as an empty node of the given kind.
    pub fn init(data: &'a mut [u8], layout: NodeLayout, kind: BlockKind, self_addr: u64) -> Self {
        let header = NodeHeader {
            kind,
            entry_count: 0,
            self_addr,
        };
        data[..NodeHeader::SIZE].copy_from_slice(&header.to_bytes());
        Self { data, layout }
    }

    /// Read-only view of the same block.
    pub fn reborrow(&self) -> NodeRef<'_> {
        NodeRef::new(self.data, self.layout).expect("header validated at bind time")
    }

    pub fn is_leaf(&self) -> bool {
        self.reborrow().is_leaf()
    }

    pub fn count(&self) -> u64 {
        self.reborrow().count()
    }

    pub fn capacity(&self) -> u64 {
        self.layout.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity()
    }

    pub fn key(&self, idx: u64) -> Mbr {
        self.reborrow().key(idx)
    }

    fn set_count(&mut self, count: u64) {
        self.data[8..16].copy_from_slice(&count.to_le_bytes());
    }

    /// Overwrites the MBR of entry `idx`.
    pub fn set_key(&mut self, idx: u64, key: &Mbr) {
        debug_assert!(idx < self.count());
        debug_assert_eq!(key.dimensions(), self.layout.dimensions);
        let off = self.layout.entry_offset(idx);
        key.encode_into(&mut self.data[off..off + self.layout.key_size as usize]);
    }

    /// Appends an entry. The node must not be full.
    pub fn push(&mut self, key: &Mbr, value: &[u8]) {
        let count = self.count();
        debug_assert!(count < self.capacity());
        debug_assert_eq!(key.dimensions(), self.layout.dimensions);
        debug_assert_eq!(value.len() as u64, self.layout.value_size);
        let off = self.layout.entry_offset(count);
        let key_size = self.layout.key_size as usize;
        key.encode_into(&mut self.data[off..off + key_size]);
        self.data[off + key_size..off + key_size + value.len()].copy_from_slice(value);
        self.set_count(count + 1);
    }

    /// Appends an inner entry pointing at `child`.
    pub fn push_child(&mut self, key: &Mbr, child: u64) {
        debug_assert!(!self.is_leaf());
        self.push(key, &child.to_le_bytes());
    }

    /// Removes entry `idx`, shifting trailing entries left by one slot.
    pub fn remove(&mut self, idx: u64) {
        let count = self.count();
        debug_assert!(idx < count);
        let pair = self.layout.pair_size() as usize;
        let start = self.layout.entry_offset(idx);
        let end = self.layout.entry_offset(count);
        if start + pair < end {
            self.data.copy_within(start + pair..end, start);
        }
        self.set_count(count - 1);
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.set_count(0);
    }
}
