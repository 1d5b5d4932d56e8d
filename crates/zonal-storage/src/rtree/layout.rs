//! On-disk layout of the index file.
//!
//! Block 0 holds the [`IndexHeader`]; every further block is one tree
//! node: a [`NodeHeader`] followed by a packed array of fixed-size
//! `(key, value)` entries. Keys are MBRs; values are opaque payloads in
//! leaf blocks and child block addresses in inner blocks.

use zonal_common::{IndexConfig, Result, ZonalError};

/// Block address marking "no node" (block 0 is the index header).
pub const INVALID_ADDR: u64 = 0;

/// Value size of inner-block entries: a u64 child block address.
pub const CHILD_ADDR_SIZE: u64 = 8;

/// Header structure at offset 0 of the index file.
///
/// Layout (40 bytes, five u64 LE):
/// - dimensions: 8 bytes
/// - key_size: 8 bytes
/// - value_size: 8 bytes
/// - block_size: 8 bytes
/// - root_addr: 8 bytes (0 = empty tree)
///
/// The remainder of block 0 is padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    /// Number of spatial dimensions.
    pub dimensions: u64,
    /// Serialized key size in bytes (2 * dimensions * 8).
    pub key_size: u64,
    /// Leaf payload size in bytes.
    pub value_size: u64,
    /// Block size in bytes.
    pub block_size: u64,
    /// Block address of the root node, or [`INVALID_ADDR`].
    pub root_addr: u64,
}

impl IndexHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 40;

    /// Creates the header for a freshly created, empty index.
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            dimensions: config.dimensions,
            key_size: config.key_size(),
            value_size: config.value_size,
            block_size: config.block_size,
            root_addr: INVALID_ADDR,
        }
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.dimensions.to_le_bytes());
        buf[8..16].copy_from_slice(&self.key_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.value_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.block_size.to_le_bytes());
        buf[32..40].copy_from_slice(&self.root_addr.to_le_bytes());
        buf
    }

    /// Deserializes from bytes.
    pub fn from_bytes(buf: &[u8]) -> Self {
        let u64_at = |o: usize| {
            u64::from_le_bytes([
                buf[o],
                buf[o + 1],
                buf[o + 2],
                buf[o + 3],
                buf[o + 4],
                buf[o + 5],
                buf[o + 6],
                buf[o + 7],
            ])
        };
        Self {
            dimensions: u64_at(0),
            key_size: u64_at(8),
            value_size: u64_at(16),
            block_size: u64_at(24),
            root_addr: u64_at(32),
        }
    }

    /// Checks the stored geometry against the caller's expectation.
    pub fn verify(&self, config: &IndexConfig) -> Result<()> {
        let checks: [(&'static str, u64, u64); 4] = [
            ("dimensions", config.dimensions, self.dimensions),
            ("key_size", config.key_size(), self.key_size),
            ("value_size", config.value_size, self.value_size),
            ("block_size", config.block_size, self.block_size),
        ];
        for (field, expected, actual) in checks {
            if expected != actual {
                return Err(ZonalError::HeaderMismatch {
                    field,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Node block kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum BlockKind {
    /// Entries carry user payloads.
    Leaf = 0,
    /// Entries carry child block addresses.
    Inner = 1,
}

impl BlockKind {
    /// Decodes the on-disk tag.
    pub fn from_u64(tag: u64) -> Result<Self> {
        match tag {
            0 => Ok(BlockKind::Leaf),
            1 => Ok(BlockKind::Inner),
            other => Err(ZonalError::InvalidBlockKind(other)),
        }
    }
}

/// Header at the start of every node block.
///
/// Layout (24 bytes, three u64 LE):
/// - block_kind: 8 bytes (0 = leaf, 1 = inner)
/// - entry_count: 8 bytes
/// - self_addr: 8 bytes (the block's own offset, for self-identification)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    /// Leaf or inner.
    pub kind: BlockKind,
    /// Number of live entries.
    pub entry_count: u64,
    /// Block offset this node is stored at.
    pub self_addr: u64,
}

impl NodeHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 24;

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&(self.kind as u64).to_le_bytes());
        buf[8..16].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.self_addr.to_le_bytes());
        buf
    }

    /// Deserializes from bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let u64_at = |o: usize| {
            u64::from_le_bytes([
                buf[o],
                buf[o + 1],
                buf[o + 2],
                buf[o + 3],
                buf[o + 4],
                buf[o + 5],
                buf[o + 6],
                buf[o + 7],
            ])
        };
        Ok(Self {
            kind: BlockKind::from_u64(u64_at(0))?,
            entry_count: u64_at(8),
            self_addr: u64_at(16),
        })
    }
}

/// Entry layout parameters for one block kind.
///
/// Leaf and inner blocks differ in value size (payload vs. child
/// address), so each kind has its own capacity. Capacity checks must use
/// the layout of the specific block, never a shared constant.
#[derive(Debug, Clone, Copy)]
pub struct NodeLayout {
    /// Serialized key size in bytes.
    pub key_size: u64,
    /// Value size for this block kind.
    pub value_size: u64,
    /// Block size in bytes.
    pub block_size: u64,
    /// Number of spatial dimensions.
    pub dimensions: u64,
}

impl NodeLayout {
    /// Layout of leaf blocks under `config`.
    pub fn leaf(config: &IndexConfig) -> Self {
        Self {
            key_size: config.key_size(),
            value_size: config.value_size,
            block_size: config.block_size,
            dimensions: config.dimensions,
        }
    }

    /// Layout of inner blocks under `config`.
    pub fn inner(config: &IndexConfig) -> Self {
        Self {
            key_size: config.key_size(),
            value_size: CHILD_ADDR_SIZE,
            block_size: config.block_size,
            dimensions: config.dimensions,
        }
    }

    /// Layout for the given block kind.
    pub fn for_kind(config: &IndexConfig, kind: BlockKind) -> Self {
        match kind {
            BlockKind::Leaf => Self::leaf(config),
            BlockKind::Inner => Self::inner(config),
        }
    }

    /// Bytes per entry.
    pub fn pair_size(&self) -> u64 {
        self.key_size + self.value_size
    }

    /// Maximum number of entries per block.
    pub fn capacity(&self) -> u64 {
        (self.block_size - NodeHeader::SIZE as u64) / self.pair_size()
    }

    /// Byte offset of entry `idx` within the block.
    pub fn entry_offset(&self, idx: u64) -> usize {
        NodeHeader::SIZE + (idx * self.pair_size()) as usize
    }
}
