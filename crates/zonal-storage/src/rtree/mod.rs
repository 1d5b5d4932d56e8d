//! Disk-resident R-tree spatial index.
//!
//! A height-balanced multi-way tree whose entries are axis-aligned
//! bounding rectangles, stored in a single memory-mapped file of
//! fixed-size blocks.
//!
//! ## File Layout
//!
//! ```text
//! +------------------------+ 0
//! | IndexHeader (40 bytes) |   dimensions, key_size, value_size,
//! | padding                |   block_size, root_addr (all u64 LE)
//! +------------------------+ block_size
//! | NodeHeader (24 bytes)  |   block_kind, entry_count, self_addr
//! | entry 0: key | value   |   key = 2*d little-endian f64
//! | entry 1: key | value   |   value = payload (leaf) or
//! | ...                    |           child address (inner)
//! +------------------------+ 2 * block_size
//! | ...                    |
//! ```
//!
//! Entries are unordered and prefix-packed; `entry_count` live entries
//! are followed by garbage. Leaf and inner blocks share the layout but
//! differ in value size, so capacity is computed per block kind.
//!
//! ## Operations
//!
//! - Insert: ChooseLeaf by least enlargement, quadratic split on
//!   overflow, MBR propagation along the recorded descent path.
//! - Delete: backtracking exact-match descent, parent MBR tightening.
//!   No underflow handling; blocks are never reclaimed.
//! - Search: overlap (any intersection) and comprise (query covers the
//!   stored box), both pruning inner entries by overlap.

// Submodules
pub mod layout;
pub mod node;
mod split;
pub mod tree;

// Re-exports for public API
pub use layout::{BlockKind, IndexHeader, NodeHeader, NodeLayout, INVALID_ADDR};
pub use node::{NodeMut, NodeRef};
pub use tree::{IndexEntry, RTreeIndex, TreeStats};
