//! Storage engine for zonal.
//!
//! This crate provides:
//! - A memory-mapped, grow-only block store backing one index file
//! - A disk-resident R-tree over fixed-size blocks with point and range
//!   insertion, exact-match deletion, and overlap/comprise range queries

mod rtree;
mod store;

pub use rtree::{
    BlockKind, IndexEntry, IndexHeader, NodeHeader, NodeLayout, NodeMut, NodeRef, RTreeIndex,
    TreeStats, INVALID_ADDR,
};
pub use store::BlockStore;
