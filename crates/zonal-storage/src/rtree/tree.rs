//! Disk-resident R-tree index.
//!
//! The engine descends top-down, recording the path as
//! `(block_addr, child_index)` pairs, and walks it back up to fix
//! ancestor MBRs after inserts and deletes. Node handles are re-resolved
//! from their block address at every step; nothing survives a block
//! allocation, which may remap the store.
//!
//! Insertion follows Guttman: choose the child of least enlargement, and
//! on overflow run the quadratic split, bubbling the new sibling upward
//! until a parent has room or a new root is grown. Deletion locates the
//! exact key with a backtracking descent and tightens ancestor MBRs on
//! the way out. No underflow handling is performed; blocks are never
//! reclaimed.

use bytes::Bytes;
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;
use zonal_common::{IndexConfig, Mbr, Result, ZonalError};

use super::layout::{BlockKind, IndexHeader, NodeHeader, NodeLayout, INVALID_ADDR};
use super::node::{NodeMut, NodeRef};
use super::split::{quadratic_split, SplitEntry};
use crate::store::BlockStore;

/// What a traversal is matching against the query box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchMode {
    /// Any intersection with the query.
    Overlap,
    /// The query fully covers the stored MBR.
    Comprise,
}

/// One leaf entry, with an owned copy of its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// The entry's bounding rectangle.
    pub mbr: Mbr,
    /// The stored payload (`value_size` bytes).
    pub value: Bytes,
}

/// Structural statistics gathered by [`RTreeIndex::check_consistency`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Levels from root to leaves (0 for an empty tree).
    pub height: u64,
    /// Number of node blocks reachable from the root.
    pub node_count: u64,
    /// Number of leaf entries.
    pub entry_count: u64,
    /// Smallest leaf entry count.
    pub min_leaf_fill: u64,
    /// Largest leaf entry count.
    pub max_leaf_fill: u64,
}

/// A memory-mapped R-tree over one index file.
pub struct RTreeIndex {
    store: BlockStore,
    config: IndexConfig,
}

impl RTreeIndex {
    /// Creates a new empty index file `name` under `dir`.
    ///
    /// Fails if the file already exists.
    pub fn create(dir: &Path, name: &str, config: IndexConfig) -> Result<Self> {
        Self::validate_layout(&config)?;
        let store = BlockStore::create(&dir.join(name), config.block_size)?;
        let mut tree = Self { store, config };
        let header = IndexHeader::new(&config);
        tree.store.block_mut(0)?[..IndexHeader::SIZE].copy_from_slice(&header.to_bytes());
        debug!(?config, "created index");
        Ok(tree)
    }

    /// Attaches to an existing index file.
    ///
    /// Fails with [`ZonalError::HeaderMismatch`] if the stored geometry
    /// disagrees with `config`.
    pub fn open(dir: &Path, name: &str, config: IndexConfig) -> Result<Self> {
        Self::validate_layout(&config)?;
        let store = BlockStore::open(&dir.join(name), config.block_size)?;
        let tree = Self { store, config };
        tree.header()?.verify(&config)?;
        Ok(tree)
    }

    fn validate_layout(config: &IndexConfig) -> Result<()> {
        config.validate()?;
        for kind in [BlockKind::Leaf, BlockKind::Inner] {
            let capacity = NodeLayout::for_kind(config, kind).capacity();
            if capacity < 2 {
                return Err(ZonalError::Config(format!(
                    "block size {} holds only {} {:?} entries, need at least 2",
                    config.block_size, capacity, kind
                )));
            }
        }
        Ok(())
    }

    /// The index configuration.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Flushes the mapped file to disk.
    pub fn sync(&self) -> Result<()> {
        self.store.sync()
    }

    fn header(&self) -> Result<IndexHeader> {
        Ok(IndexHeader::from_bytes(self.store.block(0)?))
    }

    fn set_root_addr(&mut self, addr: u64) -> Result<()> {
        let mut header = self.header()?;
        header.root_addr = addr;
        self.store.block_mut(0)?[..IndexHeader::SIZE].copy_from_slice(&header.to_bytes());
        Ok(())
    }

    /// Resolves a read handle for the node at `addr`.
    fn node(&self, addr: u64) -> Result<NodeRef<'_>> {
        let block = self.store.block(addr)?;
        let header = NodeHeader::from_bytes(block)?;
        NodeRef::new(block, NodeLayout::for_kind(&self.config, header.kind))
    }

    /// Resolves a write handle for the node at `addr`.
    fn node_mut(&mut self, addr: u64) -> Result<NodeMut<'_>> {
        let kind = self.node(addr)?.kind();
        let layout = NodeLayout::for_kind(&self.config, kind);
        NodeMut::new(self.store.block_mut(addr)?, layout)
    }

    fn check_key(&self, key: &Mbr) -> Result<()> {
        if key.dimensions() != self.config.dimensions {
            return Err(ZonalError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: key.dimensions(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Inserts a `(key, value)` entry.
    ///
    /// Duplicate keys are allowed; every insert stores a new entry.
    pub fn insert(&mut self, key: &Mbr, value: &[u8]) -> Result<()> {
        self.check_key(key)?;
        if value.len() as u64 != self.config.value_size {
            return Err(ZonalError::ValueSizeMismatch {
                expected: self.config.value_size,
                actual: value.len() as u64,
            });
        }

        let root = self.header()?.root_addr;
        if root == INVALID_ADDR {
            // First insert: the new leaf becomes the root.
            let addr = self.store.allocate_block()?;
            let layout = NodeLayout::leaf(&self.config);
            let mut node =
                NodeMut::init(self.store.block_mut(addr)?, layout, BlockKind::Leaf, addr);
            node.push(key, value);
            self.set_root_addr(addr)?;
            debug!(root = addr, "created root leaf");
            return Ok(());
        }

        let mut path = self.choose_leaf(root, key)?;
        let (leaf_addr, _) = path.pop().expect("descent reaches a leaf");

        if !self.node(leaf_addr)?.is_full() {
            let new_mbr = {
                let mut leaf = self.node_mut(leaf_addr)?;
                leaf.push(key, value);
                leaf.reborrow()
                    .covering_mbr()
                    .expect("leaf just received an entry")
            };
            return self.propagate_mbr(&mut path, new_mbr);
        }

        self.split_insert(path, leaf_addr, key.clone(), value.to_vec())
    }

    /// Descends from `root` picking the child of least enlargement at
    /// each inner node, ties broken by smaller area. Returns the path of
    /// `(block_addr, child_index)` frames; the final frame is the leaf
    /// with an unused index of 0.
    fn choose_leaf(&self, root: u64, key: &Mbr) -> Result<Vec<(u64, u64)>> {
        let mut path = Vec::new();
        let mut addr = root;
        loop {
            let node = self.node(addr)?;
            if node.is_leaf() {
                path.push((addr, 0));
                return Ok(path);
            }

            let mut best_idx = 0u64;
            let mut best_growth = f64::INFINITY;
            let mut best_area = f64::INFINITY;
            for i in 0..node.count() {
                let mbr = node.key(i);
                let area = mbr.area();
                let growth = mbr.union(key).area() - area;
                if growth < best_growth || (growth == best_growth && area < best_area) {
                    best_growth = growth;
                    best_area = area;
                    best_idx = i;
                }
            }

            path.push((addr, best_idx));
            addr = node.child_addr(best_idx);
        }
    }

    /// Updates ancestor MBRs after a child's covering box changed,
    /// stopping as soon as an ancestor's stored entry is already exact.
    fn propagate_mbr(&mut self, path: &mut Vec<(u64, u64)>, mut child_mbr: Mbr) -> Result<()> {
        while let Some((addr, idx)) = path.pop() {
            let stored = self.node(addr)?.key(idx);
            if stored == child_mbr {
                break;
            }
            child_mbr = {
                let mut node = self.node_mut(addr)?;
                node.set_key(idx, &child_mbr);
                node.reborrow()
                    .covering_mbr()
                    .expect("inner node has entries")
            };
        }
        Ok(())
    }

    /// Splits the full node at `target` around one pending entry and
    /// bubbles the new sibling upward along `path`.
    fn split_insert(
        &mut self,
        mut path: Vec<(u64, u64)>,
        node_addr: u64,
        key: Mbr,
        value: Vec<u8>,
    ) -> Result<()> {
        let mut target = node_addr;
        let mut pending_key = key;
        let mut pending_value = value;

        loop {
            // Lift all current entries plus the pending one out of the block.
            let (kind, mut entries) = {
                let node = self.node(target)?;
                let mut entries = Vec::with_capacity(node.count() as usize + 1);
                for i in 0..node.count() {
                    entries.push(SplitEntry {
                        key: node.key(i),
                        value: node.value(i).to_vec(),
                    });
                }
                (node.kind(), entries)
            };
            entries.push(SplitEntry {
                key: pending_key,
                value: pending_value,
            });

            let split = quadratic_split(entries);
            let sibling = self.store.allocate_block()?;
            let layout = NodeLayout::for_kind(&self.config, kind);
            debug!(
                addr = target,
                sibling,
                kept = split.group_two.len(),
                moved = split.group_one.len(),
                "split node"
            );

            // Rewrite the target in place with the second group.
            {
                let mut node = NodeMut::new(self.store.block_mut(target)?, layout)?;
                node.clear();
                for e in &split.group_two {
                    node.push(&e.key, &e.value);
                }
            }
            // The sibling takes the first group.
            {
                let mut node = NodeMut::init(self.store.block_mut(sibling)?, layout, kind, sibling);
                for e in &split.group_one {
                    node.push(&e.key, &e.value);
                }
            }

            match path.pop() {
                None => {
                    // The root split: grow the tree by one level.
                    let new_root = self.store.allocate_block()?;
                    let inner = NodeLayout::inner(&self.config);
                    let mut node = NodeMut::init(
                        self.store.block_mut(new_root)?,
                        inner,
                        BlockKind::Inner,
                        new_root,
                    );
                    node.push_child(&split.two_mbr, target);
                    node.push_child(&split.one_mbr, sibling);
                    self.set_root_addr(new_root)?;
                    debug!(root = new_root, "grew tree with new root");
                    return Ok(());
                }
                Some((parent_addr, entry_idx)) => {
                    // The parent's entry for the target shrinks to the kept group.
                    {
                        let mut parent = self.node_mut(parent_addr)?;
                        parent.set_key(entry_idx, &split.two_mbr);
                    }

                    if !self.node(parent_addr)?.is_full() {
                        let new_mbr = {
                            let mut parent = self.node_mut(parent_addr)?;
                            parent.push_child(&split.one_mbr, sibling);
                            parent
                                .reborrow()
                                .covering_mbr()
                                .expect("inner node has entries")
                        };
                        return self.propagate_mbr(&mut path, new_mbr);
                    }

                    // Parent full: the sibling entry becomes the pending
                    // insert one level up.
                    target = parent_addr;
                    pending_key = split.one_mbr;
                    pending_value = sibling.to_le_bytes().to_vec();
                }
            }
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Removes one entry whose MBR equals `key` componentwise.
    ///
    /// Returns `false` if no such entry exists. Ancestor MBRs are
    /// tightened; nodes are never merged or reclaimed.
    pub fn delete(&mut self, key: &Mbr) -> Result<bool> {
        self.check_key(key)?;
        let root = self.header()?.root_addr;
        if root == INVALID_ADDR {
            return Ok(false);
        }

        let mut path = Vec::new();
        let Some((leaf_addr, entry_idx)) = self.find_leaf(root, key, &mut path)? else {
            return Ok(false);
        };

        let new_mbr = {
            let mut leaf = self.node_mut(leaf_addr)?;
            leaf.remove(entry_idx);
            leaf.reborrow().covering_mbr()
        };
        // An emptied leaf keeps its stale parent entry; the subtree
        // simply yields nothing until refilled.
        if let Some(mbr) = new_mbr {
            self.propagate_mbr(&mut path, mbr)?;
        }
        Ok(true)
    }

    /// Backtracking descent for delete: tries every child whose MBR
    /// overlaps `key` and returns the first leaf holding an exact match,
    /// leaving the path to it in `path`.
    fn find_leaf(
        &self,
        addr: u64,
        key: &Mbr,
        path: &mut Vec<(u64, u64)>,
    ) -> Result<Option<(u64, u64)>> {
        let node = self.node(addr)?;
        if node.is_leaf() {
            for i in 0..node.count() {
                if node.key(i) == *key {
                    return Ok(Some((addr, i)));
                }
            }
            return Ok(None);
        }

        for i in 0..node.count() {
            if node.key(i).overlaps(key) {
                path.push((addr, i));
                if let Some(hit) = self.find_leaf(node.child_addr(i), key, path)? {
                    return Ok(Some(hit));
                }
                path.pop();
            }
        }
        Ok(None)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// All leaf entries whose MBR intersects `query` (closed boxes).
    pub fn overlap_search(&self, query: &Mbr) -> Result<Vec<IndexEntry>> {
        self.check_key(query)?;
        self.search(query, SearchMode::Overlap)
    }

    /// All leaf entries whose MBR is fully covered by `query`.
    pub fn comprise_search(&self, query: &Mbr) -> Result<Vec<IndexEntry>> {
        self.check_key(query)?;
        self.search(query, SearchMode::Comprise)
    }

    fn search(&self, query: &Mbr, mode: SearchMode) -> Result<Vec<IndexEntry>> {
        let mut results = Vec::new();
        let root = self.header()?.root_addr;
        if root != INVALID_ADDR {
            self.search_node(root, query, mode, &mut results)?;
        }
        Ok(results)
    }

    fn search_node(
        &self,
        addr: u64,
        query: &Mbr,
        mode: SearchMode,
        results: &mut Vec<IndexEntry>,
    ) -> Result<()> {
        let node = self.node(addr)?;
        for i in 0..node.count() {
            let mbr = node.key(i);
            if node.is_leaf() {
                let hit = match mode {
                    SearchMode::Overlap => mbr.overlaps(query),
                    SearchMode::Comprise => query.covers(&mbr),
                };
                if hit {
                    results.push(IndexEntry {
                        mbr,
                        value: Bytes::copy_from_slice(node.value(i)),
                    });
                }
            } else if mbr.overlaps(query) {
                // Both modes prune inner entries by overlap: a child may
                // hold any box inside this entry's MBR, so covers-based
                // pruning would skip valid subtrees.
                self.search_node(node.child_addr(i), query, mode, results)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Every leaf entry, in traversal order.
    pub fn all_entries(&self) -> Result<Vec<IndexEntry>> {
        let mut results = Vec::new();
        let root = self.header()?.root_addr;
        if root != INVALID_ADDR {
            self.collect_entries(root, &mut results)?;
        }
        Ok(results)
    }

    fn collect_entries(&self, addr: u64, results: &mut Vec<IndexEntry>) -> Result<()> {
        let node = self.node(addr)?;
        for i in 0..node.count() {
            if node.is_leaf() {
                results.push(IndexEntry {
                    mbr: node.key(i),
                    value: Bytes::copy_from_slice(node.value(i)),
                });
            } else {
                self.collect_entries(node.child_addr(i), results)?;
            }
        }
        Ok(())
    }

    /// Number of leaf entries.
    pub fn len(&self) -> Result<u64> {
        Ok(self.all_entries()?.len() as u64)
    }

    /// True if the index holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Renders the tree structure as indented text.
    pub fn dump_tree(&self) -> Result<String> {
        let header = self.header()?;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "index: dimensions={} key_size={} value_size={} block_size={} root={}",
            header.dimensions,
            header.key_size,
            header.value_size,
            header.block_size,
            header.root_addr
        );
        if header.root_addr == INVALID_ADDR {
            let _ = writeln!(out, "(empty)");
        } else {
            self.dump_node(header.root_addr, 0, &mut out)?;
        }
        Ok(out)
    }

    fn dump_node(&self, addr: u64, depth: usize, out: &mut String) -> Result<()> {
        let node = self.node(addr)?;
        let indent = "  ".repeat(depth);
        let kind = if node.is_leaf() { "leaf" } else { "inner" };
        let _ = writeln!(out, "{}{} @{} ({} entries)", indent, kind, addr, node.count());
        for i in 0..node.count() {
            let mbr = node.key(i);
            if node.is_leaf() {
                let hex: String = node.value(i).iter().map(|b| format!("{:02x}", b)).collect();
                let _ = writeln!(out, "{}  {:?} value=0x{}", indent, mbr.as_slice(), hex);
            } else {
                let _ = writeln!(
                    out,
                    "{}  {:?} -> @{}",
                    indent,
                    mbr.as_slice(),
                    node.child_addr(i)
                );
                self.dump_node(node.child_addr(i), depth + 1, out)?;
            }
        }
        Ok(())
    }

    /// Walks the whole tree validating its structural invariants:
    /// equal leaf depth, tight parent MBRs, per-kind capacity bounds,
    /// non-empty inner nodes, and self-recorded block addresses.
    pub fn check_consistency(&self) -> Result<TreeStats> {
        let root = self.header()?.root_addr;
        let mut stats = TreeStats {
            height: 0,
            node_count: 0,
            entry_count: 0,
            min_leaf_fill: u64::MAX,
            max_leaf_fill: 0,
        };
        if root == INVALID_ADDR {
            stats.min_leaf_fill = 0;
            return Ok(stats);
        }

        let mut leaf_depth = None;
        self.check_node(root, 0, None, &mut leaf_depth, &mut stats)?;
        stats.height = leaf_depth.expect("tree with a root has leaves") + 1;
        Ok(stats)
    }

    fn check_node(
        &self,
        addr: u64,
        depth: u64,
        expected_mbr: Option<&Mbr>,
        leaf_depth: &mut Option<u64>,
        stats: &mut TreeStats,
    ) -> Result<()> {
        let node = self.node(addr)?;
        if node.self_addr() != addr {
            return Err(ZonalError::Corrupt(format!(
                "node at {} records self address {}",
                addr,
                node.self_addr()
            )));
        }
        if node.count() > node.capacity() {
            return Err(ZonalError::Corrupt(format!(
                "node at {} holds {} entries over capacity {}",
                addr,
                node.count(),
                node.capacity()
            )));
        }

        match (node.covering_mbr(), expected_mbr) {
            (Some(actual), Some(expected)) if actual != *expected => {
                return Err(ZonalError::Corrupt(format!(
                    "parent MBR of node at {} is not the union of its entries",
                    addr
                )));
            }
            // A leaf emptied by deletes keeps its stale parent entry.
            _ => {}
        }

        stats.node_count += 1;
        if node.is_leaf() {
            stats.entry_count += node.count();
            stats.min_leaf_fill = stats.min_leaf_fill.min(node.count());
            stats.max_leaf_fill = stats.max_leaf_fill.max(node.count());
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(d) if d != depth => {
                    return Err(ZonalError::Corrupt(format!(
                        "leaf depth varies: {} vs {}",
                        d, depth
                    )));
                }
                Some(_) => {}
            }
        } else {
            if node.count() == 0 {
                return Err(ZonalError::Corrupt(format!("empty inner node at {}", addr)));
            }
            for i in 0..node.count() {
                let expected = node.key(i);
                self.check_node(node.child_addr(i), depth + 1, Some(&expected), leaf_depth, stats)?;
            }
        }
        Ok(())
    }
}
