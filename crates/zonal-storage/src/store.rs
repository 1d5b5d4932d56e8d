//! Memory-mapped block store.
//!
//! A [`BlockStore`] maps one growing index file into the process address
//! space and hands out fixed-size blocks addressed by absolute byte
//! offset. Growth remaps the file, so block slices must not outlive an
//! [`BlockStore::allocate_block`] call; the borrow checker enforces this
//! because growth takes `&mut self` while access borrows `&self`.

use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::trace;
use zonal_common::{Result, ZonalError};

/// File-backed arena of fixed-size blocks.
pub struct BlockStore {
    file: File,
    map: MmapMut,
    block_size: u64,
}

impl BlockStore {
    /// Creates a new store file sized to exactly one block.
    ///
    /// Fails if the file already exists.
    pub fn create(path: &Path, block_size: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(block_size)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            map,
            block_size,
        })
    }

    /// Maps an existing store file.
    pub fn open(path: &Path, block_size: u64) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len == 0 || len % block_size != 0 {
            return Err(ZonalError::Corrupt(format!(
                "store size {} is not a positive multiple of block size {}",
                len, block_size
            )));
        }
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            map,
            block_size,
        })
    }

    /// Total mapped size in bytes.
    pub fn size(&self) -> u64 {
        self.map.len() as u64
    }

    /// Configured block size in bytes.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    fn check_addr(&self, addr: u64) -> Result<()> {
        if addr % self.block_size != 0 {
            return Err(ZonalError::UnalignedBlock {
                addr,
                block_size: self.block_size,
            });
        }
        if addr + self.block_size > self.size() {
            return Err(ZonalError::BlockOutOfRange {
                addr,
                size: self.size(),
            });
        }
        Ok(())
    }

    /// Read access to the block at byte offset `addr`.
    pub fn block(&self, addr: u64) -> Result<&[u8]> {
        self.check_addr(addr)?;
        let start = addr as usize;
        Ok(&self.map[start..start + self.block_size as usize])
    }

    /// Write access to the block at byte offset `addr`.
    pub fn block_mut(&mut self, addr: u64) -> Result<&mut [u8]> {
        self.check_addr(addr)?;
        let start = addr as usize;
        Ok(&mut self.map[start..start + self.block_size as usize])
    }

    /// Grows the file by one zero-filled block and returns its offset.
    ///
    /// Remaps the file; any previously obtained block slice is invalidated
    /// (statically, by the `&mut self` borrow).
    pub fn allocate_block(&mut self) -> Result<u64> {
        let addr = self.size();
        self.file.set_len(addr + self.block_size)?;
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        trace!(addr, size = self.size(), "allocated block");
        Ok(addr)
    }

    /// Flushes the mapped region to the backing file.
    pub fn sync(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }
}
