//! MemDevice — образ в памяти.
//!
//! Used by tests and by `fssnap session --in-memory`. Supports fault injection:
//! - fail_read(blockno) / fail_write(blockno): next access to that block fails;
//! - reads/writes counters for assertions.

use std::collections::HashSet;

use crate::consts::{BSIZE, ROOTDEV};
use crate::error::DeviceError;

use super::{check_range, Block, BlockDevice};

pub struct MemDevice {
    dev: u32,
    blocks: Vec<[u8; BSIZE]>,
    fail_reads: HashSet<u32>,
    fail_writes: HashSet<u32>,
    pub reads: u64,
    pub writes: u64,
}

impl MemDevice {
    /// Zero-filled device of `nblocks` blocks.
    pub fn new(nblocks: u32) -> Self {
        Self {
            dev: ROOTDEV,
            blocks: vec![[0u8; BSIZE]; nblocks as usize],
            fail_reads: HashSet::new(),
            fail_writes: HashSet::new(),
            reads: 0,
            writes: 0,
        }
    }

    /// Load from a raw image (length is rounded down to whole blocks).
    pub fn from_image(bytes: &[u8]) -> Self {
        let n = bytes.len() / BSIZE;
        let mut d = Self::new(n as u32);
        for (i, chunk) in bytes.chunks_exact(BSIZE).enumerate() {
            d.blocks[i].copy_from_slice(chunk);
        }
        d
    }

    pub fn with_dev(mut self, dev: u32) -> Self {
        self.dev = dev;
        self
    }

    /// Whole image as one byte vector.
    pub fn to_image(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.blocks.len() * BSIZE);
        for b in &self.blocks {
            out.extend_from_slice(b);
        }
        out
    }

    /// Borrow raw bytes of a block (no counters, no fault injection).
    pub fn raw(&self, blockno: u32) -> Option<&[u8; BSIZE]> {
        self.blocks.get(blockno as usize)
    }

    /// Overwrite a block bypassing counters and faults (simulates a foreign writer).
    pub fn poke(&mut self, blockno: u32, bytes: &[u8; BSIZE]) {
        if let Some(b) = self.blocks.get_mut(blockno as usize) {
            b.copy_from_slice(bytes);
        }
    }

    pub fn fail_read(&mut self, blockno: u32) {
        self.fail_reads.insert(blockno);
    }

    pub fn fail_write(&mut self, blockno: u32) {
        self.fail_writes.insert(blockno);
    }

    pub fn clear_faults(&mut self) {
        self.fail_reads.clear();
        self.fail_writes.clear();
    }
}

impl BlockDevice for MemDevice {
    fn dev(&self) -> u32 {
        self.dev
    }

    fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    fn read_block(&mut self, blockno: u32) -> Result<Block, DeviceError> {
        check_range(blockno, self.block_count())?;
        if self.fail_reads.remove(&blockno) {
            return Err(DeviceError::Injected(blockno));
        }
        self.reads += 1;
        let mut b = Block::zeroed(self.dev, blockno);
        b.data.copy_from_slice(&self.blocks[blockno as usize]);
        Ok(b)
    }

    fn write_block(&mut self, block: &Block) -> Result<(), DeviceError> {
        check_range(block.blockno, self.block_count())?;
        if self.fail_writes.remove(&block.blockno) {
            return Err(DeviceError::Injected(block.blockno));
        }
        self.writes += 1;
        self.blocks[block.blockno as usize].copy_from_slice(&block.data[..]);
        Ok(())
    }
}
