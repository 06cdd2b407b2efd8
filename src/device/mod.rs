//! device — block store adapter (all engine I/O funnels through here).
//!
//! Submodules:
//! - file.rs: FileDevice: disk image file + exclusive advisory lock (<image>.lock).
//! - mem.rs: MemDevice: in-memory image with fault injection (tests, sessions).
//! - cache.rs: CachedDevice: LRU buffer cache in front of any device.
//!
//! Contract:
//! - read_block returns an owned Block (copy of the on-disk bytes);
//! - write_block writes the whole block back to `block.blockno`;
//! - release_block hands the block back (a no-op for uncached devices, the
//!   buffer is dropped either way).

use crate::consts::BSIZE;
use crate::error::DeviceError;

pub mod cache;
pub mod file;
pub mod mem;

pub use cache::CachedDevice;
pub use file::FileDevice;
pub use mem::MemDevice;

/// One filesystem block.
#[derive(Clone)]
pub struct Block {
    pub dev: u32,
    pub blockno: u32,
    pub data: Box<[u8; BSIZE]>,
}

impl Block {
    pub fn zeroed(dev: u32, blockno: u32) -> Self {
        Self {
            dev,
            blockno,
            data: Box::new([0u8; BSIZE]),
        }
    }

    /// Build a block from a slice (must be exactly BSIZE bytes).
    pub fn from_slice(dev: u32, blockno: u32, bytes: &[u8]) -> Result<Self, DeviceError> {
        if bytes.len() != BSIZE {
            return Err(DeviceError::Other(format!(
                "block payload {} B != BSIZE {}",
                bytes.len(),
                BSIZE
            )));
        }
        let mut b = Self::zeroed(dev, blockno);
        b.data.copy_from_slice(bytes);
        Ok(b)
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("dev", &self.dev)
            .field("blockno", &self.blockno)
            .finish()
    }
}

/// Block store adapter.
pub trait BlockDevice {
    /// Device number reported in every Block.
    fn dev(&self) -> u32;

    /// Number of addressable blocks.
    fn block_count(&self) -> u32;

    fn read_block(&mut self, blockno: u32) -> Result<Block, DeviceError>;

    fn write_block(&mut self, block: &Block) -> Result<(), DeviceError>;

    /// Return a block obtained from read_block.
    fn release_block(&mut self, block: Block) {
        drop(block);
    }

    /// Make previous writes durable.
    fn flush(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Drop any cached interpretation of on-disk content.
    fn invalidate_cache(&mut self) {}
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn dev(&self) -> u32 {
        (**self).dev()
    }
    fn block_count(&self) -> u32 {
        (**self).block_count()
    }
    fn read_block(&mut self, blockno: u32) -> Result<Block, DeviceError> {
        (**self).read_block(blockno)
    }
    fn write_block(&mut self, block: &Block) -> Result<(), DeviceError> {
        (**self).write_block(block)
    }
    fn release_block(&mut self, block: Block) {
        (**self).release_block(block)
    }
    fn flush(&mut self) -> Result<(), DeviceError> {
        (**self).flush()
    }
    fn invalidate_cache(&mut self) {
        (**self).invalidate_cache()
    }
}

/// Range guard shared by the device implementations.
#[inline]
pub(crate) fn check_range(blockno: u32, count: u32) -> Result<(), DeviceError> {
    if blockno >= count {
        return Err(DeviceError::OutOfRange { blockno, count });
    }
    Ok(())
}
