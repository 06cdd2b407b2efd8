//! backup — per-category capture/restore phases.
//!
//! Подмодули:
//! - inodes.rs: raw inode table (inodestart .. +inode_blocks);
//! - dirs.rs: direct data blocks of directory inodes (+ address map);
//! - files.rs: direct + single-indirect data blocks of regular files (+ address map);
//! - bitmap.rs: free-block bitmap (bmapstart .. +bitmap_blocks).
//!
//! Common pieces live here:
//! - BackupBuffer: one Region per category, whole blocks only, truncation flag,
//!   optional origin block for range categories (inodes/bitmap);
//! - AddressMap: source block numbers index-aligned with the buffer
//!   (map[i] is where buffer block i came from);
//! - ContentBackup: buffer + map pair built by the directory/file walks.
//!
//! Phases never touch slot state: they return artifacts or errors, and the
//! lifecycle manager decides what to keep.

use crc32fast::Hasher as Crc32;
use log::warn;

use crate::alloc::{Region, RegionAllocator};
use crate::config::CapacityPolicy;
use crate::consts::BSIZE;
use crate::device::{Block, BlockDevice};
use crate::error::{Category, SnapResult, SnapshotError};
use crate::metrics::{record_capture_block, record_restore_block, record_truncation};

pub mod bitmap;
pub mod dirs;
pub mod files;
pub mod inodes;

pub use bitmap::{capture_bitmap, restore_bitmap};
pub use dirs::{capture_directories, restore_directories};
pub use files::{capture_files, restore_files};
pub use inodes::{capture_inodes, restore_inodes};

/// Captured bytes of one category.
#[derive(Debug)]
pub struct BackupBuffer {
    category: Category,
    region: Region,
    origin: Option<u32>,
    truncated: bool,
}

impl BackupBuffer {
    /// Obtain the category's region from the allocator.
    pub(crate) fn allocate(
        alloc: &dyn RegionAllocator,
        category: Category,
        policy: CapacityPolicy,
    ) -> SnapResult<Self> {
        let region = alloc
            .allocate(policy.limit())
            .ok_or(SnapshotError::AllocationFailure { category })?;
        Ok(Self {
            category,
            region,
            origin: None,
            truncated: false,
        })
    }

    pub(crate) fn with_origin(mut self, start: u32) -> Self {
        self.origin = Some(start);
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// First block of the source range (inodes/bitmap only).
    pub fn origin(&self) -> Option<u32> {
        self.origin
    }

    pub fn bytes(&self) -> usize {
        self.region.len()
    }

    pub fn blocks(&self) -> usize {
        self.region.len() / BSIZE
    }

    pub fn block(&self, i: usize) -> Option<&[u8]> {
        let off = i.checked_mul(BSIZE)?;
        self.region.as_slice().get(off..off + BSIZE)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.region.as_slice()
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn limit(&self) -> Option<usize> {
        self.region.limit()
    }

    /// Room for one more block.
    pub fn has_room(&self) -> bool {
        self.region.remaining() >= BSIZE
    }

    pub fn crc32(&self) -> u32 {
        let mut h = Crc32::new();
        h.update(self.region.as_slice());
        h.finalize()
    }

    /// Record that content did not fit. Strict policy turns it into an error.
    pub(crate) fn mark_full(&mut self, policy: CapacityPolicy) -> SnapResult<()> {
        if let CapacityPolicy::Strict { bytes } = policy {
            return Err(SnapshotError::CapacityExceeded {
                category: self.category,
                capacity: bytes,
            });
        }
        if !self.truncated {
            self.truncated = true;
            record_truncation();
            warn!(
                "capture: {} buffer full at {} B, content truncated",
                self.category,
                self.region.len()
            );
        }
        Ok(())
    }

    /// Append one block. Callers check has_room() first.
    pub(crate) fn push_block(&mut self, data: &[u8; BSIZE]) -> bool {
        let ok = self.region.try_extend(&data[..]);
        if ok {
            record_capture_block();
        }
        ok
    }
}

/// Source block numbers of a content buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressMap {
    addrs: Vec<u32>,
}

impl AddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<u32> {
        self.addrs.get(i).copied()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.addrs
    }

    pub(crate) fn push(&mut self, blockno: u32) {
        self.addrs.push(blockno);
    }
}

/// Buffer + map of a content category (directories or files).
#[derive(Debug)]
pub struct ContentBackup {
    pub buffer: BackupBuffer,
    pub map: AddressMap,
}

impl ContentBackup {
    pub(crate) fn new(buffer: BackupBuffer) -> Self {
        Self {
            buffer,
            map: AddressMap::new(),
        }
    }

    pub fn blocks(&self) -> usize {
        self.map.len()
    }

    /// Read `blockno` and append it with its address.
    /// Ok(false) when the buffer is full: the walk must stop.
    pub(crate) fn add_block<D: BlockDevice + ?Sized>(
        &mut self,
        dev: &mut D,
        blockno: u32,
        policy: CapacityPolicy,
    ) -> SnapResult<bool> {
        if !self.buffer.has_room() {
            self.buffer.mark_full(policy)?;
            return Ok(false);
        }
        let b = dev.read_block(blockno)?;
        let pushed = self.buffer.push_block(&b.data);
        dev.release_block(b);
        if pushed {
            self.map.push(blockno);
        }
        debug_assert_eq!(self.map.len(), self.buffer.blocks());
        Ok(pushed)
    }
}

/// Copy `count` consecutive blocks from `start` into `buf` (inodes/bitmap).
pub(crate) fn capture_range<D: BlockDevice + ?Sized>(
    dev: &mut D,
    buf: &mut BackupBuffer,
    start: u32,
    count: u32,
    policy: CapacityPolicy,
) -> SnapResult<()> {
    for i in 0..count {
        if !buf.has_room() {
            buf.mark_full(policy)?;
            break;
        }
        let b = dev.read_block(start + i)?;
        buf.push_block(&b.data);
        dev.release_block(b);
    }
    Ok(())
}

/// Write buffer blocks back to `origin + i`, in capture order.
pub(crate) fn restore_range<D: BlockDevice + ?Sized>(
    dev: &mut D,
    buf: &BackupBuffer,
) -> SnapResult<usize> {
    let origin = buf.origin().ok_or(SnapshotError::NoBackup(buf.category()))?;
    for i in 0..buf.blocks() {
        if let Some(bytes) = buf.block(i) {
            write_back(dev, origin + i as u32, bytes)?;
        }
    }
    Ok(buf.blocks())
}

/// Write buffer block i to map[i] for every map entry, in map order.
pub(crate) fn restore_mapped<D: BlockDevice + ?Sized>(
    dev: &mut D,
    content: &ContentBackup,
) -> SnapResult<usize> {
    for (i, &blockno) in content.map.as_slice().iter().enumerate() {
        let bytes = content
            .buffer
            .block(i)
            .ok_or(SnapshotError::NoBackup(content.buffer.category()))?;
        write_back(dev, blockno, bytes)?;
    }
    Ok(content.map.len())
}

fn write_back<D: BlockDevice + ?Sized>(dev: &mut D, blockno: u32, bytes: &[u8]) -> SnapResult<()> {
    let block = Block::from_slice(dev.dev(), blockno, bytes)?;
    dev.write_block(&block)?;
    record_restore_block();
    Ok(())
}
