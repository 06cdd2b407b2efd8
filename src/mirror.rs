//! mirror — простой вариант снапшота: сырая копия первых N блоков.
//!
//! Layout: blocks [0, N) are copied block-for-block into [start, start + N)
//! with no header. Restore copies them back. The reserved range lives on the
//! same device, so the snapshot survives process restarts. A region counts as
//! captured when its copy of the superblock carries FSMAGIC; restore refuses
//! anything else with NoValidSnapshot before writing.
//!
//! Checks before any I/O:
//! - N > SUPERBLOCK_NO (the mirror covers the superblock);
//! - start >= N (source and mirror do not overlap);
//! - start + N <= device block count.

use log::{info, warn};

use crate::consts::{FSMAGIC, SUPERBLOCK_NO};
use crate::device::{Block, BlockDevice};
use crate::error::{SnapResult, SnapshotError};
use crate::geometry::Geometry;
use crate::metrics::record_mirror_blocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorRegion {
    pub start: u32,
    pub blocks: u32,
}

impl MirrorRegion {
    pub fn new(start: u32, blocks: u32) -> Self {
        Self { start, blocks }
    }

    pub fn validate(&self, device_blocks: u32) -> SnapResult<()> {
        if self.blocks <= SUPERBLOCK_NO {
            return Err(SnapshotError::MirrorRange(format!(
                "{} block(s) do not cover the superblock",
                self.blocks
            )));
        }
        if self.start < self.blocks {
            return Err(SnapshotError::MirrorRange(format!(
                "mirror [{}, {}) overlaps source [0, {})",
                self.start,
                self.start as u64 + self.blocks as u64,
                self.blocks
            )));
        }
        let end = self.start as u64 + self.blocks as u64;
        if end > device_blocks as u64 {
            return Err(SnapshotError::MirrorRange(format!(
                "mirror end {} past device ({} blocks)",
                end, device_blocks
            )));
        }
        Ok(())
    }
}

/// Copy [0, N) → [start, start + N).
pub fn mirror_capture<D: BlockDevice + ?Sized>(dev: &mut D, region: MirrorRegion) -> SnapResult<u32> {
    region.validate(dev.block_count())?;
    copy_blocks(dev, 0, region.start, region.blocks)?;
    dev.flush()?;
    info!(
        "mirror: captured {} block(s) into [{}, {})",
        region.blocks,
        region.start,
        region.start + region.blocks
    );
    Ok(region.blocks)
}

/// Copy [start, start + N) → [0, N), then drop cached interpretations.
pub fn mirror_restore<D: BlockDevice + ?Sized>(dev: &mut D, region: MirrorRegion) -> SnapResult<u32> {
    region.validate(dev.block_count())?;
    ensure_captured(dev, region)?;
    copy_blocks(dev, region.start, 0, region.blocks)?;
    dev.flush()?;
    dev.invalidate_cache();
    info!(
        "mirror: restored {} block(s) from [{}, {})",
        region.blocks,
        region.start,
        region.start + region.blocks
    );
    Ok(region.blocks)
}

fn ensure_captured<D: BlockDevice + ?Sized>(dev: &mut D, region: MirrorRegion) -> SnapResult<()> {
    let b = dev.read_block(region.start + SUPERBLOCK_NO)?;
    let decoded = Geometry::decode(&b.data[..]);
    dev.release_block(b);
    let magic = decoded?.magic;
    if magic != FSMAGIC {
        warn!(
            "mirror: no snapshot in [{}, {}) (superblock magic {:#010x})",
            region.start,
            region.start + region.blocks,
            magic
        );
        return Err(SnapshotError::NoValidSnapshot);
    }
    Ok(())
}

fn copy_blocks<D: BlockDevice + ?Sized>(dev: &mut D, from: u32, to: u32, n: u32) -> SnapResult<()> {
    for i in 0..n {
        let src = dev.read_block(from + i)?;
        let dst = Block {
            dev: src.dev,
            blockno: to + i,
            data: src.data.clone(),
        };
        dev.write_block(&dst)?;
        dev.release_block(src);
    }
    record_mirror_blocks(n as u64);
    Ok(())
}
