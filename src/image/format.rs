//! image/format — mkfs для минимального образа.
//!
//! Layout produced:
//!   0            boot block (zeros)
//!   1            superblock
//!   2 ..         log (nlog blocks, zeros)
//!   inodestart   inode table (ceil(ninodes*64/BSIZE) blocks)
//!   bmapstart    bitmap (ceil(size/BPB) blocks)
//!   data_start   data blocks; the first one is the root directory ("." and "..")
//!
//! Blocks [0, data_start) are marked in use in the bitmap, plus the optional
//! reserved range (raw mirror region) when it falls inside the filesystem.

use anyhow::{anyhow, Result};
use log::info;

use crate::consts::{BSIZE, FSMAGIC, ROOTINO, SUPERBLOCK_NO};
use crate::device::{Block, BlockDevice};
use crate::geometry::Geometry;
use crate::inode::{DiskInode, InodeType};

use super::ops::{balloc, bitmap_set, put_dirent, write_inode};

#[derive(Debug, Clone, Copy)]
pub struct MkfsParams {
    pub size: u32,
    pub ninodes: u32,
    pub nlog: u32,
    /// (start, count) kept out of the allocator.
    pub reserved: Option<(u32, u32)>,
}

impl Default for MkfsParams {
    fn default() -> Self {
        Self {
            size: crate::consts::DEFAULT_FSSIZE,
            ninodes: crate::consts::DEFAULT_NINODES,
            nlog: crate::consts::DEFAULT_NLOG,
            reserved: None,
        }
    }
}

impl MkfsParams {
    pub fn geometry(&self) -> Geometry {
        let mut g = Geometry {
            magic: FSMAGIC,
            size: self.size,
            nblocks: 0,
            ninodes: self.ninodes,
            nlog: self.nlog,
            logstart: SUPERBLOCK_NO + 1,
            inodestart: SUPERBLOCK_NO + 1 + self.nlog,
            bmapstart: 0,
        };
        g.bmapstart = g.inodestart + g.inode_blocks();
        g.nblocks = self.size.saturating_sub(g.data_start());
        g
    }
}

/// Format `dev` and return the resulting geometry.
pub fn mkfs<D: BlockDevice + ?Sized>(dev: &mut D, params: &MkfsParams) -> Result<Geometry> {
    if params.ninodes < 2 {
        return Err(anyhow!("need at least 2 inodes, got {}", params.ninodes));
    }
    if params.size > dev.block_count() {
        return Err(anyhow!(
            "fs size {} > device size {}",
            params.size,
            dev.block_count()
        ));
    }
    let g = params.geometry();
    if g.data_start() + 1 >= g.size {
        return Err(anyhow!(
            "fs size {} too small for metadata ({} blocks)",
            g.size,
            g.data_start()
        ));
    }

    // Zero the whole filesystem range.
    for b in 0..g.size {
        dev.write_block(&Block::zeroed(dev.dev(), b))?;
    }

    let mut sb = Block::zeroed(dev.dev(), SUPERBLOCK_NO);
    g.encode(&mut sb.data[..]);
    dev.write_block(&sb)?;

    for b in 0..g.data_start() {
        bitmap_set(dev, &g, b, true)?;
    }
    if let Some((start, count)) = params.reserved {
        let end = (start as u64 + count as u64).min(g.size as u64) as u32;
        for b in start.min(end)..end {
            bitmap_set(dev, &g, b, true)?;
        }
    }

    // Root directory.
    let root_block = balloc(dev, &g)?;
    let mut root = DiskInode::empty();
    root.kind = InodeType::Dir;
    root.nlink = 1;
    root.addrs[0] = root_block;
    root.size = BSIZE as u32;
    put_dirent(dev, root_block, 0, ROOTINO, ".")?;
    put_dirent(dev, root_block, 1, ROOTINO, "..")?;
    write_inode(dev, &g, ROOTINO, &root)?;

    dev.flush()?;
    info!(
        "mkfs: size={} ninodes={} nlog={} inodestart={} bmapstart={} data_start={}",
        g.size,
        g.ninodes,
        g.nlog,
        g.inodestart,
        g.bmapstart,
        g.data_start()
    );
    Ok(g)
}
