// src/geometry.rs — superblock → Geometry
//
// Формат superblock (block 1, LE):
// u32 magic        = FSMAGIC
// u32 size         (total blocks in the image)
// u32 nblocks      (data blocks)
// u32 ninodes
// u32 nlog
// u32 logstart
// u32 inodestart
// u32 bmapstart
//
// Geometry is read once per capture and never mutated afterwards.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use serde::Serialize;

use crate::consts::{BPB, BSIZE, DINODE_SIZE, FSMAGIC, SUPERBLOCK_NO, SUPERBLOCK_SIZE};
use crate::device::BlockDevice;
use crate::error::{SnapResult, SnapshotError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub magic: u32,
    pub size: u32,
    pub nblocks: u32,
    pub ninodes: u32,
    pub nlog: u32,
    pub logstart: u32,
    pub inodestart: u32,
    pub bmapstart: u32,
}

impl Geometry {
    /// ceil(ninodes * sizeof(dinode) / BSIZE)
    pub fn inode_blocks(&self) -> u32 {
        ((self.ninodes as usize * DINODE_SIZE + BSIZE - 1) / BSIZE) as u32
    }

    /// ceil(size / BPB)
    pub fn bitmap_blocks(&self) -> u32 {
        ((self.size as usize + BPB - 1) / BPB) as u32
    }

    /// First block after the bitmap.
    pub fn data_start(&self) -> u32 {
        self.bmapstart + self.bitmap_blocks()
    }

    /// Decode the raw superblock bytes (no validation).
    pub fn decode(buf: &[u8]) -> SnapResult<Self> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(SnapshotError::BadSuperblock(format!(
                "buffer too small ({} B)",
                buf.len()
            )));
        }
        let rd = |i: usize| LittleEndian::read_u32(&buf[i * 4..i * 4 + 4]);
        Ok(Self {
            magic: rd(0),
            size: rd(1),
            nblocks: rd(2),
            ninodes: rd(3),
            nlog: rd(4),
            logstart: rd(5),
            inodestart: rd(6),
            bmapstart: rd(7),
        })
    }

    /// Encode into the first SUPERBLOCK_SIZE bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        let fields = [
            self.magic,
            self.size,
            self.nblocks,
            self.ninodes,
            self.nlog,
            self.logstart,
            self.inodestart,
            self.bmapstart,
        ];
        for (i, v) in fields.iter().enumerate() {
            LittleEndian::write_u32(&mut buf[i * 4..i * 4 + 4], *v);
        }
    }

    /// Magic and region bounds must be consistent with `size` and the device.
    pub fn validate(&self, device_blocks: u32) -> SnapResult<()> {
        if self.magic != FSMAGIC {
            return Err(SnapshotError::BadSuperblock(format!(
                "magic {:#010x} != {:#010x}",
                self.magic, FSMAGIC
            )));
        }
        if self.size == 0 || self.size > device_blocks {
            return Err(SnapshotError::BadSuperblock(format!(
                "size {} outside device ({} blocks)",
                self.size, device_blocks
            )));
        }
        let regions = [
            ("log", self.logstart, self.nlog),
            ("inodes", self.inodestart, self.inode_blocks()),
            ("bitmap", self.bmapstart, self.bitmap_blocks()),
        ];
        for (name, start, len) in regions {
            let end = start as u64 + len as u64;
            if start <= SUPERBLOCK_NO || end > self.size as u64 {
                return Err(SnapshotError::BadSuperblock(format!(
                    "{} region [{}, {}) outside [2, {})",
                    name, start, end, self.size
                )));
            }
        }
        Ok(())
    }
}

/// Read, decode and validate the superblock. The block is released right away.
pub fn read_geometry<D: BlockDevice + ?Sized>(dev: &mut D) -> SnapResult<Geometry> {
    let b = dev.read_block(SUPERBLOCK_NO)?;
    let decoded = Geometry::decode(&b.data[..]);
    dev.release_block(b);
    let g = decoded?;
    g.validate(dev.block_count())?;
    debug!(
        "geometry: size={} ninodes={} inodestart={} ({} blk) bmapstart={} ({} blk)",
        g.size,
        g.ninodes,
        g.inodestart,
        g.inode_blocks(),
        g.bmapstart,
        g.bitmap_blocks()
    );
    Ok(g)
}
