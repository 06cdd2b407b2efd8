//! File content backup/restore.
//!
//! Walk (same inode pass as directories, regular files with size > 0):
//! 1) direct slots up to the first zero;
//! 2) if addrs[NDIRECT] != 0 and the buffer still has room: read the indirect
//!    block itself (not saved, not mapped) and follow every nonzero entry among
//!    its NINDIRECT slots.
//!
//! Any "buffer full" stops the whole walk, same as for directories.

use log::{debug, info, warn};

use crate::alloc::RegionAllocator;
use crate::config::CapacityPolicy;
use crate::device::BlockDevice;
use crate::error::{Category, SnapResult, SnapshotError};
use crate::geometry::Geometry;
use crate::inode::{indirect_entries, inodes_in, DiskInode, InodeType};

use super::{restore_mapped, BackupBuffer, ContentBackup};

pub fn capture_files<D: BlockDevice + ?Sized>(
    dev: &mut D,
    geometry: &Geometry,
    inodes: &BackupBuffer,
    alloc: &dyn RegionAllocator,
    policy: CapacityPolicy,
) -> SnapResult<ContentBackup> {
    let buf = BackupBuffer::allocate(alloc, Category::Files, policy)?;
    let mut out = ContentBackup::new(buf);
    let mut files_seen = 0u32;

    for (inum, ino) in inodes_in(inodes.as_bytes()) {
        if !ino.is_live() || ino.kind != InodeType::File {
            continue;
        }
        files_seen += 1;
        if !capture_one_file(dev, geometry, inum, &ino, &mut out, policy)? {
            break;
        }
    }

    info!(
        "capture files: {} file inode(s), {} block(s), truncated={}",
        files_seen,
        out.blocks(),
        out.buffer.truncated()
    );
    Ok(out)
}

/// Returns Ok(false) once the buffer is full.
fn capture_one_file<D: BlockDevice + ?Sized>(
    dev: &mut D,
    geometry: &Geometry,
    inum: u32,
    ino: &DiskInode,
    out: &mut ContentBackup,
    policy: CapacityPolicy,
) -> SnapResult<bool> {
    // 1) direct
    for addr in ino.direct_blocks() {
        if !in_fs(geometry, inum, addr) {
            continue;
        }
        if !out.add_block(dev, addr, policy)? {
            return Ok(false);
        }
    }

    // 2) single indirect
    let ind = match ino.indirect() {
        Some(a) => a,
        None => return Ok(true),
    };
    if !in_fs(geometry, inum, ind) {
        return Ok(true);
    }
    if !out.buffer.has_room() {
        out.buffer.mark_full(policy)?;
        return Ok(false);
    }

    let ind_block = dev.read_block(ind)?;
    let targets: Vec<u32> = indirect_entries(&ind_block.data)
        .filter(|&a| a != 0)
        .collect();
    dev.release_block(ind_block);
    debug!(
        "capture files: inode {} indirect {} -> {} entr(ies)",
        inum,
        ind,
        targets.len()
    );

    for addr in targets {
        if !in_fs(geometry, inum, addr) {
            continue;
        }
        if !out.add_block(dev, addr, policy)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_fs(geometry: &Geometry, inum: u32, addr: u32) -> bool {
    if addr >= geometry.size {
        warn!(
            "capture files: inode {} points outside fs (block {}), skipped",
            inum, addr
        );
        return false;
    }
    true
}

/// Same contract as restore_directories.
pub fn restore_files<D: BlockDevice + ?Sized>(
    dev: &mut D,
    content: Option<&ContentBackup>,
) -> SnapResult<usize> {
    let content = content.ok_or(SnapshotError::NoBackup(Category::Files))?;
    let n = restore_mapped(dev, content)?;
    debug!("restore files: {} block(s)", n);
    Ok(n)
}
