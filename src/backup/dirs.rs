//! Directory content backup/restore.
//!
//! Walk: every inode decoded from the captured inode table; for directories
//! with size > 0 follow direct slots up to the first zero. Indirect blocks of
//! directories are not followed (directories never grow past the direct
//! slots on this filesystem).
//!
//! The walk stops entirely when the buffer is full; the buffer then carries the
//! truncation flag (or the strict policy fails the phase).

use log::{debug, info, warn};

use crate::alloc::RegionAllocator;
use crate::config::CapacityPolicy;
use crate::device::BlockDevice;
use crate::error::{Category, SnapResult, SnapshotError};
use crate::geometry::Geometry;
use crate::inode::{inodes_in, InodeType};

use super::{restore_mapped, BackupBuffer, ContentBackup};

pub fn capture_directories<D: BlockDevice + ?Sized>(
    dev: &mut D,
    geometry: &Geometry,
    inodes: &BackupBuffer,
    alloc: &dyn RegionAllocator,
    policy: CapacityPolicy,
) -> SnapResult<ContentBackup> {
    let buf = BackupBuffer::allocate(alloc, Category::Directories, policy)?;
    let mut out = ContentBackup::new(buf);
    let mut dirs_seen = 0u32;

    'walk: for (inum, ino) in inodes_in(inodes.as_bytes()) {
        if !ino.is_live() || ino.kind != InodeType::Dir {
            continue;
        }
        dirs_seen += 1;
        for addr in ino.direct_blocks() {
            if addr >= geometry.size {
                warn!(
                    "capture directories: inode {} points outside fs (block {}), skipped",
                    inum, addr
                );
                continue;
            }
            if !out.add_block(dev, addr, policy)? {
                break 'walk;
            }
        }
        debug!("capture directories: inode {} done, map={}", inum, out.map.len());
    }

    info!(
        "capture directories: {} dir inode(s), {} block(s), truncated={}",
        dirs_seen,
        out.blocks(),
        out.buffer.truncated()
    );
    Ok(out)
}

/// Write buffer block i back to map[i], for i in 0..map.len().
pub fn restore_directories<D: BlockDevice + ?Sized>(
    dev: &mut D,
    content: Option<&ContentBackup>,
) -> SnapResult<usize> {
    let content = content.ok_or(SnapshotError::NoBackup(Category::Directories))?;
    let n = restore_mapped(dev, content)?;
    debug!("restore directories: {} block(s)", n);
    Ok(n)
}
