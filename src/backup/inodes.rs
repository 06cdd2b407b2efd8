//! Inode table backup/restore.
//!
//! Capture copies `geometry.inode_blocks()` consecutive blocks starting at
//! `inodestart` into the inode buffer. Restore writes them back block-for-block,
//! in the same order, to the same range.

use log::{debug, info};

use crate::alloc::RegionAllocator;
use crate::config::CapacityPolicy;
use crate::device::BlockDevice;
use crate::error::{Category, SnapResult, SnapshotError};
use crate::geometry::Geometry;

use super::{capture_range, restore_range, BackupBuffer};

pub fn capture_inodes<D: BlockDevice + ?Sized>(
    dev: &mut D,
    geometry: &Geometry,
    alloc: &dyn RegionAllocator,
    policy: CapacityPolicy,
) -> SnapResult<BackupBuffer> {
    let need = geometry.inode_blocks();
    let mut buf = BackupBuffer::allocate(alloc, Category::Inodes, policy)?
        .with_origin(geometry.inodestart);

    debug!(
        "capture inodes: {} block(s) from {}",
        need, geometry.inodestart
    );
    capture_range(dev, &mut buf, geometry.inodestart, need, policy)?;

    info!(
        "capture inodes: {} of {} block(s), truncated={}",
        buf.blocks(),
        need,
        buf.truncated()
    );
    Ok(buf)
}

pub fn restore_inodes<D: BlockDevice + ?Sized>(
    dev: &mut D,
    buf: Option<&BackupBuffer>,
) -> SnapResult<usize> {
    let buf = buf.ok_or(SnapshotError::NoBackup(Category::Inodes))?;
    let n = restore_range(dev, buf)?;
    debug!("restore inodes: {} block(s)", n);
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::PageAllocator;
    use crate::consts::BSIZE;
    use crate::device::{Block, MemDevice};
    use crate::geometry::Geometry;

    fn geo(ninodes: u32) -> Geometry {
        Geometry {
            magic: crate::consts::FSMAGIC,
            size: 64,
            nblocks: 40,
            ninodes,
            nlog: 2,
            logstart: 2,
            inodestart: 4,
            bmapstart: 20,
        }
    }

    fn stamp(dev: &mut MemDevice, blockno: u32, v: u8) {
        let mut b = Block::zeroed(1, blockno);
        b.data.fill(v);
        dev.write_block(&b).unwrap();
    }

    #[test]
    fn captures_exact_range() {
        let mut dev = MemDevice::new(64);
        for i in 0..3 {
            stamp(&mut dev, 4 + i, 0x10 + i as u8);
        }
        let alloc = PageAllocator::new();
        // 40 inodes -> 3 blocks
        let buf = capture_inodes(&mut dev, &geo(40), &alloc, CapacityPolicy::Unbounded).unwrap();
        assert_eq!(buf.blocks(), 3);
        assert_eq!(buf.origin(), Some(4));
        assert_eq!(buf.block(2).unwrap()[0], 0x12);
        assert!(!buf.truncated());
    }

    #[test]
    fn truncates_at_capacity() {
        let mut dev = MemDevice::new(64);
        let alloc = PageAllocator::new();
        let policy = CapacityPolicy::Truncate { bytes: 2 * BSIZE };
        let buf = capture_inodes(&mut dev, &geo(64), &alloc, policy).unwrap();
        assert_eq!(buf.blocks(), 2);
        assert!(buf.truncated());
    }

    #[test]
    fn strict_policy_errors() {
        let mut dev = MemDevice::new(64);
        let alloc = PageAllocator::new();
        let policy = CapacityPolicy::Strict { bytes: BSIZE };
        let err = capture_inodes(&mut dev, &geo(64), &alloc, policy).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::CapacityExceeded { category: Category::Inodes, .. }
        ));
    }

    #[test]
    fn restore_without_backup() {
        let mut dev = MemDevice::new(8);
        assert!(matches!(
            restore_inodes(&mut dev, None),
            Err(SnapshotError::NoBackup(Category::Inodes))
        ));
    }

    #[test]
    fn restore_writes_back_in_place() {
        let mut dev = MemDevice::new(64);
        stamp(&mut dev, 4, 0xAA);
        let alloc = PageAllocator::new();
        let buf = capture_inodes(&mut dev, &geo(16), &alloc, CapacityPolicy::Unbounded).unwrap();
        stamp(&mut dev, 4, 0x00);
        assert_eq!(restore_inodes(&mut dev, Some(&buf)).unwrap(), 1);
        assert_eq!(dev.raw(4).unwrap()[100], 0xAA);
    }
}
