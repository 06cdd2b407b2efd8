//! Free-block bitmap backup/restore: `bitmap_blocks()` consecutive blocks from
//! `bmapstart`, written back in block order.

use log::{debug, info};

use crate::alloc::RegionAllocator;
use crate::config::CapacityPolicy;
use crate::device::BlockDevice;
use crate::error::{Category, SnapResult, SnapshotError};
use crate::geometry::Geometry;

use super::{capture_range, restore_range, BackupBuffer};

pub fn capture_bitmap<D: BlockDevice + ?Sized>(
    dev: &mut D,
    geometry: &Geometry,
    alloc: &dyn RegionAllocator,
    policy: CapacityPolicy,
) -> SnapResult<BackupBuffer> {
    let need = geometry.bitmap_blocks();
    let mut buf = BackupBuffer::allocate(alloc, Category::Bitmap, policy)?
        .with_origin(geometry.bmapstart);
    capture_range(dev, &mut buf, geometry.bmapstart, need, policy)?;
    info!(
        "capture bitmap: {} of {} block(s) from {}, truncated={}",
        buf.blocks(),
        need,
        geometry.bmapstart,
        buf.truncated()
    );
    Ok(buf)
}

pub fn restore_bitmap<D: BlockDevice + ?Sized>(
    dev: &mut D,
    buf: Option<&BackupBuffer>,
) -> SnapResult<usize> {
    let buf = buf.ok_or(SnapshotError::NoBackup(Category::Bitmap))?;
    let n = restore_range(dev, buf)?;
    debug!("restore bitmap: {} block(s)", n);
    Ok(n)
}
