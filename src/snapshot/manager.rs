//! SnapshotStore: owner of the single snapshot slot.
//!
//! States:
//! - Empty: initial, after a failed capture, after clear().
//! - Valid: after a fully successful capture; owns all four buffers and maps.
//!
//! Capture order: geometry → inodes → directories → files → bitmap.
//! Restore order: bitmap → inodes → directories → files → invalidate caches.
//!
//! Exclusion:
//! - `slot` mutex is held for the whole capture/restore/verify call, so these
//!   operations serialize against each other;
//! - the device is borrowed `&mut` for the call, so no other code can mutate it
//!   through the same handle meanwhile;
//! - FileDevice additionally holds an exclusive lock on <image>.lock.
//! What is NOT covered: a second handle to the same storage opened without the
//! lock (e.g. MemDevice clones, raw file writers). Capture then sees a torn
//! state and restore may be overwritten. Quiescence of such writers is the
//! caller's job.

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::alloc::{PageAllocator, RegionAllocator};
use crate::backup::{
    capture_bitmap, capture_directories, capture_files, capture_inodes, restore_bitmap,
    restore_directories, restore_files, restore_inodes, BackupBuffer, ContentBackup,
};
use crate::config::{CapacityPolicy, SnapConfig};
use crate::device::BlockDevice;
use crate::error::{Category, SnapResult, SnapshotError};
use crate::geometry::{read_geometry, Geometry};
use crate::metrics::{record_capture, record_restore, record_rollback};
use crate::util::now_millis;

use super::summary::{
    BlockMismatch, CategorySummary, RestoreStats, SnapshotSummary, VerifyReport,
};
use super::InvalidationHook;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Valid,
}

// Fully captured state. Only ever stored whole.
struct Snapshot {
    label: String,
    created_unix_ms: u64,
    geometry: Geometry,
    inodes: BackupBuffer,
    directories: ContentBackup,
    files: ContentBackup,
    bitmap: BackupBuffer,
}

enum Slot {
    Empty,
    Valid(Box<Snapshot>),
}

pub struct SnapshotStore {
    alloc: Arc<dyn RegionAllocator>,
    policy: CapacityPolicy,
    data_fsync: bool,
    hooks: Vec<Arc<dyn InvalidationHook>>,
    slot: Mutex<Slot>,
}

impl SnapshotStore {
    /// Store with a private PageAllocator.
    pub fn new(cfg: &SnapConfig) -> Self {
        Self::with_allocator(cfg, Arc::new(PageAllocator::new()))
    }

    pub fn with_allocator(cfg: &SnapConfig, alloc: Arc<dyn RegionAllocator>) -> Self {
        Self {
            alloc,
            policy: cfg.capacity_policy(),
            data_fsync: cfg.data_fsync,
            hooks: Vec::new(),
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Register an upstream cache invalidation hook.
    pub fn add_invalidation_hook(&mut self, hook: Arc<dyn InvalidationHook>) {
        self.hooks.push(hook);
    }

    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    pub fn allocator(&self) -> &Arc<dyn RegionAllocator> {
        &self.alloc
    }

    pub fn state(&self) -> SlotState {
        match &*self.lock_slot() {
            Slot::Empty => SlotState::Empty,
            Slot::Valid(_) => SlotState::Valid,
        }
    }

    /// Capture the live filesystem into the slot, replacing any previous snapshot.
    ///
    /// On failure every buffer of this attempt is released (they drop with the
    /// partially built locals) and the slot stays Empty.
    pub fn capture<D: BlockDevice + ?Sized>(
        &self,
        dev: &mut D,
        label: &str,
    ) -> SnapResult<SnapshotSummary> {
        let mut slot = self.lock_slot();

        if let Slot::Valid(old) = std::mem::replace(&mut *slot, Slot::Empty) {
            info!("capture: releasing previous snapshot '{}'", old.label);
            drop(old);
        }

        info!(
            "capture: start label='{}' policy={:?} outstanding={}",
            label,
            self.policy,
            self.alloc.outstanding()
        );

        match self.capture_all(dev, label) {
            Ok(snap) => {
                let summary = summarize(&snap);
                *slot = Slot::Valid(Box::new(snap));
                record_capture(true);
                info!(
                    "capture: done label='{}' blocks={} truncated={:?}",
                    summary.label,
                    summary.total_blocks(),
                    summary.truncated()
                );
                Ok(summary)
            }
            Err(e) => {
                record_capture(false);
                record_rollback();
                warn!(
                    "capture: failed ({}), rolled back, outstanding={}",
                    e,
                    self.alloc.outstanding()
                );
                Err(e)
            }
        }
    }

    fn capture_all<D: BlockDevice + ?Sized>(
        &self,
        dev: &mut D,
        label: &str,
    ) -> SnapResult<Snapshot> {
        let alloc = self.alloc.as_ref();
        let policy = self.policy;

        let geometry = read_geometry(dev)?;
        let inodes = capture_inodes(dev, &geometry, alloc, policy)?;
        let directories = capture_directories(dev, &geometry, &inodes, alloc, policy)?;
        let files = capture_files(dev, &geometry, &inodes, alloc, policy)?;
        let bitmap = capture_bitmap(dev, &geometry, alloc, policy)?;

        Ok(Snapshot {
            label: label.to_string(),
            created_unix_ms: now_millis(),
            geometry,
            inodes,
            directories,
            files,
            bitmap,
        })
    }

    /// Overwrite the live filesystem with the captured state.
    ///
    /// The first failing phase aborts the rest; the snapshot stays Valid and can
    /// be restored again.
    pub fn restore<D: BlockDevice + ?Sized>(&self, dev: &mut D) -> SnapResult<RestoreStats> {
        let slot = self.lock_slot();
        let snap = match &*slot {
            Slot::Valid(s) => s,
            Slot::Empty => {
                record_restore(false);
                return Err(SnapshotError::NoValidSnapshot);
            }
        };

        info!("restore: start label='{}'", snap.label);
        let res = restore_all(dev, snap);
        let stats = match res {
            Ok(s) => s,
            Err(e) => {
                record_restore(false);
                warn!("restore: aborted ({})", e);
                return Err(e);
            }
        };

        if self.data_fsync {
            dev.flush()?;
        }

        dev.invalidate_cache();
        for hook in &self.hooks {
            hook.invalidate(&snap.geometry);
        }

        record_restore(true);
        info!(
            "restore: done label='{}' blocks={} (bitmap={}, inodes={}, dirs={}, files={})",
            snap.label,
            stats.total(),
            stats.bitmap,
            stats.inodes,
            stats.directories,
            stats.files
        );
        Ok(stats)
    }

    /// Read-only projection for diagnostics.
    pub fn info(&self) -> Option<SnapshotSummary> {
        match &*self.lock_slot() {
            Slot::Valid(s) => Some(summarize(s)),
            Slot::Empty => None,
        }
    }

    /// Compare every recorded block with the live device.
    pub fn verify<D: BlockDevice + ?Sized>(&self, dev: &mut D) -> SnapResult<VerifyReport> {
        let slot = self.lock_slot();
        let snap = match &*slot {
            Slot::Valid(s) => s,
            Slot::Empty => return Err(SnapshotError::NoValidSnapshot),
        };

        let mut report = VerifyReport::default();
        let mut check = |dev: &mut D, c: Category, blockno: u32, want: &[u8]| -> SnapResult<()> {
            let b = dev.read_block(blockno)?;
            if &b.data[..] != want {
                report.mismatches.push(BlockMismatch {
                    category: c,
                    blockno,
                });
            }
            report.blocks_checked += 1;
            dev.release_block(b);
            Ok(())
        };

        for buf in [&snap.bitmap, &snap.inodes] {
            if let Some(origin) = buf.origin() {
                for i in 0..buf.blocks() {
                    if let Some(want) = buf.block(i) {
                        check(&mut *dev, buf.category(), origin + i as u32, want)?;
                    }
                }
            }
        }
        for content in [&snap.directories, &snap.files] {
            for (i, &blockno) in content.map.as_slice().iter().enumerate() {
                if let Some(want) = content.buffer.block(i) {
                    check(&mut *dev, content.buffer.category(), blockno, want)?;
                }
            }
        }

        debug!(
            "verify: checked={} mismatches={}",
            report.blocks_checked,
            report.mismatches.len()
        );
        Ok(report)
    }

    /// Release the snapshot. Returns true if one was present.
    pub fn clear(&self) -> bool {
        let mut slot = self.lock_slot();
        match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Valid(s) => {
                info!("snapshot '{}' released", s.label);
                true
            }
            Slot::Empty => false,
        }
    }

    // A panic inside a phase leaves the slot Empty (it is replaced before capture
    // starts), so a poisoned lock still guards a consistent value.
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn restore_all<D: BlockDevice + ?Sized>(dev: &mut D, snap: &Snapshot) -> SnapResult<RestoreStats> {
    Ok(RestoreStats {
        bitmap: restore_bitmap(dev, Some(&snap.bitmap))?,
        inodes: restore_inodes(dev, Some(&snap.inodes))?,
        directories: restore_directories(dev, Some(&snap.directories))?,
        files: restore_files(dev, Some(&snap.files))?,
    })
}

fn summarize(s: &Snapshot) -> SnapshotSummary {
    let range = |b: &BackupBuffer| CategorySummary {
        category: b.category(),
        blocks: b.blocks(),
        bytes: b.bytes(),
        map_len: None,
        origin: b.origin(),
        capacity: b.limit(),
        truncated: b.truncated(),
        crc32: b.crc32(),
    };
    let mapped = |c: &ContentBackup| CategorySummary {
        map_len: Some(c.map.len()),
        ..range(&c.buffer)
    };
    SnapshotSummary {
        label: s.label.clone(),
        created_unix_ms: s.created_unix_ms,
        geometry: s.geometry,
        categories: vec![
            range(&s.inodes),
            mapped(&s.directories),
            mapped(&s.files),
            range(&s.bitmap),
        ],
    }
}
