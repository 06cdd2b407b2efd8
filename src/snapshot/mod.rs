//! Snapshot lifecycle, split into submodules:
//! - manager.rs: SnapshotStore (single slot, capture/restore/info/verify, exclusion).
//! - summary.rs: SnapshotSummary / RestoreStats / VerifyReport projections.
//!
//! Cache invalidation hook: upstream layers that keep an in-memory view of
//! inodes or directories register an InvalidationHook; it runs once after
//! every successful restore.

mod manager;
mod summary;

pub use manager::{SlotState, SnapshotStore};
pub use summary::{BlockMismatch, CategorySummary, RestoreStats, SnapshotSummary, VerifyReport};

use crate::geometry::Geometry;

/// Upstream cache invalidation (called after a successful restore).
pub trait InvalidationHook: Send + Sync {
    fn invalidate(&self, geometry: &Geometry);
}

impl<F> InvalidationHook for F
where
    F: Fn(&Geometry) + Send + Sync,
{
    fn invalidate(&self, geometry: &Geometry) {
        self(geometry)
    }
}
