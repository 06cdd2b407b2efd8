//! Typed errors of the engine.
//!
//! - DeviceError: block store failures (I/O, out of range, injected faults).
//! - SnapshotError: everything the phases and the lifecycle manager can report.
//!
//! Truncation at a bounded capacity is not an error: it is recorded per
//! category in `SnapshotSummary`. Only the strict capacity policy turns it into
//! `CapacityExceeded`.

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

/// Backup category (one buffer each).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Inodes,
    Directories,
    Files,
    Bitmap,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Inodes => "inodes",
            Category::Directories => "directories",
            Category::Files => "files",
            Category::Bitmap => "bitmap",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the block store.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("I/O error on block {blockno}: {source}")]
    Io {
        blockno: u32,
        #[source]
        source: io::Error,
    },

    #[error("block {blockno} out of range (device has {count} blocks)")]
    OutOfRange { blockno: u32, count: u32 },

    #[error("injected fault on block {0}")]
    Injected(u32),

    #[error("device error: {0}")]
    Other(String),
}

/// Errors of capture/restore and of the lifecycle manager.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("device failure: {0}")]
    Device(#[from] DeviceError),

    #[error("allocation failure for {category} buffer")]
    AllocationFailure { category: Category },

    #[error("no backup present for {0}")]
    NoBackup(Category),

    #[error("no valid snapshot")]
    NoValidSnapshot,

    #[error("{category} content needs more than {capacity} bytes")]
    CapacityExceeded { category: Category, capacity: usize },

    #[error("bad superblock: {0}")]
    BadSuperblock(String),

    #[error("mirror range invalid: {0}")]
    MirrorRange(String),
}

impl SnapshotError {
    /// True for failures that came from the allocator (used by rollback logging).
    pub fn is_allocation(&self) -> bool {
        matches!(self, SnapshotError::AllocationFailure { .. })
    }
}

pub type SnapResult<T> = std::result::Result<T, SnapshotError>;
