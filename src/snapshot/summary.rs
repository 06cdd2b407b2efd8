//! Read-only projections of the snapshot slot: SnapshotSummary (info) and
//! VerifyReport (live disk vs. captured content).

use serde::Serialize;

use crate::error::Category;
use crate::geometry::Geometry;

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub blocks: usize,
    pub bytes: usize,
    /// Address map length (directories/files only).
    pub map_len: Option<usize>,
    /// Source block range start (inodes/bitmap only).
    pub origin: Option<u32>,
    pub capacity: Option<usize>,
    pub truncated: bool,
    pub crc32: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub label: String,
    pub created_unix_ms: u64,
    pub geometry: Geometry,
    pub categories: Vec<CategorySummary>,
}

impl SnapshotSummary {
    pub fn category(&self, c: Category) -> Option<&CategorySummary> {
        self.categories.iter().find(|s| s.category == c)
    }

    /// Categories whose content exceeded capacity.
    pub fn truncated(&self) -> Vec<Category> {
        self.categories
            .iter()
            .filter(|s| s.truncated)
            .map(|s| s.category)
            .collect()
    }

    /// A snapshot without truncated categories restores the full captured state.
    pub fn is_complete(&self) -> bool {
        self.categories.iter().all(|s| !s.truncated)
    }

    pub fn total_blocks(&self) -> usize {
        self.categories.iter().map(|s| s.blocks).sum()
    }
}

/// Counts of blocks written by a restore, per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreStats {
    pub bitmap: usize,
    pub inodes: usize,
    pub directories: usize,
    pub files: usize,
}

impl RestoreStats {
    pub fn total(&self) -> usize {
        self.bitmap + self.inodes + self.directories + self.files
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockMismatch {
    pub category: Category,
    pub blockno: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub blocks_checked: usize,
    pub mismatches: Vec<BlockMismatch>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn mismatches_in(&self, c: Category) -> usize {
        self.mismatches.iter().filter(|m| m.category == c).count()
    }
}
