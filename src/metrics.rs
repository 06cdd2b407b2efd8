//! Lightweight global metrics for fssnap.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Capture / Restore (phased engine)
//! - Rollbacks and capacity truncations
//! - Raw mirror
//! - Block cache

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Capture / Restore -----
static CAPTURES_OK: AtomicU64 = AtomicU64::new(0);
static CAPTURES_FAILED: AtomicU64 = AtomicU64::new(0);
static CAPTURE_BLOCKS: AtomicU64 = AtomicU64::new(0);
static RESTORES_OK: AtomicU64 = AtomicU64::new(0);
static RESTORES_FAILED: AtomicU64 = AtomicU64::new(0);
static RESTORE_BLOCKS: AtomicU64 = AtomicU64::new(0);

// ----- Rollback / truncation -----
static ROLLBACKS: AtomicU64 = AtomicU64::new(0);
static TRUNCATIONS: AtomicU64 = AtomicU64::new(0);

// ----- Raw mirror -----
static MIRROR_BLOCKS_COPIED: AtomicU64 = AtomicU64::new(0);

// ----- Block cache -----
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static CACHE_MISSES: AtomicU64 = AtomicU64::new(0);
static CACHE_INVALIDATIONS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub captures_ok: u64,
    pub captures_failed: u64,
    pub capture_blocks: u64,
    pub restores_ok: u64,
    pub restores_failed: u64,
    pub restore_blocks: u64,

    pub rollbacks: u64,
    pub truncations: u64,

    pub mirror_blocks_copied: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_invalidations: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

// ----- Recorders (Capture / Restore) -----
pub fn record_capture(ok: bool) {
    if ok {
        CAPTURES_OK.fetch_add(1, Ordering::Relaxed);
    } else {
        CAPTURES_FAILED.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_capture_block() {
    CAPTURE_BLOCKS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_restore(ok: bool) {
    if ok {
        RESTORES_OK.fetch_add(1, Ordering::Relaxed);
    } else {
        RESTORES_FAILED.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_restore_block() {
    RESTORE_BLOCKS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Rollback / truncation) -----
pub fn record_rollback() {
    ROLLBACKS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_truncation() {
    TRUNCATIONS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Raw mirror) -----
pub fn record_mirror_blocks(n: u64) {
    MIRROR_BLOCKS_COPIED.fetch_add(n, Ordering::Relaxed);
}

// ----- Recorders (Block cache) -----
pub fn record_cache_hit() {
    CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_cache_miss() {
    CACHE_MISSES.fetch_add(1, Ordering::Relaxed);
}
pub fn record_cache_invalidation() {
    CACHE_INVALIDATIONS.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        captures_ok: CAPTURES_OK.load(Ordering::Relaxed),
        captures_failed: CAPTURES_FAILED.load(Ordering::Relaxed),
        capture_blocks: CAPTURE_BLOCKS.load(Ordering::Relaxed),
        restores_ok: RESTORES_OK.load(Ordering::Relaxed),
        restores_failed: RESTORES_FAILED.load(Ordering::Relaxed),
        restore_blocks: RESTORE_BLOCKS.load(Ordering::Relaxed),

        rollbacks: ROLLBACKS.load(Ordering::Relaxed),
        truncations: TRUNCATIONS.load(Ordering::Relaxed),

        mirror_blocks_copied: MIRROR_BLOCKS_COPIED.load(Ordering::Relaxed),

        cache_hits: CACHE_HITS.load(Ordering::Relaxed),
        cache_misses: CACHE_MISSES.load(Ordering::Relaxed),
        cache_invalidations: CACHE_INVALIDATIONS.load(Ordering::Relaxed),
    }
}

