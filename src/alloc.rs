//! alloc — region allocator for backup buffers.
//!
//! Каждая категория бэкапа (inodes/dirs/files/bitmap) получает ровно один Region.
//!
//! - Region owns its bytes and a lease on the allocator; dropping the Region
//!   releases the allocation (no manual free on failure paths).
//! - `limit = Some(n)` → the region never grows past n bytes (bounded buffer);
//!   `limit = None` → growable.
//! - PageAllocator counts outstanding regions and can be told to fail the
//!   N-th allocation or to cap concurrent regions (tests, constrained setups).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Page/region allocator seam.
pub trait RegionAllocator: Send + Sync {
    /// Obtain a region; None when the allocator is exhausted.
    fn allocate(&self, limit: Option<usize>) -> Option<Region>;

    /// Regions handed out and not yet dropped.
    fn outstanding(&self) -> usize;
}

/// Shared counter decremented when a Region drops.
#[derive(Debug)]
struct Lease {
    counter: Arc<AtomicUsize>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An owned byte region obtained from a RegionAllocator.
#[derive(Debug)]
pub struct Region {
    bytes: Vec<u8>,
    limit: Option<usize>,
    _lease: Lease,
}

impl Region {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Bytes still available before the limit (usize::MAX when growable).
    pub fn remaining(&self) -> usize {
        match self.limit {
            Some(l) => l.saturating_sub(self.bytes.len()),
            None => usize::MAX,
        }
    }

    /// Append `data` if it fits entirely. Returns false (and appends nothing) otherwise.
    pub fn try_extend(&mut self, data: &[u8]) -> bool {
        if data.len() > self.remaining() {
            return false;
        }
        self.bytes.extend_from_slice(data);
        true
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

/// Default allocator: heap-backed, with accounting and fault injection.
#[derive(Debug)]
pub struct PageAllocator {
    outstanding: Arc<AtomicUsize>,
    issued: AtomicU64,
    fail_nth: AtomicU64,      // 0 = never; otherwise the N-th call (1-based) fails
    max_outstanding: AtomicUsize, // 0 = unlimited
}

impl Default for PageAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAllocator {
    pub fn new() -> Self {
        Self {
            outstanding: Arc::new(AtomicUsize::new(0)),
            issued: AtomicU64::new(0),
            fail_nth: AtomicU64::new(0),
            max_outstanding: AtomicUsize::new(0),
        }
    }

    /// Make the n-th allocation from now on fail (1 = the next one).
    pub fn fail_nth_from_now(&self, n: u64) {
        let base = self.issued.load(Ordering::Acquire);
        self.fail_nth.store(base + n, Ordering::Release);
    }

    /// Refuse allocations while `n` regions are outstanding (0 = unlimited).
    pub fn set_max_outstanding(&self, n: usize) {
        self.max_outstanding.store(n, Ordering::Release);
    }

    /// Total allocate() calls so far (failed ones included).
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Acquire)
    }
}

impl RegionAllocator for PageAllocator {
    fn allocate(&self, limit: Option<usize>) -> Option<Region> {
        let call = self.issued.fetch_add(1, Ordering::AcqRel) + 1;
        let fail_at = self.fail_nth.load(Ordering::Acquire);
        if fail_at != 0 && call == fail_at {
            self.fail_nth.store(0, Ordering::Release);
            return None;
        }
        let max = self.max_outstanding.load(Ordering::Acquire);
        if max != 0 && self.outstanding.load(Ordering::Acquire) >= max {
            return None;
        }

        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Some(Region {
            bytes: Vec::new(),
            limit,
            _lease: Lease {
                counter: Arc::clone(&self.outstanding),
            },
        })
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_releases_region() {
        let a = PageAllocator::new();
        let r1 = a.allocate(Some(16)).unwrap();
        let r2 = a.allocate(None).unwrap();
        assert_eq!(a.outstanding(), 2);
        drop(r1);
        assert_eq!(a.outstanding(), 1);
        drop(r2);
        assert_eq!(a.outstanding(), 0);
    }

    #[test]
    fn nth_allocation_fails_once() {
        let a = PageAllocator::new();
        a.fail_nth_from_now(2);
        let first = a.allocate(None);
        assert!(first.is_some());
        assert!(a.allocate(None).is_none());
        assert!(a.allocate(None).is_some());
        assert_eq!(a.issued(), 3);
    }

    #[test]
    fn bounded_region_refuses_overflow() {
        let a = PageAllocator::new();
        let mut r = a.allocate(Some(4)).unwrap();
        assert!(r.try_extend(&[1, 2, 3]));
        assert!(!r.try_extend(&[4, 5]));
        assert_eq!(r.as_slice(), &[1, 2, 3]);
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn limit_is_a_ceiling_not_a_reservation() {
        let a = PageAllocator::new();
        let mut r = a.allocate(Some(usize::MAX)).unwrap();
        assert!(r.is_empty());
        assert_eq!(r.remaining(), usize::MAX);
        assert!(r.try_extend(&[9; 8]));
        assert_eq!(r.len(), 8);
    }

    #[test]
    fn max_outstanding_caps_live_regions() {
        let a = PageAllocator::new();
        a.set_max_outstanding(1);
        let r = a.allocate(None).unwrap();
        assert!(a.allocate(None).is_none());
        drop(r);
        assert!(a.allocate(None).is_some());
    }
}
