//! O(1) LRU buffer cache for blocks + CachedDevice wrapper.
//!
//! Design:
//! - HashMap<blockno, Entry> stores block content and doubly-linked pointers (prev/next by blockno).
//! - head = MRU, tail = LRU.
//! - get() moves the node to head and copies data into `out`.
//! - put() updates existing (move to head) or inserts a new head, evicting tail if over capacity.
//!
//! CachedDevice:
//! - read_block: cache hit → copy; miss → inner read + put.
//! - write_block: write-through (inner write first, then cache update).
//! - invalidate_cache: drops every entry. Called by the snapshot manager after
//!   a restore, since restored blocks may have been cached with pre-restore content
//!   by a reader that bypassed this wrapper.
//! - Capacity=0 disables caching (pure pass-through).

use std::collections::HashMap;

use crate::consts::BSIZE;
use crate::error::DeviceError;
use crate::metrics::{record_cache_hit, record_cache_invalidation, record_cache_miss};

use super::{Block, BlockDevice};

pub(crate) struct BlockCache {
    cap: usize,
    map: HashMap<u32, Entry>,
    head: Option<u32>, // Most-recently used
    tail: Option<u32>, // Least-recently used
}

struct Entry {
    data: Box<[u8; BSIZE]>,
    prev: Option<u32>,
    next: Option<u32>,
}

impl BlockCache {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            map: HashMap::with_capacity(cap.max(1)),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Copy a cached block into `out`; moves entry to MRU. Returns true on hit.
    pub(crate) fn get(&mut self, blockno: u32, out: &mut [u8; BSIZE]) -> bool {
        if self.cap == 0 || !self.map.contains_key(&blockno) {
            return false;
        }
        self.detach(blockno);
        self.attach_front(blockno);
        match self.map.get(&blockno) {
            Some(e) => {
                out.copy_from_slice(&e.data[..]);
                true
            }
            None => false,
        }
    }

    /// Insert/update a block, evicting the LRU entry when full.
    pub(crate) fn put(&mut self, blockno: u32, data: &[u8; BSIZE]) {
        if self.cap == 0 {
            return;
        }

        if let Some(e) = self.map.get_mut(&blockno) {
            e.data.copy_from_slice(data);
            self.detach(blockno);
            self.attach_front(blockno);
            return;
        }

        if self.map.len() >= self.cap {
            if let Some(victim) = self.tail {
                self.detach(victim);
                self.map.remove(&victim);
            }
        }

        self.map.insert(
            blockno,
            Entry {
                data: Box::new(*data),
                prev: None,
                next: None,
            },
        );
        self.attach_front(blockno);
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
        self.head = None;
        self.tail = None;
    }

    // ---------------- internal helpers ----------------

    fn detach(&mut self, blockno: u32) {
        let (prev, next) = match self.map.get(&blockno) {
            Some(e) => (e.prev, e.next),
            None => return,
        };

        if self.head == Some(blockno) {
            self.head = next;
        }
        if self.tail == Some(blockno) {
            self.tail = prev;
        }

        if let Some(p) = prev {
            if let Some(pe) = self.map.get_mut(&p) {
                pe.next = next;
            }
        }
        if let Some(n) = next {
            if let Some(ne) = self.map.get_mut(&n) {
                ne.prev = prev;
            }
        }

        if let Some(e) = self.map.get_mut(&blockno) {
            e.prev = None;
            e.next = None;
        }
    }

    fn attach_front(&mut self, blockno: u32) {
        if self.head == Some(blockno) {
            return;
        }

        if let Some(e) = self.map.get_mut(&blockno) {
            e.prev = None;
            e.next = self.head;
        }

        if let Some(old_head) = self.head {
            if let Some(he) = self.map.get_mut(&old_head) {
                he.prev = Some(blockno);
            }
        }

        self.head = Some(blockno);

        if self.tail.is_none() {
            self.tail = Some(blockno);
        }
    }
}

/// Write-through LRU cache in front of a device.
pub struct CachedDevice<D: BlockDevice> {
    inner: D,
    cache: BlockCache,
}

impl<D: BlockDevice> CachedDevice<D> {
    pub fn new(inner: D, cap_blocks: usize) -> Self {
        Self {
            inner,
            cache: BlockCache::new(cap_blocks),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Mutable access to the wrapped device. Writes done here bypass the cache.
    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }
}

impl<D: BlockDevice> BlockDevice for CachedDevice<D> {
    fn dev(&self) -> u32 {
        self.inner.dev()
    }

    fn block_count(&self) -> u32 {
        self.inner.block_count()
    }

    fn read_block(&mut self, blockno: u32) -> Result<Block, DeviceError> {
        let mut b = Block::zeroed(self.inner.dev(), blockno);
        if self.cache.get(blockno, &mut b.data) {
            record_cache_hit();
            return Ok(b);
        }
        record_cache_miss();
        let b = self.inner.read_block(blockno)?;
        self.cache.put(blockno, &b.data);
        Ok(b)
    }

    fn write_block(&mut self, block: &Block) -> Result<(), DeviceError> {
        self.inner.write_block(block)?;
        self.cache.put(block.blockno, &block.data);
        Ok(())
    }

    fn release_block(&mut self, block: Block) {
        self.inner.release_block(block)
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.inner.flush()
    }

    fn invalidate_cache(&mut self) {
        self.cache.clear();
        record_cache_invalidation();
        self.inner.invalidate_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDevice;

    fn blk(v: u8) -> [u8; BSIZE] {
        [v; BSIZE]
    }

    #[test]
    fn lru_evicts_least_recent() {
        let mut c = BlockCache::new(2);
        c.put(1, &blk(1));
        c.put(2, &blk(2));
        let mut out = [0u8; BSIZE];
        assert!(c.get(1, &mut out)); // 1 becomes MRU
        c.put(3, &blk(3)); // evicts 2
        assert!(!c.get(2, &mut out));
        assert!(c.get(1, &mut out));
        assert_eq!(out[0], 1);
        assert!(c.get(3, &mut out));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn stale_entry_until_invalidated() {
        let mut d = CachedDevice::new(MemDevice::new(8), 4);
        let mut b = Block::zeroed(1, 5);
        b.data[0] = 7;
        d.write_block(&b).unwrap();

        // Foreign write underneath the cache.
        d.inner_mut().poke(5, &blk(9));
        assert_eq!(d.read_block(5).unwrap().data[0], 7);

        d.invalidate_cache();
        assert_eq!(d.cached_blocks(), 0);
        assert_eq!(d.read_block(5).unwrap().data[0], 9);

        let m = d.into_inner();
        assert_eq!(m.raw(5).map(|b| b[0]), Some(9));
    }
}
