use anyhow::{anyhow, bail, Context, Result};
use std::fs::OpenOptions;
use std::io::Read;
use std::path::{Path, PathBuf};

use fssnap::consts::{BSIZE, MAXFILE};
use fssnap::device::{BlockDevice, CachedDevice, FileDevice, MemDevice};
use fssnap::SnapConfig;

/// Open an image for a mutating command (exclusive lock), behind the LRU cache
/// when FSSNAP_CACHE_BLOCKS > 0.
pub fn open_image(path: &Path, cfg: &SnapConfig) -> Result<Box<dyn BlockDevice>> {
    let mut dev = FileDevice::open(path)?;
    dev.set_dev(cfg.device);
    dev.set_data_fsync(cfg.data_fsync);
    if cfg.cache_blocks > 0 {
        Ok(Box::new(CachedDevice::new(dev, cfg.cache_blocks)))
    } else {
        Ok(Box::new(dev))
    }
}

/// Copy a whole image into memory (shared lock held only while reading).
pub fn load_in_memory(path: &Path, cfg: &SnapConfig) -> Result<MemDevice> {
    let mut src = FileDevice::open_ro(path)?;
    let mut mem = MemDevice::new(src.block_count()).with_dev(cfg.device);
    for b in 0..src.block_count() {
        let blk = src.read_block(b)?;
        mem.poke(b, &blk.data);
        src.release_block(blk);
    }
    Ok(mem)
}

pub fn read_all(p: &PathBuf) -> Result<Vec<u8>> {
    let mut f = OpenOptions::new()
        .read(true)
        .open(p)
        .with_context(|| format!("open {}", p.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Deterministic filler for `fill`: byte i = i % 251.
pub fn pattern_bytes(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8).collect()
}

pub fn parse_size(s: &str) -> Result<usize> {
    let s = s.trim();
    let (num, mult) = if let Some(n) = s.strip_suffix(['k', 'K']) {
        (n, 1024)
    } else {
        (s, 1)
    };
    num.parse::<usize>()
        .ok()
        .and_then(|v| v.checked_mul(mult))
        .ok_or_else(|| anyhow!("invalid size '{}'", s))
}

/// Size argument of `fill`, bounded by the largest file the image can hold.
pub fn parse_fill_size(s: &str) -> Result<usize> {
    let n = parse_size(s)?;
    if n > MAXFILE * BSIZE {
        bail!("{} B exceeds max file size {} B", n, MAXFILE * BSIZE);
    }
    Ok(n)
}
