//! FileDevice — блочное устройство поверх файла-образа диска.
//!
//! - Block `n` lives at byte offset `n * BSIZE`.
//! - The number of blocks is fixed at open: len / BSIZE (a trailing partial
//!   block is ignored).
//! - An exclusive (or shared, for read-only opens) advisory lock on
//!   `<image>.lock` is held for the lifetime of the device, so two processes
//!   never capture/restore/mutate the same image at once.
//! - data_fsync: sync_data() after every write (off by default, flush() always syncs).

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::consts::{BSIZE, ROOTDEV};
use crate::error::DeviceError;
use crate::lock::{try_acquire_lock, LockGuard, LockMode};
use crate::util::{read_at, write_at};

use super::{check_range, Block, BlockDevice};

pub struct FileDevice {
    path: PathBuf,
    file: File,
    dev: u32,
    nblocks: u32,
    read_only: bool,
    data_fsync: bool,
    _lock: LockGuard,
}

impl FileDevice {
    /// Open an existing image for read/write (exclusive lock).
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_mode(path, false)
    }

    /// Open an existing image read-only (shared lock).
    pub fn open_ro(path: &Path) -> Result<Self> {
        Self::open_mode(path, true)
    }

    /// Create a zero-filled image of `nblocks` blocks. Error if it already exists.
    pub fn create(path: &Path, nblocks: u32) -> Result<Self> {
        if path.exists() {
            return Err(anyhow!("image already exists at {}", path.display()));
        }
        let f = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("create image {}", path.display()))?;
        f.set_len(nblocks as u64 * BSIZE as u64)
            .with_context(|| format!("set_len {}", path.display()))?;
        let _ = f.sync_all();
        drop(f);
        Self::open(path)
    }

    fn open_mode(path: &Path, read_only: bool) -> Result<Self> {
        let mode = if read_only {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        };
        let lock = try_acquire_lock(path, mode)
            .with_context(|| format!("image {} is busy", path.display()))?;

        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)
            .with_context(|| format!("open image {}", path.display()))?;
        let len = file.metadata()?.len();
        let nblocks = (len / BSIZE as u64) as u32;
        if nblocks == 0 {
            return Err(anyhow!(
                "image {} is smaller than one block ({} B)",
                path.display(),
                len
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            dev: ROOTDEV,
            nblocks,
            read_only,
            data_fsync: false,
            _lock: lock,
        })
    }

    /// Device number stamped on blocks read from this image.
    pub fn set_dev(&mut self, dev: u32) {
        self.dev = dev;
    }

    pub fn set_data_fsync(&mut self, on: bool) {
        self.data_fsync = on;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl BlockDevice for FileDevice {
    fn dev(&self) -> u32 {
        self.dev
    }

    fn block_count(&self) -> u32 {
        self.nblocks
    }

    fn read_block(&mut self, blockno: u32) -> Result<Block, DeviceError> {
        check_range(blockno, self.nblocks)?;
        let mut b = Block::zeroed(self.dev, blockno);
        read_at(&mut self.file, blockno as u64 * BSIZE as u64, &mut b.data[..])
            .map_err(|source| DeviceError::Io { blockno, source })?;
        Ok(b)
    }

    fn write_block(&mut self, block: &Block) -> Result<(), DeviceError> {
        check_range(block.blockno, self.nblocks)?;
        if self.read_only {
            return Err(DeviceError::Other(format!(
                "write to block {} on read-only image {}",
                block.blockno,
                self.path.display()
            )));
        }
        let blockno = block.blockno;
        write_at(&mut self.file, blockno as u64 * BSIZE as u64, &block.data[..])
            .map_err(|source| DeviceError::Io { blockno, source })?;
        if self.data_fsync {
            self.file
                .sync_data()
                .map_err(|source| DeviceError::Io { blockno, source })?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        if self.read_only {
            return Ok(());
        }
        self.file
            .sync_all()
            .map_err(|source| DeviceError::Io { blockno: 0, source })
    }
}
