use anyhow::{Context, Result};
use std::path::PathBuf;

use fssnap::device::FileDevice;
use fssnap::{mirror_restore, MirrorRegion, SnapConfig};

/// CLI: restore — вернуть первые N блоков из зеркала.
pub fn exec(path: PathBuf) -> Result<()> {
    let cfg = SnapConfig::from_env();
    let region = MirrorRegion::new(cfg.mirror_start, cfg.mirror_blocks);

    let mut dev = FileDevice::open(&path)?;
    dev.set_dev(cfg.device);
    dev.set_data_fsync(cfg.data_fsync);

    mirror_restore(&mut dev, region).context("Filesystem restore failed")?;
    println!("Filesystem restored successfully.");
    Ok(())
}
