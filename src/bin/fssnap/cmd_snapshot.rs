use anyhow::{Context, Result};
use std::path::PathBuf;

use fssnap::device::FileDevice;
use fssnap::{mirror_capture, MirrorRegion, SnapConfig};

/// CLI: snapshot — сырое зеркало первых N блоков в зарезервированный диапазон.
///
/// Region: FSSNAP_MIRROR_START / FSSNAP_MIRROR_BLOCKS (default [800, 900) ← [0, 100)).
pub fn exec(path: PathBuf) -> Result<()> {
    let cfg = SnapConfig::from_env();
    let region = MirrorRegion::new(cfg.mirror_start, cfg.mirror_blocks);

    let mut dev = FileDevice::open(&path)?;
    dev.set_dev(cfg.device);
    dev.set_data_fsync(cfg.data_fsync);

    mirror_capture(&mut dev, region).context("Filesystem snapshot failed")?;
    println!("Filesystem snapshot created successfully.");
    Ok(())
}
