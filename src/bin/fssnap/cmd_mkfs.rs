use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use fssnap::device::FileDevice;
use fssnap::image::{mkfs, MkfsParams};
use fssnap::SnapConfig;

pub fn exec(
    path: PathBuf,
    size: u32,
    ninodes: u32,
    nlog: u32,
    no_reserve: bool,
    force: bool,
) -> Result<()> {
    let cfg = SnapConfig::from_env();

    if path.exists() {
        if !force {
            bail!("image {} already exists (use --force to overwrite)", path.display());
        }
        std::fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
    }

    // Mirror range past the filesystem extends the device.
    let mirror_end = cfg.mirror_start.saturating_add(cfg.mirror_blocks);
    let nblocks = size.max(mirror_end);

    let mut dev = FileDevice::create(&path, nblocks)?;
    dev.set_dev(cfg.device);
    let params = MkfsParams {
        size,
        ninodes,
        nlog,
        reserved: if no_reserve {
            None
        } else {
            Some((cfg.mirror_start, cfg.mirror_blocks))
        },
    };
    let g = mkfs(&mut dev, &params)?;

    println!(
        "Formatted {}: {} blocks ({} fs, {} data), {} inodes, mirror [{}, {}){}",
        path.display(),
        nblocks,
        g.size,
        g.nblocks,
        g.ninodes,
        cfg.mirror_start,
        mirror_end,
        if no_reserve { " not reserved" } else { "" }
    );
    Ok(())
}
