use anyhow::Result;
use std::path::PathBuf;

use fssnap::device::{BlockDevice, FileDevice};
use fssnap::read_geometry;

pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let mut dev = FileDevice::open_ro(&path)?;
    let g = read_geometry(&mut dev)?;

    if json {
        println!("{}", serde_json::to_string(&g)?);
        return Ok(());
    }

    println!("Image: {} ({} blocks)", path.display(), dev.block_count());
    println!("  size       = {}", g.size);
    println!("  nblocks    = {}", g.nblocks);
    println!("  ninodes    = {}", g.ninodes);
    println!("  nlog       = {} (from {})", g.nlog, g.logstart);
    println!("  inodestart = {} ({} blocks)", g.inodestart, g.inode_blocks());
    println!("  bmapstart  = {} ({} blocks)", g.bmapstart, g.bitmap_blocks());
    println!("  data_start = {}", g.data_start());
    Ok(())
}
