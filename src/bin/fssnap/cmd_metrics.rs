use anyhow::Result;
use std::path::PathBuf;

use fssnap::device::FileDevice;
use fssnap::metrics;
use fssnap::{SnapConfig, SnapshotStore};

/// CLI: metrics — capture + verify в памяти (образ открыт только на чтение).
pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let cfg = SnapConfig::from_env();
    let mut dev = FileDevice::open_ro(&path)?;
    dev.set_dev(cfg.device);

    let store = SnapshotStore::new(&cfg);
    let summary = store.capture(&mut dev, "dry-run")?;
    let report = store.verify(&mut dev)?;
    let ms = metrics::snapshot();

    if json {
        let v = serde_json::json!({
            "summary": summary,
            "verify": report,
            "metrics": ms,
        });
        println!("{}", serde_json::to_string(&v)?);
        return Ok(());
    }

    println!("Dry-run capture of {}:", path.display());
    for c in &summary.categories {
        println!(
            "  {:<12} blocks={} bytes={} map={} truncated={} crc32={:08x}",
            c.category.as_str(),
            c.blocks,
            c.bytes,
            c.map_len.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
            c.truncated,
            c.crc32
        );
    }
    println!(
        "  verify: checked={} mismatches={}",
        report.blocks_checked,
        report.mismatches.len()
    );
    println!("Metrics:");
    println!("  captures_ok        = {}", ms.captures_ok);
    println!("  captures_failed    = {}", ms.captures_failed);
    println!("  capture_blocks     = {}", ms.capture_blocks);
    println!("  restores_ok        = {}", ms.restores_ok);
    println!("  restores_failed    = {}", ms.restores_failed);
    println!("  restore_blocks     = {}", ms.restore_blocks);
    println!("  rollbacks          = {}", ms.rollbacks);
    println!("  truncations        = {}", ms.truncations);
    println!("  mirror_blocks      = {}", ms.mirror_blocks_copied);
    println!(
        "  cache hits/misses  = {}/{} ({:.1}%)",
        ms.cache_hits,
        ms.cache_misses,
        ms.cache_hit_ratio() * 100.0
    );
    Ok(())
}
