use anyhow::Result;

use fssnap::device::{BlockDevice, CachedDevice, MemDevice};
use fssnap::image::{self, mkfs, MkfsParams};
use fssnap::metrics;
use fssnap::{CapacityPolicy, SnapConfig, SnapshotStore};

#[test]
fn env_overrides_are_picked_up() -> Result<()> {
    // Единственный тест в этом бинаре, который трогает окружение.
    std::env::set_var("FSSNAP_CAPACITY_BYTES", "page");
    std::env::set_var("FSSNAP_CAPACITY_STRICT", "yes");
    std::env::set_var("FSSNAP_CACHE_BLOCKS", "16");
    std::env::set_var("FSSNAP_MIRROR_START", "1200");
    let cfg = SnapConfig::from_env();
    for k in [
        "FSSNAP_CAPACITY_BYTES",
        "FSSNAP_CAPACITY_STRICT",
        "FSSNAP_CACHE_BLOCKS",
        "FSSNAP_MIRROR_START",
    ] {
        std::env::remove_var(k);
    }

    assert_eq!(cfg.capacity_policy(), CapacityPolicy::Strict { bytes: 4096 });
    assert_eq!(cfg.cache_blocks, 16);
    assert_eq!(cfg.mirror_start, 1200);
    assert_eq!(cfg.mirror_blocks, 100);
    Ok(())
}

#[test]
fn builder_cache_blocks_enables_hits_on_repeat_reads() -> Result<()> {
    let cfg = SnapConfig::builder().cache_blocks(32).build();
    let mut mem = MemDevice::new(2000);
    mkfs(&mut mem, &MkfsParams::default())?;
    let mut dev = CachedDevice::new(mem, cfg.cache_blocks);
    image::create_file(&mut dev, "hot.txt", b"hot")?;

    let before = metrics::snapshot();
    for _ in 0..5 {
        assert_eq!(image::read_file(&mut dev, "hot.txt")?, b"hot");
    }
    let after = metrics::snapshot();
    assert!(after.cache_hits > before.cache_hits);
    assert!(dev.cached_blocks() <= 32);
    assert!(dev.inner().reads > 0);
    Ok(())
}

#[test]
fn store_takes_policy_from_config() -> Result<()> {
    let cfg = SnapConfig::builder()
        .capacity_bytes(Some(3 * 1024 + 5))
        .capacity_strict(false)
        .build();
    let store = SnapshotStore::new(&cfg);
    assert_eq!(store.policy(), CapacityPolicy::Truncate { bytes: 3 * 1024 });

    let mut dev = MemDevice::new(2000);
    mkfs(&mut dev, &MkfsParams::default())?;
    let s = store.capture(&mut dev, "cfg")?;
    // 13 inode blocks do not fit into 3
    assert_eq!(s.truncated().len(), 1);
    assert!(dev.block_count() == 2000);
    Ok(())
}
