use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fssnap::device::{BlockDevice, CachedDevice, MemDevice};
use fssnap::image::{self, mkfs, MkfsParams};
use fssnap::{Category, Geometry, SlotState, SnapConfig, SnapshotError, SnapshotStore};

fn fresh_fs() -> Result<MemDevice> {
    let mut dev = MemDevice::new(2000);
    mkfs(&mut dev, &MkfsParams::default())?;
    Ok(dev)
}

fn names(dev: &mut MemDevice) -> Result<Vec<String>> {
    let mut v: Vec<String> = image::list_dir(dev, "/")?.into_iter().map(|e| e.name).collect();
    v.sort();
    Ok(v)
}

#[test]
fn delete_and_create_are_undone_by_restore() -> Result<()> {
    let mut dev = fresh_fs()?;
    image::create_file(&mut dev, "testfile.txt", b"This is a test file.")?;

    let store = SnapshotStore::new(&SnapConfig::default());
    let summary = store.capture(&mut dev, "before")?;
    assert!(summary.is_complete());
    assert_eq!(store.state(), SlotState::Valid);

    image::unlink(&mut dev, "testfile.txt")?;
    image::create_file(&mut dev, "newfile.txt", b"This is a new file.")?;
    assert_eq!(names(&mut dev)?, vec!["newfile.txt".to_string()]);

    store.restore(&mut dev)?;

    // Снапшот всё ещё валиден после restore
    assert_eq!(store.state(), SlotState::Valid);
    assert_eq!(names(&mut dev)?, vec!["testfile.txt".to_string()]);
    assert_eq!(image::read_file(&mut dev, "testfile.txt")?, b"This is a test file.");
    assert!(image::namei(&mut dev, "newfile.txt")?.is_none());
    Ok(())
}

#[test]
fn restore_twice_gives_identical_images() -> Result<()> {
    let mut dev = fresh_fs()?;
    image::create_file(&mut dev, "a", b"alpha")?;
    image::mkdir(&mut dev, "sub")?;
    image::create_file(&mut dev, "sub/b", &vec![0x5A; 3000])?;

    let store = SnapshotStore::new(&SnapConfig::default());
    store.capture(&mut dev, "base")?;

    image::write_file(&mut dev, "a", b"changed")?;
    image::unlink(&mut dev, "sub/b")?;

    let first = store.restore(&mut dev)?;
    let img1 = dev.to_image();
    let second = store.restore(&mut dev)?;
    let img2 = dev.to_image();

    assert_eq!(first, second);
    assert!(img1 == img2, "second restore changed the image");
    assert_eq!(image::read_file(&mut dev, "sub/b")?, vec![0x5A; 3000]);
    Ok(())
}

#[test]
fn restore_on_empty_slot_is_reported() -> Result<()> {
    let mut dev = fresh_fs()?;
    let before = dev.to_image();
    let store = SnapshotStore::new(&SnapConfig::default());

    let err = store.restore(&mut dev).unwrap_err();
    assert!(matches!(err, SnapshotError::NoValidSnapshot));
    assert!(dev.to_image() == before, "failed restore must not write");
    assert!(store.info().is_none());
    Ok(())
}

#[test]
fn summary_reports_every_category() -> Result<()> {
    let mut dev = fresh_fs()?;
    image::create_file(&mut dev, "f", &vec![1u8; 2 * 1024 + 1])?;

    let store = SnapshotStore::new(&SnapConfig::default());
    let s = store.capture(&mut dev, "sum")?;

    assert_eq!(s.label, "sum");
    assert_eq!(s.categories.len(), 4);
    let g = s.geometry;
    let inodes = s.category(Category::Inodes).expect("inodes");
    assert_eq!(inodes.blocks as u32, g.inode_blocks());
    assert_eq!(inodes.origin, Some(g.inodestart));
    let bitmap = s.category(Category::Bitmap).expect("bitmap");
    assert_eq!(bitmap.blocks as u32, g.bitmap_blocks());
    // root dir: one block
    assert_eq!(s.category(Category::Directories).and_then(|c| c.map_len), Some(1));
    // 2049 bytes -> 3 blocks
    assert_eq!(s.category(Category::Files).and_then(|c| c.map_len), Some(3));

    let info = store.info().expect("valid slot");
    assert_eq!(info.total_blocks(), s.total_blocks());
    Ok(())
}

#[test]
fn hooks_run_once_per_successful_restore() -> Result<()> {
    let mut dev = fresh_fs()?;
    let calls = Arc::new(AtomicUsize::new(0));

    let mut store = SnapshotStore::new(&SnapConfig::default());
    let c = Arc::clone(&calls);
    store.add_invalidation_hook(Arc::new(move |_g: &Geometry| {
        c.fetch_add(1, Ordering::SeqCst);
    }));

    // no snapshot -> no hook
    assert!(store.restore(&mut dev).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    store.capture(&mut dev, "h")?;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    store.restore(&mut dev)?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    store.restore(&mut dev)?;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn restore_drops_block_cache() -> Result<()> {
    let mut dev = CachedDevice::new(fresh_fs()?, 64);
    image::create_file(&mut dev, "cached.txt", b"v1")?;

    let store = SnapshotStore::new(&SnapConfig::default());
    store.capture(&mut dev, "c")?;
    image::write_file(&mut dev, "cached.txt", b"v2")?;
    assert!(dev.cached_blocks() > 0);

    store.restore(&mut dev)?;
    assert_eq!(dev.cached_blocks(), 0);
    assert_eq!(image::read_file(&mut dev, "cached.txt")?, b"v1");
    Ok(())
}

#[test]
fn verify_tracks_drift_and_restore() -> Result<()> {
    let mut dev = fresh_fs()?;
    image::create_file(&mut dev, "v.txt", b"stable")?;

    let store = SnapshotStore::new(&SnapConfig::default());
    let s = store.capture(&mut dev, "v")?;

    let clean = store.verify(&mut dev)?;
    assert!(clean.is_clean());
    assert_eq!(clean.blocks_checked, s.total_blocks());

    image::write_file(&mut dev, "v.txt", b"drifted")?;
    let dirty = store.verify(&mut dev)?;
    assert!(!dirty.is_clean());
    assert!(dirty.mismatches_in(Category::Inodes) > 0);
    assert!(dirty.mismatches_in(Category::Files) > 0);
    // freed and reallocated the same block
    assert_eq!(dirty.mismatches_in(Category::Bitmap), 0);

    store.restore(&mut dev)?;
    assert!(store.verify(&mut dev)?.is_clean());
    Ok(())
}

#[test]
fn clear_releases_slot() -> Result<()> {
    let mut dev = fresh_fs()?;
    let store = SnapshotStore::new(&SnapConfig::default());
    store.capture(&mut dev, "x")?;
    assert_eq!(store.allocator().outstanding(), 4);

    assert!(store.clear());
    assert_eq!(store.state(), SlotState::Empty);
    assert_eq!(store.allocator().outstanding(), 0);
    assert!(!store.clear());
    assert!(matches!(store.restore(&mut dev), Err(SnapshotError::NoValidSnapshot)));
    Ok(())
}

#[test]
fn store_is_shared_across_threads() -> Result<()> {
    let store = Arc::new(SnapshotStore::new(&SnapConfig::default()));
    let mut handles = Vec::new();
    for t in 0..4u8 {
        let st = Arc::clone(&store);
        handles.push(std::thread::spawn(move || -> Result<()> {
            let mut dev = fresh_fs()?;
            image::create_file(&mut dev, "t", &[t; 10])?;
            st.capture(&mut dev, &format!("t{}", t))?;
            Ok(())
        }));
    }
    for h in handles {
        h.join().map_err(|_| anyhow::anyhow!("thread panicked"))??;
    }
    // one slot, whatever capture came last
    assert_eq!(store.state(), SlotState::Valid);
    assert_eq!(store.allocator().outstanding(), 4);
    Ok(())
}

#[test]
fn blocks_outside_snapshot_are_left_alone() -> Result<()> {
    let mut dev = fresh_fs()?;
    let store = SnapshotStore::new(&SnapConfig::default());
    store.capture(&mut dev, "o")?;

    // A block that is neither metadata nor referenced data.
    let spare = dev.block_count() - 1;
    let mut b = fssnap::Block::zeroed(dev.dev(), spare);
    b.data.fill(0xEE);
    dev.write_block(&b)?;

    store.restore(&mut dev)?;
    assert_eq!(dev.raw(spare).map(|d| d[0]), Some(0xEE));
    Ok(())
}
