use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use fssnap::device::{BlockDevice, FileDevice};
use fssnap::image::{self, mkfs, MkfsParams};
use fssnap::lock::{acquire_lock, lock_file_path, try_acquire_lock, LockMode};
use fssnap::{
    mirror_capture, mirror_restore, read_geometry, MirrorRegion, SnapConfig, SnapshotError,
    SnapshotStore,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let root = std::env::temp_dir().join(format!("fssnaptest-{prefix}-{pid}-{t}-{id}"));
    fs::create_dir_all(&root).unwrap();
    root
}

fn make_image(root: &PathBuf) -> Result<PathBuf> {
    let path = root.join("fs.img");
    let mut dev = FileDevice::create(&path, 1000)?;
    let params = MkfsParams {
        size: 1000,
        ninodes: 64,
        nlog: 10,
        reserved: Some((800, 100)),
    };
    mkfs(&mut dev, &params)?;
    image::create_file(&mut dev, "testfile.txt", b"This is a test file.")?;
    Ok(path)
}

#[test]
fn image_survives_reopen() -> Result<()> {
    let root = unique_root("reopen");
    let path = make_image(&root)?;

    let mut dev = FileDevice::open_ro(&path)?;
    assert!(dev.is_read_only());
    assert_eq!(dev.block_count(), 1000);
    let g = read_geometry(&mut dev)?;
    assert_eq!(g.size, 1000);
    assert_eq!(image::read_file(&mut dev, "testfile.txt")?, b"This is a test file.");
    assert!(image::create_file(&mut dev, "nope", b"ro").is_err());

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn second_writer_is_locked_out() -> Result<()> {
    let root = unique_root("lock");
    let path = make_image(&root)?;

    let dev = FileDevice::open(&path)?;
    assert!(lock_file_path(&path).exists());
    assert!(FileDevice::open(&path).is_err());
    assert!(FileDevice::open_ro(&path).is_err());
    assert!(try_acquire_lock(&path, LockMode::Exclusive).is_err());

    drop(dev);
    let again = FileDevice::open(&path)?;
    drop(again);

    let guard = acquire_lock(&path, LockMode::Shared)?;
    assert_eq!(guard.mode(), LockMode::Shared);
    assert!(FileDevice::open(&path).is_err());
    drop(guard);

    // readers share
    let r1 = FileDevice::open_ro(&path)?;
    let r2 = FileDevice::open_ro(&path)?;
    assert!(FileDevice::open(&path).is_err());
    drop((r1, r2));

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn phased_snapshot_on_file_image() -> Result<()> {
    let root = unique_root("phased");
    let path = make_image(&root)?;

    let mut dev = FileDevice::open(&path)?;
    dev.set_data_fsync(true);
    let cfg = SnapConfig::default().with_data_fsync(true);
    let store = SnapshotStore::new(&cfg);
    store.capture(&mut dev, "file")?;

    image::unlink(&mut dev, "testfile.txt")?;
    image::create_file(&mut dev, "newfile.txt", b"This is a new file.")?;
    store.restore(&mut dev)?;
    drop(dev);

    // state is on disk
    let mut ro = FileDevice::open_ro(&path)?;
    let names: Vec<String> = image::list_dir(&mut ro, "/")?.into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["testfile.txt".to_string()]);

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn mirror_roundtrip_across_reopen() -> Result<()> {
    let root = unique_root("mirror");
    let path = make_image(&root)?;
    let region = MirrorRegion::new(800, 100);

    {
        let mut dev = FileDevice::open(&path)?;
        assert_eq!(mirror_capture(&mut dev, region)?, 100);
    }
    {
        let mut dev = FileDevice::open(&path)?;
        image::unlink(&mut dev, "testfile.txt")?;
        image::create_file(&mut dev, "newfile.txt", b"This is a new file.")?;
    }
    {
        let mut dev = FileDevice::open(&path)?;
        mirror_restore(&mut dev, region)?;
        assert_eq!(image::read_file(&mut dev, "testfile.txt")?, b"This is a test file.");
        assert!(image::namei(&mut dev, "newfile.txt")?.is_none());
    }

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn mirror_restore_without_capture_is_refused() -> Result<()> {
    let root = unique_root("mirror-empty");
    let path = make_image(&root)?;
    let before = fs::read(&path)?;

    {
        let mut dev = FileDevice::open(&path)?;
        let err = mirror_restore(&mut dev, MirrorRegion::new(800, 100)).unwrap_err();
        assert!(matches!(err, SnapshotError::NoValidSnapshot));
        assert_eq!(read_geometry(&mut dev)?.size, 1000);
        assert_eq!(image::read_file(&mut dev, "testfile.txt")?, b"This is a test file.");
    }
    assert!(fs::read(&path)? == before);

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn mirror_range_checks_run_before_io() -> Result<()> {
    let root = unique_root("mirror-range");
    let path = make_image(&root)?;
    let before = fs::read(&path)?;

    let mut dev = FileDevice::open(&path)?;
    assert!(mirror_capture(&mut dev, MirrorRegion::new(950, 100)).is_err());
    assert!(mirror_restore(&mut dev, MirrorRegion::new(50, 100)).is_err());
    drop(dev);
    assert!(fs::read(&path)? == before);

    fs::remove_dir_all(&root).ok();
    Ok(())
}

#[test]
fn create_refuses_existing_image() -> Result<()> {
    let root = unique_root("exists");
    let path = make_image(&root)?;
    assert!(FileDevice::create(&path, 10).is_err());
    fs::remove_dir_all(&root).ok();
    Ok(())
}
