use anyhow::Result;
use std::sync::Arc;

use fssnap::consts::{BSIZE, PAGE_SIZE};
use fssnap::device::MemDevice;
use fssnap::image::{self, mkfs, MkfsParams};
use fssnap::{
    Category, PageAllocator, RegionAllocator, SlotState, SnapConfig, SnapshotError, SnapshotStore,
};

fn fresh_fs() -> Result<MemDevice> {
    fs_with_inodes(MkfsParams::default().ninodes)
}

// 32 inodes -> 2 inode blocks, so only file content can overflow one page
fn small_fs() -> Result<MemDevice> {
    fs_with_inodes(32)
}

fn fs_with_inodes(ninodes: u32) -> Result<MemDevice> {
    let mut dev = MemDevice::new(2000);
    let params = MkfsParams {
        ninodes,
        ..MkfsParams::default()
    };
    mkfs(&mut dev, &params)?;
    image::create_file(&mut dev, "testfile.txt", b"This is a test file.")?;
    Ok(dev)
}

fn store_with(cfg: &SnapConfig) -> (SnapshotStore, Arc<PageAllocator>) {
    let alloc = Arc::new(PageAllocator::new());
    let store = SnapshotStore::with_allocator(cfg, alloc.clone());
    (store, alloc)
}

#[test]
fn each_allocation_failure_rolls_back_completely() -> Result<()> {
    // capture allocates in this order
    let order = [
        Category::Inodes,
        Category::Directories,
        Category::Files,
        Category::Bitmap,
    ];
    for (i, want) in order.iter().enumerate() {
        let mut dev = fresh_fs()?;
        let (store, alloc) = store_with(&SnapConfig::default());

        alloc.fail_nth_from_now(i as u64 + 1);
        let err = store.capture(&mut dev, "doomed").unwrap_err();
        match err {
            SnapshotError::AllocationFailure { category } => assert_eq!(category, *want),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(restore_sees_nothing(&store, &mut dev)?);
        assert_eq!(store.state(), SlotState::Empty);
        assert_eq!(alloc.outstanding(), 0, "leaked regions after failing at {}", want);

        // the next attempt succeeds from scratch
        store.capture(&mut dev, "retry")?;
        assert_eq!(alloc.outstanding(), 4);
    }
    Ok(())
}

fn restore_sees_nothing(store: &SnapshotStore, dev: &mut MemDevice) -> Result<bool> {
    // restore after a failed capture must see nothing
    Ok(matches!(store.restore(dev), Err(SnapshotError::NoValidSnapshot)))
}

#[test]
fn failed_recapture_does_not_keep_old_snapshot() -> Result<()> {
    let mut dev = fresh_fs()?;
    let (store, alloc) = store_with(&SnapConfig::default());
    store.capture(&mut dev, "good")?;
    assert_eq!(alloc.outstanding(), 4);

    alloc.fail_nth_from_now(2);
    assert!(store.capture(&mut dev, "bad").unwrap_err().is_allocation());
    assert_eq!(store.state(), SlotState::Empty);
    assert_eq!(alloc.outstanding(), 0);
    Ok(())
}

#[test]
fn at_most_one_snapshot_is_held() -> Result<()> {
    let mut dev = fresh_fs()?;
    let (store, alloc) = store_with(&SnapConfig::default());

    for n in 0..5 {
        image::write_file(&mut dev, "testfile.txt", format!("round {}", n).as_bytes())?;
        store.capture(&mut dev, &format!("s{}", n))?;
        assert_eq!(alloc.outstanding(), 4);
    }
    assert_eq!(store.info().map(|s| s.label), Some("s4".to_string()));
    assert_eq!(alloc.issued(), 20);
    Ok(())
}

#[test]
fn previous_snapshot_is_released_before_new_allocations() -> Result<()> {
    let mut dev = fresh_fs()?;
    let (store, alloc) = store_with(&SnapConfig::default());
    // exactly one snapshot worth of regions
    alloc.set_max_outstanding(4);

    store.capture(&mut dev, "one")?;
    store.capture(&mut dev, "two")?;
    assert_eq!(store.state(), SlotState::Valid);
    assert_eq!(alloc.outstanding(), 4);
    Ok(())
}

#[test]
fn strict_capacity_fails_capture() -> Result<()> {
    let mut dev = small_fs()?;
    image::create_file(&mut dev, "big.bin", &vec![7u8; 9 * 1024])?;

    let cfg = SnapConfig::default()
        .with_capacity_bytes(Some(4096))
        .with_capacity_strict(true);
    let (store, alloc) = store_with(&cfg);

    let err = store.capture(&mut dev, "strict").unwrap_err();
    assert!(matches!(
        err,
        SnapshotError::CapacityExceeded {
            category: Category::Files,
            capacity: 4096
        }
    ));
    assert_eq!(store.state(), SlotState::Empty);
    assert_eq!(alloc.outstanding(), 0);
    Ok(())
}

#[test]
fn truncated_capture_is_flagged_but_valid() -> Result<()> {
    let mut dev = small_fs()?;
    image::create_file(&mut dev, "big.bin", &vec![7u8; 9 * 1024])?;

    let cfg = SnapConfig::builder().one_page().build();
    let (store, _alloc) = store_with(&cfg);
    let s = store.capture(&mut dev, "trunc")?;

    assert_eq!(store.state(), SlotState::Valid);
    let files = s.category(Category::Files).expect("files");
    assert!(files.truncated);
    assert!(files.map_len.unwrap_or(0) <= 4);
    assert_eq!(files.capacity, Some(4096));
    assert_eq!(s.truncated(), vec![Category::Files]);
    Ok(())
}

#[test]
fn default_inode_table_overflows_one_page() -> Result<()> {
    // 200 inodes -> 13 inode blocks
    let mut dev = fresh_fs()?;
    let cfg = SnapConfig::builder().one_page().build();
    let (store, _alloc) = store_with(&cfg);
    let s = store.capture(&mut dev, "inodes")?;

    let inodes = s.category(Category::Inodes).expect("inodes");
    assert_eq!(inodes.blocks, 4);
    assert!(inodes.truncated);
    Ok(())
}

#[test]
fn unbounded_capture_holds_large_files() -> Result<()> {
    let mut dev = fresh_fs()?;
    // 12 direct + 40 indirect data blocks
    let big: Vec<u8> = (0..52 * 1024).map(|i| (i % 253) as u8).collect();
    image::create_file(&mut dev, "huge.bin", &big)?;

    let (store, _alloc) = store_with(&SnapConfig::default());
    let s = store.capture(&mut dev, "big")?;
    assert!(s.is_complete());
    // testfile.txt (1) + huge.bin (52)
    assert_eq!(s.category(Category::Files).and_then(|c| c.map_len), Some(53));

    image::unlink(&mut dev, "huge.bin")?;
    // stays within direct blocks: the indirect block of huge.bin is not captured
    image::create_file(&mut dev, "other.bin", &vec![0u8; 10 * 1024])?;
    store.restore(&mut dev)?;
    assert_eq!(image::read_file(&mut dev, "huge.bin")?, big);
    Ok(())
}

#[test]
fn directory_content_is_truncated_at_the_cap() -> Result<()> {
    let mut dev = small_fs()?;
    // root + 5 subdirectories, one block each
    for i in 0..5 {
        image::mkdir(&mut dev, &format!("d{}", i))?;
    }

    let cfg = SnapConfig::builder().one_page().build();
    let (store, _alloc) = store_with(&cfg);
    let s = store.capture(&mut dev, "dirs")?;

    assert_eq!(store.state(), SlotState::Valid);
    let dirs = s.category(Category::Directories).expect("directories");
    assert!(dirs.truncated);
    assert_eq!(dirs.map_len, Some(PAGE_SIZE / BSIZE));
    assert_eq!(s.truncated(), vec![Category::Directories]);
    Ok(())
}

#[test]
fn huge_cap_does_not_reserve_up_front() -> Result<()> {
    let mut dev = fresh_fs()?;
    let cfg = SnapConfig::default().with_capacity_bytes(Some(usize::MAX));
    let (store, alloc) = store_with(&cfg);

    let s = store.capture(&mut dev, "huge-cap")?;
    assert!(s.is_complete());
    assert_eq!(alloc.outstanding(), 4);

    image::unlink(&mut dev, "testfile.txt")?;
    store.restore(&mut dev)?;
    assert_eq!(image::read_file(&mut dev, "testfile.txt")?, b"This is a test file.");
    Ok(())
}
