// Базовые модули
pub mod consts;
pub mod error;
pub mod metrics;
pub mod config;
pub mod util;
pub mod lock;

// Блочные устройства: file / mem / LRU cache
pub mod device;   // src/device/{mod,file,mem,cache}.rs

// Формат на диске
pub mod geometry;
pub mod inode;

// Снапшот: аллокатор регионов, фазы backup/restore, хранилище
pub mod alloc;
pub mod backup;   // src/backup/{mod,inodes,dirs,files,bitmap}.rs
pub mod snapshot; // src/snapshot/{mod,manager,summary}.rs

// Сырое зеркало первых N блоков
pub mod mirror;

// mkfs + файловые операции над образом
pub mod image;    // src/image/{mod,format,ops}.rs

// Удобные реэкспорты
pub use alloc::{PageAllocator, Region, RegionAllocator};
pub use config::{CapacityPolicy, SnapConfig, SnapConfigBuilder};
pub use device::{Block, BlockDevice, CachedDevice, FileDevice, MemDevice};
pub use error::{Category, DeviceError, SnapResult, SnapshotError};
pub use geometry::{read_geometry, Geometry};
pub use mirror::{mirror_capture, mirror_restore, MirrorRegion};
pub use snapshot::{
    InvalidationHook, RestoreStats, SlotState, SnapshotStore, SnapshotSummary, VerifyReport,
};
