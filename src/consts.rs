//! Общие константы on-disk формата (superblock, inodes, bitmap, directory) и
//! параметры движка снапшотов.
//!
//! Disk layout:
//! [ boot block | super block | log | inode blocks | free bit map | data blocks ]

// -------- Blocks --------
pub const BSIZE: usize = 1024;
/// Device number of the root filesystem.
pub const ROOTDEV: u32 = 1;
/// Superblock lives right after the boot block.
pub const SUPERBLOCK_NO: u32 = 1;

// -------- Superblock --------
pub const FSMAGIC: u32 = 0x1020_3040;
pub const SUPERBLOCK_SIZE: usize = 32; // [magic][size][nblocks][ninodes][nlog][logstart][inodestart][bmapstart] u32 LE

// -------- Inodes --------
pub const NDIRECT: usize = 12;
pub const NINDIRECT: usize = BSIZE / 4;
pub const MAXFILE: usize = NDIRECT + NINDIRECT;
pub const DINODE_SIZE: usize = 64; // [type i16][major i16][minor i16][nlink i16][size u32][addrs u32 x 13]
pub const IPB: usize = BSIZE / DINODE_SIZE;
pub const ROOTINO: u32 = 1;

// Offsets inside a disk inode
pub const DINODE_OFF_TYPE: usize = 0;
pub const DINODE_OFF_MAJOR: usize = 2;
pub const DINODE_OFF_MINOR: usize = 4;
pub const DINODE_OFF_NLINK: usize = 6;
pub const DINODE_OFF_SIZE: usize = 8;
pub const DINODE_OFF_ADDRS: usize = 12;

// Type tags
pub const T_FREE: i16 = 0;
pub const T_DIR: i16 = 1;
pub const T_FILE: i16 = 2;
pub const T_DEVICE: i16 = 3;

// -------- Bitmap --------
/// Bitmap bits per block.
pub const BPB: usize = BSIZE * 8;

// -------- Directory --------
pub const DIRSIZ: usize = 14;
pub const DIRENT_SIZE: usize = 2 + DIRSIZ;

// -------- Snapshot engine --------
/// Legacy per-category capacity: one allocator page.
pub const PAGE_SIZE: usize = 4096;

// Raw mirror variant: blocks [0, MIRROR_BLOCKS) are copied to [MIRROR_START, ...)
pub const MIRROR_START: u32 = 800;
pub const MIRROR_BLOCKS: u32 = 100;

// mkfs defaults
pub const DEFAULT_FSSIZE: u32 = 2000;
pub const DEFAULT_NINODES: u32 = 200;
pub const DEFAULT_NLOG: u32 = 30;
