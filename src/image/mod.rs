//! image — building and mutating filesystem images (mkfs + file operations).
//!
//! Used by the CLI (`mkfs`, `session`) and by the tests to produce real
//! on-disk layouts for the snapshot engine to chew on.

mod format;
mod ops;

pub use format::{mkfs, MkfsParams};
pub use ops::{
    create_file, free_blocks, list_dir, mkdir, namei, read_file, read_inode, unlink, write_file,
    DirEntry,
};
