use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fssnap — снапшоты xv6-образов
#[derive(Parser, Debug)]
#[command(name = "fssnap", version, about = "Snapshot/restore for xv6 filesystem images")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Create and format a new image (superblock, log, inodes, bitmap, root dir)
    Mkfs {
        #[arg(long)]
        path: PathBuf,
        /// Filesystem size in blocks
        #[arg(long, default_value_t = 2000)]
        size: u32,
        #[arg(long, default_value_t = 200)]
        ninodes: u32,
        #[arg(long, default_value_t = 30)]
        nlog: u32,
        /// Do not mark the raw-mirror range (FSSNAP_MIRROR_*) as used in the bitmap
        #[arg(long, default_value_t = false)]
        no_reserve: bool,
        /// Overwrite an existing image
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Create a snapshot: copy the leading blocks into the reserved mirror range
    Snapshot {
        #[arg(long)]
        path: PathBuf,
    },
    /// Restore the leading blocks from the reserved mirror range
    Restore {
        #[arg(long)]
        path: PathBuf,
    },
    /// Print the superblock. --json prints one JSON object.
    Geometry {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run commands against one image with a single in-process snapshot slot.
    ///
    /// Команды (по одной на строку, '#' — комментарий):
    ///   ls [dir]            list a directory
    ///   write <path> <text> create or replace a file with text
    ///   fill <path> <n>     create or replace a file with n pattern bytes
    ///   cat <path>          print a file
    ///   rm <path>           remove a file or an empty directory
    ///   mkdir <path>        create a directory
    ///   snap [label]        capture the filesystem into the slot
    ///   restore             restore the slot onto the image
    ///   info                show the slot summary
    ///   verify              compare the slot with the image
    ///   clear               release the slot
    ///   metrics             print engine counters
    Session {
        #[arg(long)]
        path: PathBuf,
        /// Script file with commands
        #[arg(long)]
        script: Option<PathBuf>,
        /// Inline commands (repeatable; ';' separates several in one value)
        #[arg(long)]
        cmd: Vec<String>,
        /// Work on an in-memory copy; the image file is left untouched
        #[arg(long, default_value_t = false)]
        in_memory: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Dry-run capture + verify of an image (read-only), then print counters
    Metrics {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}
