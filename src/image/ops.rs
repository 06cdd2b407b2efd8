//! image/ops — операции над образом: bitmap, inodes, directories, files.
//!
//! Enough of a filesystem to build and mutate test images:
//! - paths are '/'-separated and resolved from the root inode;
//! - directories only use direct blocks (never an indirect block);
//! - files use direct blocks, then the single indirect block (MAXFILE blocks max);
//! - directory size is always a whole number of blocks.
//!
//! Path-based functions read (and validate) the superblock themselves, so
//! callers only pass the device.

use anyhow::{anyhow, bail, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::consts::{BPB, BSIZE, DINODE_SIZE, DIRENT_SIZE, DIRSIZ, MAXFILE, NDIRECT, NINDIRECT, ROOTINO};
use crate::device::{Block, BlockDevice};
use crate::geometry::{read_geometry, Geometry};
use crate::inode::{
    indirect_entries, inode_block_index, inode_offset_in_block, DiskInode, InodeType,
};

const DIRENTS_PER_BLOCK: usize = BSIZE / DIRENT_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub inum: u32,
    pub kind: InodeType,
    pub size: u32,
}

// ---------------------------- bitmap ----------------------------

pub(crate) fn bitmap_get<D: BlockDevice + ?Sized>(dev: &mut D, g: &Geometry, b: u32) -> Result<bool> {
    let blk = dev.read_block(g.bmapstart + b / BPB as u32)?;
    let bi = b as usize % BPB;
    let on = blk.data[bi / 8] & (1 << (bi % 8)) != 0;
    dev.release_block(blk);
    Ok(on)
}

pub(crate) fn bitmap_set<D: BlockDevice + ?Sized>(
    dev: &mut D,
    g: &Geometry,
    b: u32,
    on: bool,
) -> Result<()> {
    let mut blk = dev.read_block(g.bmapstart + b / BPB as u32)?;
    let bi = b as usize % BPB;
    if on {
        blk.data[bi / 8] |= 1 << (bi % 8);
    } else {
        blk.data[bi / 8] &= !(1 << (bi % 8));
    }
    dev.write_block(&blk)?;
    dev.release_block(blk);
    Ok(())
}

/// Allocate a zeroed data block.
pub(crate) fn balloc<D: BlockDevice + ?Sized>(dev: &mut D, g: &Geometry) -> Result<u32> {
    for b in g.data_start()..g.size {
        if !bitmap_get(dev, g, b)? {
            bitmap_set(dev, g, b, true)?;
            dev.write_block(&Block::zeroed(dev.dev(), b))?;
            return Ok(b);
        }
    }
    Err(anyhow!("out of blocks"))
}

fn bfree<D: BlockDevice + ?Sized>(dev: &mut D, g: &Geometry, b: u32) -> Result<()> {
    if b < g.data_start() || b >= g.size {
        bail!("bfree: block {} outside data region", b);
    }
    bitmap_set(dev, g, b, false)
}

/// Count of free data blocks.
pub fn free_blocks<D: BlockDevice + ?Sized>(dev: &mut D) -> Result<u32> {
    let g = read_geometry(dev)?;
    let mut n = 0;
    for b in g.data_start()..g.size {
        if !bitmap_get(dev, &g, b)? {
            n += 1;
        }
    }
    Ok(n)
}

// ---------------------------- inodes ----------------------------

pub fn read_inode<D: BlockDevice + ?Sized>(dev: &mut D, g: &Geometry, inum: u32) -> Result<DiskInode> {
    if inum >= g.ninodes {
        bail!("inode {} out of range ({} inodes)", inum, g.ninodes);
    }
    let blk = dev.read_block(g.inodestart + inode_block_index(inum))?;
    let off = inode_offset_in_block(inum);
    let ino = DiskInode::decode(&blk.data[off..off + DINODE_SIZE]);
    dev.release_block(blk);
    Ok(ino)
}

pub(crate) fn write_inode<D: BlockDevice + ?Sized>(
    dev: &mut D,
    g: &Geometry,
    inum: u32,
    ino: &DiskInode,
) -> Result<()> {
    if inum >= g.ninodes {
        bail!("inode {} out of range ({} inodes)", inum, g.ninodes);
    }
    let mut blk = dev.read_block(g.inodestart + inode_block_index(inum))?;
    let off = inode_offset_in_block(inum);
    ino.encode(&mut blk.data[off..off + DINODE_SIZE]);
    dev.write_block(&blk)?;
    dev.release_block(blk);
    Ok(())
}

fn ialloc<D: BlockDevice + ?Sized>(dev: &mut D, g: &Geometry, kind: InodeType) -> Result<u32> {
    for inum in 1..g.ninodes {
        let ino = read_inode(dev, g, inum)?;
        if ino.kind == InodeType::Free {
            let mut fresh = DiskInode::empty();
            fresh.kind = kind;
            fresh.nlink = 1;
            write_inode(dev, g, inum, &fresh)?;
            return Ok(inum);
        }
    }
    Err(anyhow!("out of inodes"))
}

/// All data blocks of an inode plus its indirect block (if any).
fn inode_blocks<D: BlockDevice + ?Sized>(dev: &mut D, ino: &DiskInode) -> Result<(Vec<u32>, Option<u32>)> {
    let mut blocks: Vec<u32> = ino.direct_blocks().collect();
    let ind = ino.indirect();
    if let Some(a) = ind {
        let blk = dev.read_block(a)?;
        blocks.extend(indirect_entries(&blk.data).filter(|&x| x != 0));
        dev.release_block(blk);
    }
    Ok((blocks, ind))
}

fn free_inode<D: BlockDevice + ?Sized>(dev: &mut D, g: &Geometry, inum: u32) -> Result<()> {
    let ino = read_inode(dev, g, inum)?;
    let (blocks, ind) = inode_blocks(dev, &ino)?;
    for b in blocks.into_iter().chain(ind) {
        bfree(dev, g, b)?;
    }
    write_inode(dev, g, inum, &DiskInode::empty())
}

// -------------------------- directories --------------------------

pub(crate) fn put_dirent<D: BlockDevice + ?Sized>(
    dev: &mut D,
    blockno: u32,
    slot: usize,
    inum: u32,
    name: &str,
) -> Result<()> {
    let mut blk = dev.read_block(blockno)?;
    let off = slot * DIRENT_SIZE;
    let rec = &mut blk.data[off..off + DIRENT_SIZE];
    rec.fill(0);
    LittleEndian::write_u16(&mut rec[0..2], inum as u16);
    let nb = name.as_bytes();
    rec[2..2 + nb.len()].copy_from_slice(nb);
    dev.write_block(&blk)?;
    dev.release_block(blk);
    Ok(())
}

struct RawDirent {
    blockno: u32,
    slot: usize,
    inum: u32,
    name: String,
}

fn read_dirents<D: BlockDevice + ?Sized>(dev: &mut D, dir: &DiskInode) -> Result<Vec<RawDirent>> {
    let mut out = Vec::new();
    let blocks: Vec<u32> = dir.direct_blocks().collect();
    for blockno in blocks {
        let blk = dev.read_block(blockno)?;
        for slot in 0..DIRENTS_PER_BLOCK {
            let rec = &blk.data[slot * DIRENT_SIZE..(slot + 1) * DIRENT_SIZE];
            let inum = LittleEndian::read_u16(&rec[0..2]) as u32;
            if inum == 0 {
                continue;
            }
            let raw = &rec[2..];
            let end = raw.iter().position(|&c| c == 0).unwrap_or(DIRSIZ);
            out.push(RawDirent {
                blockno,
                slot,
                inum,
                name: String::from_utf8_lossy(&raw[..end]).into_owned(),
            });
        }
        dev.release_block(blk);
    }
    Ok(out)
}

fn lookup<D: BlockDevice + ?Sized>(dev: &mut D, g: &Geometry, dir_inum: u32, name: &str) -> Result<Option<u32>> {
    let dir = read_inode(dev, g, dir_inum)?;
    if dir.kind != InodeType::Dir {
        bail!("inode {} is not a directory", dir_inum);
    }
    Ok(read_dirents(dev, &dir)?
        .into_iter()
        .find(|e| e.name == name)
        .map(|e| e.inum))
}

fn dir_link<D: BlockDevice + ?Sized>(
    dev: &mut D,
    g: &Geometry,
    dir_inum: u32,
    name: &str,
    inum: u32,
) -> Result<()> {
    let mut dir = read_inode(dev, g, dir_inum)?;
    let blocks: Vec<u32> = dir.direct_blocks().collect();

    // Свободный слот в существующих блоках каталога
    for &blockno in &blocks {
        let blk = dev.read_block(blockno)?;
        let free = (0..DIRENTS_PER_BLOCK).find(|&s| {
            LittleEndian::read_u16(&blk.data[s * DIRENT_SIZE..s * DIRENT_SIZE + 2]) == 0
        });
        dev.release_block(blk);
        if let Some(slot) = free {
            return put_dirent(dev, blockno, slot, inum, name);
        }
    }

    // Новый блок
    if blocks.len() >= NDIRECT {
        bail!("directory {} is full", dir_inum);
    }
    let nb = balloc(dev, g)?;
    dir.addrs[blocks.len()] = nb;
    dir.size = ((blocks.len() + 1) * BSIZE) as u32;
    write_inode(dev, g, dir_inum, &dir)?;
    put_dirent(dev, nb, 0, inum, name)
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > DIRSIZ || name.contains('/') || name == "." || name == ".." {
        bail!("invalid name '{}'", name);
    }
    Ok(())
}

/// Split a path into (parent dir inode, last component).
fn resolve_parent<D: BlockDevice + ?Sized>(dev: &mut D, g: &Geometry, path: &str) -> Result<(u32, String)> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let (last, dirs) = parts
        .split_last()
        .ok_or_else(|| anyhow!("empty path"))?;
    let mut cur = ROOTINO;
    for d in dirs {
        cur = lookup(dev, g, cur, d)?.ok_or_else(|| anyhow!("no such directory '{}'", d))?;
    }
    Ok((cur, (*last).to_string()))
}

fn namei_in<D: BlockDevice + ?Sized>(dev: &mut D, g: &Geometry, path: &str) -> Result<Option<u32>> {
    if path.split('/').all(|p| p.is_empty()) {
        return Ok(Some(ROOTINO));
    }
    let (parent, name) = resolve_parent(dev, g, path)?;
    lookup(dev, g, parent, &name)
}

/// Inode number for `path`, None if absent.
pub fn namei<D: BlockDevice + ?Sized>(dev: &mut D, path: &str) -> Result<Option<u32>> {
    let g = read_geometry(dev)?;
    namei_in(dev, &g, path)
}

// ----------------------------- files -----------------------------

/// Create a regular file with `data`. Error if the name exists.
pub fn create_file<D: BlockDevice + ?Sized>(dev: &mut D, path: &str, data: &[u8]) -> Result<u32> {
    let g = read_geometry(dev)?;
    let (parent, name) = resolve_parent(dev, &g, path)?;
    check_name(&name)?;
    if lookup(dev, &g, parent, &name)?.is_some() {
        bail!("'{}' already exists", path);
    }
    let nblocks = (data.len() + BSIZE - 1) / BSIZE;
    if nblocks > MAXFILE {
        bail!("file too large: {} blocks > {}", nblocks, MAXFILE);
    }

    let inum = ialloc(dev, &g, InodeType::File)?;
    let mut ino = read_inode(dev, &g, inum)?;
    let mut indirect: Vec<u32> = Vec::new();

    for (i, chunk) in data.chunks(BSIZE).enumerate() {
        let b = balloc(dev, &g)?;
        let mut blk = Block::zeroed(dev.dev(), b);
        blk.data[..chunk.len()].copy_from_slice(chunk);
        dev.write_block(&blk)?;
        if i < NDIRECT {
            ino.addrs[i] = b;
        } else {
            indirect.push(b);
        }
    }

    if !indirect.is_empty() {
        debug_assert!(indirect.len() <= NINDIRECT);
        let ib = balloc(dev, &g)?;
        let mut blk = Block::zeroed(dev.dev(), ib);
        for (i, a) in indirect.iter().enumerate() {
            LittleEndian::write_u32(&mut blk.data[i * 4..i * 4 + 4], *a);
        }
        dev.write_block(&blk)?;
        ino.addrs[NDIRECT] = ib;
    }

    ino.size = data.len() as u32;
    write_inode(dev, &g, inum, &ino)?;
    dir_link(dev, &g, parent, &name, inum)?;
    debug!("create_file: {} -> inode {} ({} B)", path, inum, data.len());
    Ok(inum)
}

/// Create or replace a regular file.
pub fn write_file<D: BlockDevice + ?Sized>(dev: &mut D, path: &str, data: &[u8]) -> Result<u32> {
    if namei(dev, path)?.is_some() {
        unlink(dev, path)?;
    }
    create_file(dev, path, data)
}

pub fn read_file<D: BlockDevice + ?Sized>(dev: &mut D, path: &str) -> Result<Vec<u8>> {
    let g = read_geometry(dev)?;
    let inum = namei_in(dev, &g, path)?.ok_or_else(|| anyhow!("no such file '{}'", path))?;
    let ino = read_inode(dev, &g, inum)?;
    if ino.kind != InodeType::File {
        bail!("'{}' is not a regular file", path);
    }
    let (blocks, _) = inode_blocks(dev, &ino)?;
    let mut out = Vec::with_capacity(ino.size as usize);
    for b in blocks {
        let blk = dev.read_block(b)?;
        out.extend_from_slice(&blk.data[..]);
        dev.release_block(blk);
    }
    out.truncate(ino.size as usize);
    Ok(out)
}

pub fn mkdir<D: BlockDevice + ?Sized>(dev: &mut D, path: &str) -> Result<u32> {
    let g = read_geometry(dev)?;
    let (parent, name) = resolve_parent(dev, &g, path)?;
    check_name(&name)?;
    if lookup(dev, &g, parent, &name)?.is_some() {
        bail!("'{}' already exists", path);
    }

    let inum = ialloc(dev, &g, InodeType::Dir)?;
    let b = balloc(dev, &g)?;
    put_dirent(dev, b, 0, inum, ".")?;
    put_dirent(dev, b, 1, parent, "..")?;
    let mut ino = read_inode(dev, &g, inum)?;
    ino.addrs[0] = b;
    ino.size = BSIZE as u32;
    write_inode(dev, &g, inum, &ino)?;

    dir_link(dev, &g, parent, &name, inum)?;
    let mut p = read_inode(dev, &g, parent)?;
    p.nlink += 1;
    write_inode(dev, &g, parent, &p)?;
    debug!("mkdir: {} -> inode {}", path, inum);
    Ok(inum)
}

/// Remove a file or an empty directory.
pub fn unlink<D: BlockDevice + ?Sized>(dev: &mut D, path: &str) -> Result<()> {
    let g = read_geometry(dev)?;
    let (parent, name) = resolve_parent(dev, &g, path)?;
    let pdir = read_inode(dev, &g, parent)?;
    let entry = read_dirents(dev, &pdir)?
        .into_iter()
        .find(|e| e.name == name)
        .ok_or_else(|| anyhow!("no such entry '{}'", path))?;
    if name == "." || name == ".." {
        bail!("cannot unlink '{}'", name);
    }

    let ino = read_inode(dev, &g, entry.inum)?;
    if ino.kind == InodeType::Dir {
        let busy = read_dirents(dev, &ino)?
            .iter()
            .any(|e| e.name != "." && e.name != "..");
        if busy {
            bail!("directory '{}' not empty", path);
        }
        let mut p = read_inode(dev, &g, parent)?;
        p.nlink -= 1;
        write_inode(dev, &g, parent, &p)?;
    }

    // clear dirent, then release the inode and its blocks
    let mut blk = dev.read_block(entry.blockno)?;
    blk.data[entry.slot * DIRENT_SIZE..(entry.slot + 1) * DIRENT_SIZE].fill(0);
    dev.write_block(&blk)?;
    dev.release_block(blk);

    free_inode(dev, &g, entry.inum)?;
    debug!("unlink: {} (inode {})", path, entry.inum);
    Ok(())
}

/// Entries of a directory (without "." and "..").
pub fn list_dir<D: BlockDevice + ?Sized>(dev: &mut D, path: &str) -> Result<Vec<DirEntry>> {
    let g = read_geometry(dev)?;
    let inum = namei_in(dev, &g, path)?.ok_or_else(|| anyhow!("no such directory '{}'", path))?;
    let dir = read_inode(dev, &g, inum)?;
    if dir.kind != InodeType::Dir {
        bail!("'{}' is not a directory", path);
    }
    let mut out = Vec::new();
    for e in read_dirents(dev, &dir)? {
        if e.name == "." || e.name == ".." {
            continue;
        }
        let ino = read_inode(dev, &g, e.inum)?;
        out.push(DirEntry {
            name: e.name,
            inum: e.inum,
            kind: ino.kind,
            size: ino.size,
        });
    }
    Ok(out)
}
