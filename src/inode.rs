//! On-disk inode records (read-only view used by the content walks).
//!
//! Layout (64 bytes, LE):
//! [type i16][major i16][minor i16][nlink i16][size u32][addrs u32 x (NDIRECT + 1)]
//!
//! addrs[0..NDIRECT] are direct blocks, addrs[NDIRECT] is the single indirect
//! block whose content is NINDIRECT u32 block numbers. A zero address means
//! "unused"; direct scans stop at the first zero.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    BSIZE, DINODE_OFF_ADDRS, DINODE_OFF_MAJOR, DINODE_OFF_MINOR, DINODE_OFF_NLINK,
    DINODE_OFF_SIZE, DINODE_OFF_TYPE, DINODE_SIZE, IPB, NDIRECT, NINDIRECT, T_DEVICE, T_DIR,
    T_FILE, T_FREE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    Free,
    Dir,
    File,
    Device,
    Unknown(i16),
}

impl InodeType {
    pub fn from_tag(tag: i16) -> Self {
        match tag {
            T_FREE => InodeType::Free,
            T_DIR => InodeType::Dir,
            T_FILE => InodeType::File,
            T_DEVICE => InodeType::Device,
            other => InodeType::Unknown(other),
        }
    }

    pub fn tag(&self) -> i16 {
        match *self {
            InodeType::Free => T_FREE,
            InodeType::Dir => T_DIR,
            InodeType::File => T_FILE,
            InodeType::Device => T_DEVICE,
            InodeType::Unknown(t) => t,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInode {
    pub kind: InodeType,
    pub major: i16,
    pub minor: i16,
    pub nlink: i16,
    pub size: u32,
    pub addrs: [u32; NDIRECT + 1],
}

impl DiskInode {
    pub fn empty() -> Self {
        Self {
            kind: InodeType::Free,
            major: 0,
            minor: 0,
            nlink: 0,
            size: 0,
            addrs: [0; NDIRECT + 1],
        }
    }

    pub fn decode(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= DINODE_SIZE);
        let mut addrs = [0u32; NDIRECT + 1];
        for (i, a) in addrs.iter_mut().enumerate() {
            let off = DINODE_OFF_ADDRS + i * 4;
            *a = LittleEndian::read_u32(&buf[off..off + 4]);
        }
        Self {
            kind: InodeType::from_tag(LittleEndian::read_i16(&buf[DINODE_OFF_TYPE..])),
            major: LittleEndian::read_i16(&buf[DINODE_OFF_MAJOR..]),
            minor: LittleEndian::read_i16(&buf[DINODE_OFF_MINOR..]),
            nlink: LittleEndian::read_i16(&buf[DINODE_OFF_NLINK..]),
            size: LittleEndian::read_u32(&buf[DINODE_OFF_SIZE..]),
            addrs,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i16(&mut buf[DINODE_OFF_TYPE..], self.kind.tag());
        LittleEndian::write_i16(&mut buf[DINODE_OFF_MAJOR..], self.major);
        LittleEndian::write_i16(&mut buf[DINODE_OFF_MINOR..], self.minor);
        LittleEndian::write_i16(&mut buf[DINODE_OFF_NLINK..], self.nlink);
        LittleEndian::write_u32(&mut buf[DINODE_OFF_SIZE..], self.size);
        for (i, a) in self.addrs.iter().enumerate() {
            let off = DINODE_OFF_ADDRS + i * 4;
            LittleEndian::write_u32(&mut buf[off..off + 4], *a);
        }
    }

    /// Direct addresses up to (not including) the first zero slot.
    pub fn direct_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.addrs[..NDIRECT].iter().copied().take_while(|&a| a != 0)
    }

    /// Indirect block address, None when the slot is zero.
    pub fn indirect(&self) -> Option<u32> {
        match self.addrs[NDIRECT] {
            0 => None,
            a => Some(a),
        }
    }

    /// Has content the walks should look at.
    pub fn is_live(&self) -> bool {
        self.size > 0 && matches!(self.kind, InodeType::Dir | InodeType::File)
    }
}

/// Byte range of inode `inum` inside its inode block.
#[inline]
pub fn inode_offset_in_block(inum: u32) -> usize {
    (inum as usize % IPB) * DINODE_SIZE
}

/// Inode block (relative to inodestart) holding inode `inum`.
#[inline]
pub fn inode_block_index(inum: u32) -> u32 {
    inum / IPB as u32
}

/// Iterate (inum, inode) over a buffer of consecutive inode blocks.
pub fn inodes_in(buf: &[u8]) -> impl Iterator<Item = (u32, DiskInode)> + '_ {
    buf.chunks_exact(DINODE_SIZE)
        .enumerate()
        .map(|(i, rec)| (i as u32, DiskInode::decode(rec)))
}

/// Addresses stored in an indirect block, in slot order (zeros included).
pub fn indirect_entries(block: &[u8; BSIZE]) -> impl Iterator<Item = u32> + '_ {
    (0..NINDIRECT).map(move |i| LittleEndian::read_u32(&block[i * 4..i * 4 + 4]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_encode_keeps_fields() {
        let mut ino = DiskInode::empty();
        ino.kind = InodeType::File;
        ino.nlink = 1;
        ino.size = 5000;
        ino.addrs[0] = 70;
        ino.addrs[1] = 71;
        ino.addrs[NDIRECT] = 99;
        let mut buf = [0u8; DINODE_SIZE];
        ino.encode(&mut buf);
        assert_eq!(DiskInode::decode(&buf), ino);
    }

    #[test]
    fn direct_scan_stops_at_first_zero() {
        let mut ino = DiskInode::empty();
        ino.addrs[0] = 10;
        ino.addrs[1] = 11;
        ino.addrs[3] = 13; // after a hole: not visited
        assert_eq!(ino.direct_blocks().collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(ino.indirect(), None);
    }

    #[test]
    fn unknown_type_is_not_live() {
        let mut buf = [0u8; DINODE_SIZE];
        LittleEndian::write_i16(&mut buf[0..2], 7);
        LittleEndian::write_u32(&mut buf[8..12], 100);
        let ino = DiskInode::decode(&buf);
        assert_eq!(ino.kind, InodeType::Unknown(7));
        assert!(!ino.is_live());
    }

    #[test]
    fn inode_position_math() {
        assert_eq!(inode_block_index(17), 1);
        assert_eq!(inode_offset_in_block(17), 64);
    }
}
