// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::Ext4;
use crate::checksum::Checksum;
use crate::error::{Corrupt, Ext4Error};
use crate::file_type::FileType;
use crate::util::{read_u16le, read_u32le, u64_from_hilo, usize_from_u32};
use bitflags::bitflags;
use std::num::NonZeroU32;

/// Inode index.
///
/// This is always nonzero.
pub(crate) type InodeIndex = NonZeroU32;

bitflags! {
    /// Inode flags.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub(crate) struct InodeFlags: u32 {
        /// File is immutable.
        const IMMUTABLE = 0x10;

        /// Directory has hashed indexes.
        const DIRECTORY_HTREE = 0x1000;

        /// File is huge.
        const HUGE_FILE = 0x4_0000;

        /// Inode uses extents.
        const EXTENTS = 0x8_0000;

        /// Inode stores a large extended attribute value in its data blocks.
        const EXTENDED_ATTRIBUTES = 0x20_0000;

        /// Inode has inline data.
        const INLINE_DATA = 0x1000_0000;
    }
}

bitflags! {
    /// Inode mode.
    ///
    /// The mode bitfield stores file permissions in the lower bits and
    /// file type in the upper bits. Only the file type is of interest
    /// here.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub(crate) struct InodeMode: u16 {
        // Mutually-exclusive file types:
        const S_IFIFO = 0x1000;
        const S_IFCHR = 0x2000;
        const S_IFDIR = 0x4000;
        const S_IFBLK = 0x6000;
        const S_IFREG = 0x8000;
        const S_IFLNK = 0xA000;
        const S_IFSOCK = 0xC000;
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Inode {
    /// This inode's index.
    pub(crate) index: InodeIndex,

    /// Various kinds of data can be stored within the inode, including:
    /// * Direct and indirect block pointers.
    /// * The root node of the extent tree.
    /// * Target path for fast symlinks.
    pub(crate) inline_data: [u8; Self::INLINE_DATA_LEN],

    /// Size in bytes of the file data.
    pub(crate) size_in_bytes: u64,

    /// Raw permissions and file type.
    pub(crate) mode: InodeMode,

    /// Number of directory entries referring to this inode. Zero for
    /// unused or deleted inodes.
    pub(crate) links_count: u16,

    /// Internal inode flags.
    pub(crate) flags: InodeFlags,

    /// Checksum state seeded with the filesystem seed, inode index,
    /// and generation. Extent nodes build on it. `None` if metadata
    /// checksums are not being verified.
    pub(crate) checksum_base: Option<Checksum>,
}

impl Inode {
    const INLINE_DATA_LEN: usize = 60;
    const GOOD_OLD_SIZE: usize = 128;
    const L_I_CHECKSUM_LO_OFFSET: usize = 0x7c;
    const I_CHECKSUM_HI_OFFSET: usize = 0x82;

    /// Number of direct block pointers in `i_block`.
    pub(crate) const NUM_DIRECT_BLOCKS: usize = 12;

    /// Parse an inode record.
    ///
    /// If `checksum_seed` is set, the inode checksum is verified against
    /// it and the result carries a `checksum_base`.
    pub(crate) fn from_bytes(
        index: InodeIndex,
        data: &[u8],
        checksum_seed: Option<u32>,
    ) -> Result<Self, Ext4Error> {
        if data.len() < Self::GOOD_OLD_SIZE {
            return Err(Corrupt::Inode(index.get()).into());
        }

        let i_mode = read_u16le(data, 0x0);
        let i_size_lo = read_u32le(data, 0x4);
        let i_links_count = read_u16le(data, 0x1a);
        let i_flags = read_u32le(data, 0x20);
        let i_generation = read_u32le(data, 0x64);
        let i_size_high = read_u32le(data, 0x6c);
        let l_i_checksum_lo = read_u16le(data, Self::L_I_CHECKSUM_LO_OFFSET);
        let mut inline_data = [0; Self::INLINE_DATA_LEN];
        inline_data
            .copy_from_slice(&data[0x28..0x28 + Self::INLINE_DATA_LEN]);

        // The high half of the checksum only exists if the extra inode
        // fields are large enough to hold it.
        let i_checksum_hi = if data.len() > Self::GOOD_OLD_SIZE {
            let i_extra_isize = usize::from(read_u16le(data, 0x80));
            if i_extra_isize >= 4 {
                Some(read_u16le(data, Self::I_CHECKSUM_HI_OFFSET))
            } else {
                None
            }
        } else {
            None
        };

        let checksum_base = checksum_seed.map(|seed| {
            let mut checksum = Checksum::with_seed(seed);
            checksum.update_u32_le(index.get());
            checksum.update_u32_le(i_generation);
            checksum
        });

        if let Some(base) = &checksum_base {
            let mut checksum = base.clone();
            checksum.update(&data[..Self::L_I_CHECKSUM_LO_OFFSET]);
            checksum.update_u16_le(0);
            if i_checksum_hi.is_some() {
                checksum.update(
                    &data[Self::L_I_CHECKSUM_LO_OFFSET + 2
                        ..Self::I_CHECKSUM_HI_OFFSET],
                );
                checksum.update_u16_le(0);
                checksum.update(&data[Self::I_CHECKSUM_HI_OFFSET + 2..]);
            } else {
                checksum.update(&data[Self::L_I_CHECKSUM_LO_OFFSET + 2..]);
            }
            let actual = checksum.finalize();

            let matches = match i_checksum_hi {
                Some(hi) => {
                    actual
                        == (u32::from(hi) << 16) | u32::from(l_i_checksum_lo)
                }
                None => actual & 0xffff == u32::from(l_i_checksum_lo),
            };
            if !matches {
                return Err(Corrupt::InodeChecksum(index.get()).into());
            }
        }

        Ok(Self {
            index,
            inline_data,
            size_in_bytes: u64_from_hilo(i_size_high, i_size_lo),
            mode: InodeMode::from_bits_retain(i_mode),
            links_count: i_links_count,
            flags: InodeFlags::from_bits_retain(i_flags),
            checksum_base,
        })
    }

    /// Read an inode from the inode table.
    pub(crate) fn read(
        ext4: &Ext4,
        index: InodeIndex,
    ) -> Result<Self, Ext4Error> {
        let (block, offset) = ext4.inode_location(index)?;
        let mut data = vec![0; usize::from(ext4.superblock().inode_size)];
        ext4.read_from_block(block, offset, &mut data)?;
        Self::from_bytes(index, &data, ext4.metadata_checksum_seed())
    }

    /// File type parsed from the `mode` bitfield, if valid.
    pub(crate) fn file_type(&self) -> Option<FileType> {
        FileType::try_from(self.mode).ok()
    }

    pub(crate) fn is_dir(&self) -> bool {
        self.file_type() == Some(FileType::Directory)
    }

    pub(crate) fn uses_extents(&self) -> bool {
        self.flags.contains(InodeFlags::EXTENTS)
    }

    /// True if `i_block` holds block pointers, rather than a fast
    /// symlink target, a device number, or inline data.
    pub(crate) fn has_block_pointers(&self) -> bool {
        if self.uses_extents() || self.flags.contains(InodeFlags::INLINE_DATA) {
            return false;
        }
        match self.file_type() {
            Some(FileType::Regular | FileType::Directory) => true,
            // Short targets are stored in `i_block` itself.
            Some(FileType::Symlink) => {
                // OK to unwrap: the length is 60.
                let inline_len = u64::try_from(Self::INLINE_DATA_LEN).unwrap();
                self.size_in_bytes >= inline_len
            }
            _ => false,
        }
    }

    /// Get the twelve direct block pointers, in file order.
    ///
    /// Only meaningful if [`Self::has_block_pointers`] is true.
    pub(crate) fn direct_blocks(&self) -> [u32; Self::NUM_DIRECT_BLOCKS] {
        std::array::from_fn(|i| read_u32le(&self.inline_data, i * 4))
    }

    /// Get the single, double, and triple indirect block pointers.
    pub(crate) fn indirect_blocks(&self) -> [u32; 3] {
        std::array::from_fn(|i| {
            read_u32le(&self.inline_data, (Self::NUM_DIRECT_BLOCKS + i) * 4)
        })
    }

    /// Number of blocks needed to hold the file data.
    pub(crate) fn num_blocks(&self, block_size: u32) -> u64 {
        self.size_in_bytes.div_ceil(u64::from(block_size))
    }
}

impl Ext4 {
    /// Get the block and byte offset within that block of an inode's
    /// on-disk record.
    pub(crate) fn inode_location(
        &self,
        index: InodeIndex,
    ) -> Result<(u64, u32), Ext4Error> {
        let sb = self.superblock();
        if index.get() > sb.inodes_count {
            return Err(Corrupt::InodeIndex(u64::from(index.get())).into());
        }

        let index_zero = index.get() - 1;
        let group = index_zero / sb.inodes_per_block_group;
        let index_within_group = index_zero % sb.inodes_per_block_group;

        let bgd = self
            .block_group_descriptors()
            .get(usize_from_u32(group))
            .ok_or(Corrupt::InodeIndex(u64::from(index.get())))?;

        let byte_offset =
            u64::from(index_within_group) * u64::from(sb.inode_size);
        let block_size = u64::from(sb.block_size);
        let block = bgd.inode_table_first_block + byte_offset / block_size;
        // OK to unwrap: the remainder is less than the block size.
        let offset = u32::try_from(byte_offset % block_size).unwrap();
        Ok((block, offset))
    }
}
