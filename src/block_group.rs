// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::checksum::{Checksum, Crc16};
use crate::error::{Corrupt, Ext4Error};
use crate::reader::Ext4Read;
use crate::superblock::Superblock;
use crate::util::{read_u16le, read_u32le, u64_from_hilo};
use bitflags::bitflags;

pub(crate) type BlockGroupIndex = u32;

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub(crate) struct BlockGroupFlags: u16 {
        /// Inode table and bitmap are not initialized.
        const INODE_UNINIT = 0x1;
        /// Block bitmap is not initialized.
        const BLOCK_UNINIT = 0x2;
        /// Inode table is zeroed.
        const INODE_ZEROED = 0x4;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct BlockGroupDescriptor {
    pub(crate) inode_table_first_block: u64,
    pub(crate) flags: BlockGroupFlags,

    /// Number of inodes at the end of the inode table that have never
    /// been used.
    pub(crate) itable_unused: u32,
}

impl BlockGroupDescriptor {
    const BG_CHECKSUM_OFFSET: usize = 0x1e;

    fn from_bytes(
        sb: &Superblock,
        bgd_index: BlockGroupIndex,
        bytes: &[u8],
        verify_checksum: bool,
    ) -> Result<Self, Ext4Error> {
        let bg_inode_table_lo = read_u32le(bytes, 0x8);
        let bg_flags = read_u16le(bytes, 0x12);
        let bg_itable_unused_lo = read_u16le(bytes, 0x1c);
        let bg_checksum = read_u16le(bytes, Self::BG_CHECKSUM_OFFSET);

        // The high halves only exist in 64-byte descriptors.
        let (bg_inode_table_hi, bg_itable_unused_hi) = if bytes.len() >= 64 {
            (read_u32le(bytes, 0x28), read_u16le(bytes, 0x32))
        } else {
            (0, 0)
        };

        if verify_checksum {
            let expected = Self::checksum(sb, bgd_index, bytes);
            if let Some(expected) = expected {
                if expected != bg_checksum {
                    return Err(Corrupt::BlockGroupDescriptorChecksum(
                        bgd_index,
                    )
                    .into());
                }
            }
        }

        let inode_table_first_block =
            u64_from_hilo(bg_inode_table_hi, bg_inode_table_lo);

        // The inode table must fit within the filesystem.
        let table_bytes = u64::from(sb.inodes_per_block_group)
            * u64::from(sb.inode_size);
        let table_blocks = table_bytes.div_ceil(u64::from(sb.block_size));
        let table_end = inode_table_first_block
            .checked_add(table_blocks)
            .ok_or(Corrupt::BlockGroupDescriptor(bgd_index))?;
        if inode_table_first_block == 0 || table_end > sb.blocks_count {
            return Err(Corrupt::BlockGroupDescriptor(bgd_index).into());
        }

        Ok(Self {
            inode_table_first_block,
            flags: BlockGroupFlags::from_bits_retain(bg_flags),
            itable_unused: (u32::from(bg_itable_unused_hi) << 16)
                | u32::from(bg_itable_unused_lo),
        })
    }

    /// Calculate the expected descriptor checksum, or `None` if the
    /// filesystem does not checksum its descriptors.
    fn checksum(
        sb: &Superblock,
        bgd_index: BlockGroupIndex,
        bytes: &[u8],
    ) -> Option<u16> {
        let before = &bytes[..Self::BG_CHECKSUM_OFFSET];
        let after = &bytes[Self::BG_CHECKSUM_OFFSET + 2..];

        if sb.has_metadata_checksums() {
            let mut checksum = Checksum::with_seed(sb.checksum_seed);
            checksum.update_u32_le(bgd_index);
            checksum.update(before);
            checksum.update_u16_le(0);
            checksum.update(after);
            // Truncate to the lower 16 bits.
            // OK to unwrap: masked to 16 bits.
            Some(u16::try_from(checksum.finalize() & 0xffff).unwrap())
        } else if sb.has_group_descriptor_checksums() {
            let mut checksum = Crc16::new();
            checksum.update(&sb.uuid);
            checksum.update(&bgd_index.to_le_bytes());
            checksum.update(before);
            checksum.update(after);
            Some(checksum.finalize())
        } else {
            None
        }
    }

    /// Read every block group descriptor. The table begins at the start
    /// of block `table_block`.
    pub(crate) fn read_all(
        sb: &Superblock,
        reader: &mut dyn Ext4Read,
        table_block: u64,
        verify_checksums: bool,
    ) -> Result<Vec<Self>, Ext4Error> {
        let desc_size = usize::from(sb.block_group_descriptor_size);
        let num_groups = usize::try_from(sb.num_block_groups)
            .map_err(|_| Corrupt::BlockGroupGeometry)?;
        let table_len = desc_size
            .checked_mul(num_groups)
            .ok_or(Corrupt::BlockGroupGeometry)?;
        let start = table_block
            .checked_mul(u64::from(sb.block_size))
            .ok_or(Corrupt::BlockGroupGeometry)?;

        let mut data = vec![0; table_len];
        reader.read(start, &mut data)?;

        data.chunks_exact(desc_size)
            .zip(0..sb.num_block_groups)
            .map(|(bytes, bgd_index)| {
                Self::from_bytes(sb, bgd_index, bytes, verify_checksums)
            })
            .collect()
    }
}
