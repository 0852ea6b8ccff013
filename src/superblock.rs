// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::checksum::Checksum;
use crate::error::{Corrupt, Ext4Error, Incompatible};
use crate::features::{IncompatibleFeatures, ReadOnlyCompatibleFeatures};
use crate::util::{read_u16le, read_u32le, u64_from_hilo};

/// Information about the filesystem.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Superblock {
    pub(crate) block_size: u32,
    pub(crate) blocks_count: u64,
    pub(crate) inodes_count: u32,
    pub(crate) first_data_block: u32,
    pub(crate) inode_size: u16,
    pub(crate) inodes_per_block_group: u32,
    pub(crate) block_group_descriptor_size: u16,
    pub(crate) num_block_groups: u32,
    pub(crate) incompatible_features: IncompatibleFeatures,
    pub(crate) read_only_compatible_features: ReadOnlyCompatibleFeatures,
    pub(crate) checksum_seed: u32,
    pub(crate) uuid: [u8; 16],
}

impl Superblock {
    /// Size (in bytes) of the superblock on disk.
    pub(crate) const SIZE_IN_BYTES_ON_DISK: usize = 1024;

    /// Byte offset of the primary superblock.
    pub(crate) const PRIMARY_OFFSET: u64 = 1024;

    const MAGIC: u16 = 0xef53;

    /// Inode size used by revision 0 filesystems.
    const GOOD_OLD_INODE_SIZE: u16 = 128;

    /// Descriptor size used when the 64-bit feature is off.
    const GOOD_OLD_DESC_SIZE: u16 = 32;

    /// Largest `s_log_block_size` the kernel accepts (64KiB blocks).
    const MAX_LOG_BLOCK_SIZE: u32 = 6;

    /// Construct `Superblock` from bytes.
    ///
    /// If `check_features` is false the incompatible-feature policy is
    /// skipped. If `verify_checksum` is false the superblock checksum
    /// is not validated.
    ///
    /// # Panics
    ///
    /// Panics if the length of `bytes` is less than
    /// [`Self::SIZE_IN_BYTES_ON_DISK`].
    pub(crate) fn from_bytes(
        bytes: &[u8],
        check_features: bool,
        verify_checksum: bool,
    ) -> Result<Self, Ext4Error> {
        assert!(bytes.len() >= Self::SIZE_IN_BYTES_ON_DISK);

        let s_inodes_count = read_u32le(bytes, 0x0);
        let s_blocks_count_lo = read_u32le(bytes, 0x4);
        let s_first_data_block = read_u32le(bytes, 0x14);
        let s_log_block_size = read_u32le(bytes, 0x18);
        let s_blocks_per_group = read_u32le(bytes, 0x20);
        let s_inodes_per_group = read_u32le(bytes, 0x28);
        let s_magic = read_u16le(bytes, 0x38);
        let s_rev_level = read_u32le(bytes, 0x4c);
        let s_inode_size = read_u16le(bytes, 0x58);
        let s_feature_incompat = read_u32le(bytes, 0x60);
        let s_feature_ro_compat = read_u32le(bytes, 0x64);
        let mut uuid = [0; 16];
        uuid.copy_from_slice(&bytes[0x68..0x68 + 16]);
        let s_desc_size = read_u16le(bytes, 0xfe);
        let s_blocks_count_hi = read_u32le(bytes, 0x150);
        let s_checksum_seed = read_u32le(bytes, 0x270);
        const S_CHECKSUM_OFFSET: usize = 0x3fc;
        let s_checksum = read_u32le(bytes, S_CHECKSUM_OFFSET);

        if s_magic != Self::MAGIC {
            return Err(Corrupt::SuperblockMagic.into());
        }

        if s_log_block_size > Self::MAX_LOG_BLOCK_SIZE {
            return Err(Corrupt::BlockSize(s_log_block_size).into());
        }
        let block_size = 1024u32 << s_log_block_size;

        let raw_incompat =
            IncompatibleFeatures::from_bits_retain(s_feature_incompat);
        let incompatible_features = if check_features {
            check_incompat_features(s_feature_incompat)?
        } else {
            raw_incompat
        };
        let read_only_compatible_features =
            ReadOnlyCompatibleFeatures::from_bits_retain(s_feature_ro_compat);

        let is_64bit =
            incompatible_features.contains(IncompatibleFeatures::IS_64BIT);
        let blocks_count = if is_64bit {
            u64_from_hilo(s_blocks_count_hi, s_blocks_count_lo)
        } else {
            u64::from(s_blocks_count_lo)
        };

        if s_blocks_per_group == 0 || s_inodes_per_group == 0 {
            return Err(Corrupt::BlockGroupGeometry.into());
        }
        // s_first_data_block is usually 1 if the block size is 1KiB,
        // and otherwise its usually 0.
        let num_data_blocks = blocks_count
            .checked_sub(u64::from(s_first_data_block))
            .ok_or(Corrupt::BlockGroupGeometry)?;
        let num_block_groups = u32::try_from(
            num_data_blocks.div_ceil(u64::from(s_blocks_per_group)),
        )
        .map_err(|_| Corrupt::BlockGroupGeometry)?;

        let inode_size = if s_rev_level == 0 {
            Self::GOOD_OLD_INODE_SIZE
        } else {
            s_inode_size
        };
        // A power of two no larger than the block size divides it, so
        // no inode record crosses a block boundary.
        if inode_size < Self::GOOD_OLD_INODE_SIZE
            || !inode_size.is_power_of_two()
            || block_size < u32::from(inode_size)
        {
            return Err(Corrupt::BlockGroupGeometry.into());
        }

        let block_group_descriptor_size = if is_64bit {
            s_desc_size
        } else {
            Self::GOOD_OLD_DESC_SIZE
        };
        if block_group_descriptor_size < Self::GOOD_OLD_DESC_SIZE
            || u32::from(block_group_descriptor_size) > block_size
        {
            return Err(Corrupt::BlockGroupGeometry.into());
        }

        if verify_checksum
            && read_only_compatible_features
                .contains(ReadOnlyCompatibleFeatures::METADATA_CHECKSUMS)
        {
            let mut checksum = Checksum::new();
            checksum.update(&bytes[..S_CHECKSUM_OFFSET]);
            if s_checksum != checksum.finalize() {
                return Err(Corrupt::SuperblockChecksum.into());
            }
        }

        let checksum_seed = if incompatible_features
            .contains(IncompatibleFeatures::CHECKSUM_SEED_IN_SUPERBLOCK)
        {
            s_checksum_seed
        } else {
            let mut checksum = Checksum::new();
            checksum.update(&uuid);
            checksum.finalize()
        };

        Ok(Self {
            block_size,
            blocks_count,
            inodes_count: s_inodes_count,
            first_data_block: s_first_data_block,
            inode_size,
            inodes_per_block_group: s_inodes_per_group,
            block_group_descriptor_size,
            num_block_groups,
            incompatible_features,
            read_only_compatible_features,
            checksum_seed,
            uuid,
        })
    }

    pub(crate) fn has_metadata_checksums(&self) -> bool {
        self.read_only_compatible_features
            .contains(ReadOnlyCompatibleFeatures::METADATA_CHECKSUMS)
    }

    /// True if block group descriptors carry a checksum of either kind.
    /// Only then can the uninit flags and `itable_unused` be trusted.
    pub(crate) fn has_group_descriptor_checksums(&self) -> bool {
        self.has_metadata_checksums()
            || self.read_only_compatible_features.contains(
                ReadOnlyCompatibleFeatures::GROUP_DESCRIPTOR_CHECKSUMS,
            )
    }

    pub(crate) fn has_file_type_in_dir_entry(&self) -> bool {
        self.incompatible_features
            .contains(IncompatibleFeatures::FILE_TYPE_IN_DIR_ENTRY)
    }
}

fn check_incompat_features(
    s_feature_incompat: u32,
) -> Result<IncompatibleFeatures, Incompatible> {
    let actual = IncompatibleFeatures::from_bits_retain(s_feature_incompat);
    let actual_known =
        IncompatibleFeatures::from_bits_truncate(s_feature_incompat);
    if actual != actual_known {
        return Err(Incompatible::Unknown(actual.difference(actual_known)));
    }

    // Every other feature only changes data this library never reads
    // (or reads the same way regardless).
    let disallowed_features = IncompatibleFeatures::COMPRESSION
        | IncompatibleFeatures::JOURNAL_DEVICE
        | IncompatibleFeatures::META_BLOCK_GROUPS;

    let present_disallowed = actual & disallowed_features;
    if !present_disallowed.is_empty() {
        return Err(Incompatible::Incompatible(present_disallowed));
    }

    if actual.contains(IncompatibleFeatures::RECOVERY) {
        log::warn!(
            "filesystem needs journal recovery; \
             results may not reflect the latest state"
        );
    }

    Ok(actual)
}
