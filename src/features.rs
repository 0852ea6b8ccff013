// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![allow(missing_docs)]

use bitflags::bitflags;

bitflags! {
    /// File system features that affect whether the data can be read.
    ///
    /// The locator must know how to handle the presence or absence of
    /// each of these to walk the inode table and directories safely.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub struct IncompatibleFeatures: u32 {
        const COMPRESSION = 0x1;

        /// Directory entries store the file type, and the name length
        /// is a single byte.
        const FILE_TYPE_IN_DIR_ENTRY = 0x2;

        /// Filesystem needs journal recovery.
        const RECOVERY = 0x4;

        /// This is an external journal device, not a filesystem.
        const JOURNAL_DEVICE = 0x8;

        const META_BLOCK_GROUPS = 0x10;
        const EXTENTS = 0x40;

        /// Block numbers may be 64 bits wide and block group
        /// descriptors may be larger than 32 bytes.
        const IS_64BIT = 0x80;

        const MULTIPLE_MOUNT_PROTECTION = 0x100;
        const FLEXIBLE_BLOCK_GROUPS = 0x200;
        const LARGE_EXTENDED_ATTRIBUTES_IN_INODES = 0x400;
        const DATA_IN_DIR_ENTRY = 0x1000;

        /// The superblock contains the checksum seed. If not present,
        /// the checksum seed is calculated from the filesystem UUID.
        const CHECKSUM_SEED_IN_SUPERBLOCK = 0x2000;

        const LARGE_DIRECTORIES = 0x4000;
        const DATA_IN_INODE = 0x8000;
        const ENCRYPTED_INODES = 0x1_0000;
        const CASE_FOLDING = 0x2_0000;
    }

    /// File system features that do not prevent read-only access to the data.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub(crate) struct ReadOnlyCompatibleFeatures: u32 {
        const SPARSE_SUPERBLOCKS = 0x1;
        const LARGE_FILES = 0x2;
        const BTREE_DIR = 0x4;
        const HUGE_FILES = 0x8;

        /// Block group descriptors have a crc16 checksum, and may be
        /// flagged as uninitialized.
        const GROUP_DESCRIPTOR_CHECKSUMS = 0x10;

        const LARGE_DIRECTORIES = 0x20;
        const LARGE_INODES = 0x40;
        const HAS_SNAPSHOT = 0x80;
        const QUOTA = 0x100;
        const BIG_ALLOC = 0x200;

        /// Metadata is protected by crc32c checksums. Supersedes
        /// `GROUP_DESCRIPTOR_CHECKSUMS`.
        const METADATA_CHECKSUMS = 0x400;

        const REPLICA = 0x800;
        const READ_ONLY = 0x1000;
        const PROJECT_QUOTAS = 0x2000;
        const VERITY = 0x8000;
        const ORPHAN_PRESENT = 0x1_0000;
    }
}
