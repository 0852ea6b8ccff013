// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use bitflags::bitflags;

bitflags! {
    /// Flags controlling how a volume is opened.
    ///
    /// The values match the corresponding `EXT2_FLAG_*` constants of
    /// libext2fs.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct OpenFlags: u32 {
        /// Open the volume even if it uses incompatible features the
        /// locator does not understand.
        const FORCE = 0x400;

        /// Do not verify metadata checksums.
        const IGNORE_CSUM_ERRORS = 0x20_0000;
    }
}

/// Options for opening a volume.
///
/// ```
/// use ext4_locate::{OpenFlags, OpenOptions};
///
/// // Open from the backup superblock of group 1 of a 4KiB filesystem.
/// let options = OpenOptions::new()
///     .superblock(32768)
///     .block_size(4096)
///     .flags(OpenFlags::IGNORE_CSUM_ERRORS);
/// assert_eq!(options.superblock, Some(32768));
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct OpenOptions {
    /// Open flags.
    pub flags: OpenFlags,

    /// Block number of the superblock to use instead of the primary
    /// one, in units of `block_size`. Requires `block_size`.
    pub superblock: Option<u64>,

    /// Expected block size. Opening fails if the superblock records a
    /// different size.
    pub block_size: Option<u32>,
}

impl OpenOptions {
    /// Options for opening from the primary superblock, with checksum
    /// verification and feature checks enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the open flags.
    #[must_use]
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Read the superblock from block `block` instead of the primary
    /// location.
    #[must_use]
    pub fn superblock(mut self, block: u64) -> Self {
        self.superblock = Some(block);
        self
    }

    /// Set the expected block size.
    #[must_use]
    pub fn block_size(mut self, block_size: u32) -> Self {
        self.block_size = Some(block_size);
        self
    }

    pub(crate) fn verify_checksums(&self) -> bool {
        !self.flags.contains(OpenFlags::IGNORE_CSUM_ERRORS)
    }

    pub(crate) fn check_features(&self) -> bool {
        !self.flags.contains(OpenFlags::FORCE)
    }
}
