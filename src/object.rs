// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::inode::Inode;
use crate::ranges::BlockRange;
use std::fmt::{self, Display, Formatter};

/// How an object's data is located on disk.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BlockMappingKind {
    /// Data blocks are addressed by the classic block pointer array.
    ClassicData,

    /// Data blocks are addressed by an extent tree.
    ExtentMapped,

    /// The object is a directory, reported by inode number only.
    DirectoryItself,
}

impl BlockMappingKind {
    /// Get the kind of a non-directory inode from its flags.
    pub(crate) fn of_file(inode: &Inode) -> Self {
        if inode.uses_extents() {
            Self::ExtentMapped
        } else {
            Self::ClassicData
        }
    }

    /// Single-character tag: `D` for a directory, `e` for extent
    /// mapped, `d` for classic data.
    #[must_use]
    pub fn flag(self) -> char {
        match self {
            Self::ClassicData => 'd',
            Self::ExtentMapped => 'e',
            Self::DirectoryItself => 'D',
        }
    }
}

impl Display for BlockMappingKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.flag())
    }
}

/// A file or directory found by a lookup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FilesystemObject {
    /// Inode number.
    pub inode: u64,

    /// How the data blocks are mapped.
    pub kind: BlockMappingKind,

    /// Data blocks, as non-overlapping ranges. Always empty for
    /// [`BlockMappingKind::DirectoryItself`].
    pub ranges: Vec<BlockRange>,

    /// Absolute path, or empty if the path could not be resolved.
    pub path: String,
}

impl FilesystemObject {
    /// Total number of blocks covered by [`Self::ranges`].
    #[must_use]
    pub fn num_blocks(&self) -> u64 {
        self.ranges
            .iter()
            .fold(0u64, |acc, range| acc.saturating_add(range.len()))
    }
}
