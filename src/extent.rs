// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::block_index::{FileBlockIndex, FsBlockIndex};

/// Entry in an extent tree, as yielded by the extent cursor.
///
/// Leaf entries describe a contiguous run of blocks holding file data.
/// Index entries point at a lower tree node; for those `len` is zero
/// and `physical_start` is the block holding the child node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Extent {
    /// Offset of the first block within the file.
    pub(crate) logical_start: FileBlockIndex,

    /// First block within the filesystem.
    pub(crate) physical_start: FsBlockIndex,

    /// Number of blocks (both within the file, and on the filesystem).
    pub(crate) len: u16,

    pub(crate) is_leaf: bool,

    /// The blocks are allocated but have not been written yet.
    pub(crate) is_uninit: bool,
}

impl Extent {
    /// Largest length of an initialized extent. Larger `ee_len` values
    /// mark uninitialized extents, with the length biased by this
    /// amount.
    const INIT_MAX_LEN: u16 = 32768;

    /// Create a leaf extent from the raw on-disk `ee_len`.
    pub(crate) fn leaf(
        logical_start: FileBlockIndex,
        ee_len: u16,
        physical_start: FsBlockIndex,
    ) -> Self {
        let (len, is_uninit) = if ee_len > Self::INIT_MAX_LEN {
            (ee_len - Self::INIT_MAX_LEN, true)
        } else {
            (ee_len, false)
        };
        Self {
            logical_start,
            physical_start,
            len,
            is_leaf: true,
            is_uninit,
        }
    }

    /// Create an index entry pointing at the node in `child_block`.
    pub(crate) fn index(
        logical_start: FileBlockIndex,
        child_block: FsBlockIndex,
    ) -> Self {
        Self {
            logical_start,
            physical_start: child_block,
            len: 0,
            is_leaf: false,
            is_uninit: false,
        }
    }
}
