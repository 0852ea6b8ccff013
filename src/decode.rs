// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Turning an inode's block mapping into the ranges reported for it.
//!
//! Unlike [`crate::block_map`], which lists every data block so that
//! directories can be read, these decoders only look at what the
//! reported ranges are made of: the leaves of an extent tree, or the
//! direct block pointers of a classic inode.

use crate::error::Ext4Error;
use crate::inode::Inode;
use crate::ranges::{BlockRange, coalesce};
use crate::volume::Volume;

/// Get the physical ranges of each leaf of the extent tree of `inode`,
/// in tree order.
///
/// `blkcount` tracks the logical start of the last leaf taken. A leaf
/// that ends at or before it has already been covered and is skipped.
pub(crate) fn decode_extents<V: Volume>(
    volume: &V,
    inode: &Inode,
) -> Result<Vec<BlockRange>, Ext4Error> {
    let mut ranges = Vec::new();
    let mut blkcount: u64 = 0;

    for extent in volume.extents(inode)? {
        let extent = extent?;
        if !extent.is_leaf || extent.len == 0 {
            continue;
        }

        let logical_start = u64::from(extent.logical_start);
        let len = u64::from(extent.len);
        if logical_start + len <= blkcount {
            continue;
        }

        // Physical block numbers are 48 bits, so this can't overflow.
        let start = extent.physical_start;
        ranges.push(BlockRange::new(start, start + (len - 1)));
        blkcount = logical_start;
    }

    Ok(ranges)
}

/// Get the ranges of the direct block pointers of `inode`. Holes are
/// dropped. Blocks reached through indirect pointers are not included.
pub(crate) fn decode_classic(inode: &Inode) -> Vec<BlockRange> {
    if !inode.has_block_pointers() {
        return Vec::new();
    }
    coalesce(
        inode
            .direct_blocks()
            .into_iter()
            .filter(|block| *block != 0)
            .map(u64::from),
    )
}
