// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Listing the data blocks of an inode, in file order.
//!
//! This is only used to read directories, so the whole list is
//! collected at once.
//!
//! Block maps are how file data was stored prior to extents. The root
//! of the block map is stored directly in the inode as 15 block
//! indices. Indices `0..=11` point directly to a block of file data.
//! Index 12 points to an indirect block holding an array of direct
//! indices; index 13 to a doubly-indirect block, and index 14 to a
//! triply-indirect block. Indices are only initialized up to the size
//! of the file, and zero marks a hole.

use crate::Ext4;
use crate::error::Ext4Error;
use crate::inode::Inode;
use crate::iters::extents::ExtentCursor;
use crate::util::{read_u32le, usize_from_u32};

/// Get the absolute index of each data block of `inode`, in file
/// order. Holes and uninitialized extents are left out.
pub(crate) fn data_blocks(
    ext4: &Ext4,
    inode: &Inode,
) -> Result<Vec<u64>, Ext4Error> {
    let mut blocks = Vec::new();

    if inode.uses_extents() {
        for extent in ExtentCursor::new(ext4.clone(), inode)? {
            let extent = extent?;
            if !extent.is_leaf || extent.is_uninit {
                continue;
            }
            let start = extent.physical_start;
            blocks.extend((0..u64::from(extent.len)).map(|i| start + i));
        }
    } else if inode.has_block_pointers() {
        let mut remaining = inode.num_blocks(ext4.superblock().block_size);

        for block in inode.direct_blocks() {
            if remaining == 0 {
                break;
            }
            remaining -= 1;
            if block != 0 {
                blocks.push(u64::from(block));
            }
        }

        for (level, block) in (1..).zip(inode.indirect_blocks()) {
            collect_indirect(ext4, block, level, &mut remaining, &mut blocks)?;
        }
    }

    Ok(blocks)
}

/// Append the data blocks reachable from the indirect block `block`,
/// which is `level` steps above the data.
fn collect_indirect(
    ext4: &Ext4,
    block: u32,
    level: u32,
    remaining: &mut u64,
    blocks: &mut Vec<u64>,
) -> Result<(), Ext4Error> {
    if *remaining == 0 {
        return Ok(());
    }

    let block_size = ext4.superblock().block_size;
    let per_block = u64::from(block_size / 4);

    if block == 0 {
        // A hole spans every block this pointer would have covered.
        let span = per_block.saturating_pow(level);
        *remaining = remaining.saturating_sub(span);
        return Ok(());
    }

    let mut data = vec![0; usize_from_u32(block_size)];
    ext4.read_from_block(u64::from(block), 0, &mut data)?;

    for offset in (0..data.len()).step_by(4) {
        if *remaining == 0 {
            break;
        }
        let child = read_u32le(&data, offset);
        if level == 1 {
            *remaining -= 1;
            if child != 0 {
                blocks.push(u64::from(child));
            }
        } else {
            collect_indirect(ext4, child, level - 1, remaining, blocks)?;
        }
    }
    Ok(())
}
