// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::Ext4;
use crate::block_group::BlockGroupFlags;
use crate::error::{Corrupt, Ext4Error};
use crate::inode::{Inode, InodeIndex};
use crate::util::usize_from_u32;

/// Item produced by a scan of the inode table.
#[derive(Debug)]
pub(crate) enum ScanItem {
    /// An inode record. It may be unused; check `links_count`.
    Inode(Inode),

    /// A record that could not be parsed, for example due to a
    /// checksum mismatch. The scan continues past it.
    Bad { index: u32, error: Corrupt },
}

/// Iterator over every inode record in inode-number order.
///
/// Groups flagged `INODE_UNINIT`, and the never-used tail of each
/// group's table, are skipped when group descriptors are checksummed.
/// Without checksums those fields cannot be trusted, so every record
/// is read.
///
/// An IO error ends the scan.
pub(crate) struct InodeScan {
    ext4: Ext4,

    /// Next inode number to visit.
    next_index: u32,

    /// Inode table block currently held in `block`.
    block_index: Option<u64>,
    block: Vec<u8>,

    is_done: bool,
}

impl InodeScan {
    /// Start a scan at inode 1. Fails if the first inode table block
    /// can't be read.
    pub(crate) fn new(ext4: Ext4) -> Result<Self, Ext4Error> {
        let block_size = usize_from_u32(ext4.superblock().block_size);
        let mut block = vec![0; block_size];

        let first = InodeIndex::MIN;
        let (block_index, _) = ext4.inode_location(first)?;
        ext4.read_from_block(block_index, 0, &mut block)?;

        Ok(Self {
            ext4,
            next_index: first.get(),
            block_index: Some(block_index),
            block,
            is_done: false,
        })
    }

    /// Move to the first inode of the next group.
    fn skip_to_next_group(&mut self, group: u32) {
        let ipg = self.ext4.superblock().inodes_per_block_group;
        match group
            .checked_add(1)
            .and_then(|g| g.checked_mul(ipg))
            .and_then(|i| i.checked_add(1))
        {
            Some(next) => self.next_index = next,
            None => self.is_done = true,
        }
    }

    fn next_impl(&mut self) -> Result<Option<ScanItem>, Ext4Error> {
        let sb = self.ext4.superblock();
        let ipg = sb.inodes_per_block_group;
        let inodes_count = sb.inodes_count;
        let inode_size = usize::from(sb.inode_size);

        let Some(index) = InodeIndex::new(self.next_index) else {
            self.is_done = true;
            return Ok(None);
        };
        if index.get() > inodes_count {
            self.is_done = true;
            return Ok(None);
        }

        let index_zero = index.get() - 1;
        let group = index_zero / ipg;
        let index_within_group = index_zero % ipg;

        if self.ext4.superblock().has_group_descriptor_checksums() {
            let bgd = self
                .ext4
                .block_group_descriptors()
                .get(usize_from_u32(group))
                .ok_or(Corrupt::InodeIndex(u64::from(index.get())))?;
            let used = ipg.saturating_sub(bgd.itable_unused);
            if bgd.flags.contains(BlockGroupFlags::INODE_UNINIT)
                || index_within_group >= used
            {
                self.skip_to_next_group(group);
                return Ok(None);
            }
        }

        let (block, offset) = self.ext4.inode_location(index)?;
        if self.block_index != Some(block) {
            // Drop the cached block first so a failed read can't leave
            // stale data behind.
            self.block_index = None;
            self.ext4.read_from_block(block, 0, &mut self.block)?;
            self.block_index = Some(block);
        }

        match self.next_index.checked_add(1) {
            Some(next) => self.next_index = next,
            None => self.is_done = true,
        }

        let offset = usize_from_u32(offset);
        let data = offset
            .checked_add(inode_size)
            .and_then(|end| self.block.get(offset..end))
            .ok_or(Corrupt::Inode(index.get()))?;
        let seed = self.ext4.metadata_checksum_seed();
        match Inode::from_bytes(index, data, seed) {
            Ok(inode) => Ok(Some(ScanItem::Inode(inode))),
            Err(Ext4Error::Corrupt(error)) => Ok(Some(ScanItem::Bad {
                index: index.get(),
                error,
            })),
            Err(err) => Err(err),
        }
    }
}

impl_result_iter!(InodeScan, ScanItem);
