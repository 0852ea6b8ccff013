// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::Ext4;
use crate::block_map::data_blocks;
use crate::dir_entry::{DirEntry, EntryFormat};
use crate::error::{Corrupt, Ext4Error};
use crate::inode::{Inode, InodeFlags, InodeIndex};
use crate::util::{read_u32le, usize_from_u32};
use std::fmt::{self, Debug, Formatter};

/// Iterator over each [`DirEntry`] in a directory inode.
///
/// Entries are yielded in on-disk order, `.` and `..` included. Hashed
/// directories are read the same way: the htree index blocks look like
/// a single unused entry spanning the block.
pub(crate) struct ReadDir {
    fs: Ext4,

    /// Remaining data blocks of the directory, in reverse order.
    blocks: Vec<u64>,

    /// The current block's data.
    block: Vec<u8>,

    /// The current byte offset within `block`. Equal to the block
    /// length when the next block needs to be fetched.
    offset_within_block: usize,

    format: EntryFormat,

    /// Parent of an inline-data directory. The parent is stored as a
    /// bare inode number rather than a `..` entry.
    inline_parent: Option<InodeIndex>,

    /// Inode of the directory. Just used for error reporting.
    inode: InodeIndex,

    is_done: bool,
}

impl ReadDir {
    pub(crate) fn new(fs: Ext4, inode: &Inode) -> Result<Self, Ext4Error> {
        if !inode.is_dir() {
            return Err(Ext4Error::NotADirectory(inode.index.get()));
        }

        let sb = fs.superblock();
        let mut format = EntryFormat {
            has_file_type: sb.has_file_type_in_dir_entry(),
            block_size: sb.block_size,
        };

        let mut blocks;
        let block;
        let mut inline_parent = None;
        if inode.flags.contains(InodeFlags::INLINE_DATA) {
            // The first four bytes hold the parent's inode number, and
            // the rest of `i_block` holds entries. Entries that overflow
            // into extended attributes are not read.
            let parent = read_u32le(&inode.inline_data, 0);
            inline_parent = Some(
                InodeIndex::new(parent)
                    .ok_or(Corrupt::DirEntry(inode.index.get()))?,
            );
            block = inode.inline_data[4..].to_vec();
            blocks = Vec::new();
            // OK to unwrap: the slice is 56 bytes.
            format.block_size = u32::try_from(block.len()).unwrap();
        } else {
            blocks = data_blocks(&fs, inode)?;
            blocks.reverse();
            block = vec![0; usize_from_u32(sb.block_size)];
        }

        // Start at the end of the current block so that the first call
        // fetches a block, unless the data is already in place.
        let offset_within_block = if inline_parent.is_some() {
            0
        } else {
            block.len()
        };

        Ok(Self {
            fs,
            blocks,
            block,
            offset_within_block,
            format,
            inline_parent,
            inode: inode.index,
            is_done: false,
        })
    }

    fn next_impl(&mut self) -> Result<Option<DirEntry>, Ext4Error> {
        if let Some(parent) = self.inline_parent.take() {
            return Ok(Some(DirEntry {
                inode: parent,
                name: b"..".to_vec(),
            }));
        }

        if self.offset_within_block >= self.block.len() {
            let Some(block_index) = self.blocks.pop() else {
                self.is_done = true;
                return Ok(None);
            };
            self.fs.read_from_block(block_index, 0, &mut self.block)?;
            self.offset_within_block = 0;
        }

        let (entry, entry_size) = DirEntry::from_bytes(
            &self.block[self.offset_within_block..],
            self.format,
            self.inode,
        )?;
        self.offset_within_block += entry_size;

        Ok(entry)
    }
}

impl Debug for ReadDir {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ReadDir({})", self.inode)
    }
}

impl_result_iter!(ReadDir, DirEntry);
