// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! This crate finds filesystem objects on an [ext2/ext3/ext4] volume
//! by inode number or by physical block number.
//!
//! For every match it reports the inode, how the inode maps its data
//! to blocks, the data blocks as coalesced ranges, and the path. The
//! volume is read directly, without mounting it; it is never written.
//!
//! # Example
//!
//! ```no_run
//! use ext4_locate::{Locator, OpenOptions};
//!
//! let mut locator = Locator::new();
//! locator.open("/dev/sda1", &OpenOptions::new())?;
//!
//! // Which file owns block 34000, and where does inode 12 live?
//! let lookup = locator.lookup(&[12], &[34000])?;
//! for object in &lookup.objects {
//!     println!("{} {}", object.inode, object.path);
//! }
//! locator.close()?;
//! # Ok::<(), ext4_locate::LocateError>(())
//! ```
//!
//! # Scope
//!
//! The locator visits every in-use directory in inode-table order and
//! inspects the non-directory entries of each. A directory matches by
//! its inode number only; its data blocks are not matched. Blocks
//! reached only through indirect block pointers are not reported.
//!
//! [ext2/ext3/ext4]: https://en.wikipedia.org/wiki/Ext4

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(clippy::as_conversions)]

#[macro_use]
mod iters;

mod block_group;
mod block_index;
mod block_map;
mod checksum;
mod decode;
mod dir_entry;
mod error;
mod extent;
mod features;
mod file_type;
mod inode;
mod locator;
mod lookup;
mod matcher;
mod object;
mod options;
mod pathname;
mod ranges;
mod reader;
mod superblock;
mod util;
mod volume;

#[cfg(test)]
#[allow(dead_code)]
mod test_util;

use block_group::{BlockGroupDescriptor, BlockGroupFlags};
use inode::{Inode, InodeIndex};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::fs::File;
use std::path::Path;
use std::rc::Rc;
use superblock::Superblock;

pub use error::{Corrupt, Ext4Error, Incompatible, LocateError};
pub use features::IncompatibleFeatures;
pub use locator::Locator;
pub use lookup::{Lookup, TraversalStats};
pub use object::{BlockMappingKind, FilesystemObject};
pub use options::{OpenFlags, OpenOptions};
pub use ranges::{BlockRange, coalesce};
pub use reader::Ext4Read;

struct Ext4Inner {
    superblock: Superblock,
    block_group_descriptors: Vec<BlockGroupDescriptor>,
    verify_checksums: bool,

    /// Reader providing access to the underlying storage.
    ///
    /// Stored as `Box<dyn Ext4Read>` rather than a generic type to make
    /// the `Ext4` type more convenient to pass around for users of the
    /// API.
    ///
    /// The `Ext4Read::read` method takes `&mut self`, because readers
    /// like `std::fs::File` are mutable. However, the `Ext4` API is
    /// logically const -- it provides read-only access to the
    /// filesystem. So the box is wrapped in `RefCell` to allow the
    /// mutable method to be called with an immutable `&Ext4Inner`
    /// reference. `RefCell` enforces at runtime that only one mutable
    /// borrow exists at a time.
    reader: RefCell<Box<dyn Ext4Read>>,

    /// Paths of directories resolved so far.
    path_cache: RefCell<HashMap<InodeIndex, String>>,
}

/// Read-only access to an ext2/3/4 volume.
///
/// Cloning is cheap; clones share the reader and caches. The handle is
/// single-threaded.
#[derive(Clone)]
pub(crate) struct Ext4(Rc<Ext4Inner>);

impl Ext4 {
    /// Load an `Ext4` instance from the given `reader`.
    ///
    /// This reads and validates the superblock and block group
    /// descriptors. No other data is read.
    pub(crate) fn load(
        mut reader: Box<dyn Ext4Read>,
        options: &OpenOptions,
    ) -> Result<Self, Ext4Error> {
        if let Some(block_size) = options.block_size {
            if !(1024..=65536).contains(&block_size)
                || !block_size.is_power_of_two()
            {
                return Err(Ext4Error::InvalidBlockSize(block_size));
            }
        }

        let superblock_offset = match (options.superblock, options.block_size)
        {
            (None, _) => Superblock::PRIMARY_OFFSET,
            (Some(_), None) => {
                return Err(Ext4Error::SuperblockWithoutBlockSize);
            }
            (Some(block), Some(block_size)) => block
                .checked_mul(u64::from(block_size))
                .ok_or(Corrupt::BlockRead {
                    block_index: block,
                    offset_within_block: 0,
                    read_len: Superblock::SIZE_IN_BYTES_ON_DISK,
                })?,
        };

        let mut data = vec![0; Superblock::SIZE_IN_BYTES_ON_DISK];
        reader.read(superblock_offset, &mut data)?;
        let superblock = Superblock::from_bytes(
            &data,
            options.check_features(),
            options.verify_checksums(),
        )?;

        if let Some(block_size) = options.block_size {
            if block_size != superblock.block_size {
                return Err(Ext4Error::UnexpectedBlockSize {
                    requested: block_size,
                    actual: superblock.block_size,
                });
            }
        }

        // The descriptor table follows the superblock's block.
        let superblock_block = options
            .superblock
            .unwrap_or(u64::from(superblock.first_data_block));
        let table_block = superblock_block
            .checked_add(1)
            .ok_or(Corrupt::BlockGroupGeometry)?;
        let mut block_group_descriptors = BlockGroupDescriptor::read_all(
            &superblock,
            reader.as_mut(),
            table_block,
            options.verify_checksums(),
        )?;

        // Backup descriptors are only written at mkfs and resize time,
        // so their uninit markings can't be trusted.
        if options.superblock.is_some_and(|block| block > 1) {
            for bgd in &mut block_group_descriptors {
                bgd.flags.remove(
                    BlockGroupFlags::INODE_UNINIT
                        | BlockGroupFlags::BLOCK_UNINIT,
                );
                bgd.itable_unused = 0;
            }
        }

        log::debug!(
            "loaded volume: block size {}, {} blocks, {} inodes, {} groups",
            superblock.block_size,
            superblock.blocks_count,
            superblock.inodes_count,
            superblock.num_block_groups,
        );

        Ok(Self(Rc::new(Ext4Inner {
            superblock,
            block_group_descriptors,
            verify_checksums: options.verify_checksums(),
            reader: RefCell::new(reader),
            path_cache: RefCell::new(HashMap::new()),
        })))
    }

    /// Load an `Ext4` filesystem from the given `path`.
    ///
    /// This reads and validates the superblock and block group
    /// descriptors. No other data is read.
    pub(crate) fn load_from_path(
        path: &Path,
        options: &OpenOptions,
    ) -> Result<Self, Ext4Error> {
        let file = File::open(path)?;
        Self::load(Box::new(file), options)
    }

    pub(crate) fn superblock(&self) -> &Superblock {
        &self.0.superblock
    }

    pub(crate) fn block_group_descriptors(&self) -> &[BlockGroupDescriptor] {
        &self.0.block_group_descriptors
    }

    /// Seed for metadata checksums, or `None` if the filesystem has no
    /// metadata checksums or they are not being verified.
    pub(crate) fn metadata_checksum_seed(&self) -> Option<u32> {
        let sb = self.superblock();
        (self.0.verify_checksums && sb.has_metadata_checksums())
            .then_some(sb.checksum_seed)
    }

    /// Read data from a block.
    ///
    /// `block_index`: an absolute block within the filesystem.
    ///
    /// `offset_within_block`: the byte offset within the block to start
    /// reading from.
    ///
    /// `dst`: byte buffer to read into. This also controls the length
    /// of the read.
    ///
    /// The first 1024 bytes of the filesystem are reserved for
    /// non-filesystem data. Reads are not allowed there.
    ///
    /// The read cannot cross block boundaries. This implies that:
    /// * `offset_within_block < block_size`
    /// * `offset_within_block + dst.len() <= block_size`
    ///
    /// If any of these conditions are violated, a `Corrupt` error is
    /// returned.
    pub(crate) fn read_from_block(
        &self,
        block_index: u64,
        offset_within_block: u32,
        dst: &mut [u8],
    ) -> Result<(), Ext4Error> {
        let sb = self.superblock();
        let read_len = dst.len();
        let err = || Corrupt::BlockRead {
            block_index,
            offset_within_block,
            read_len,
        };

        if block_index == 0 || block_index >= sb.blocks_count {
            return Err(err().into());
        }
        let end = u64::from(offset_within_block)
            .checked_add(u64::try_from(read_len).map_err(|_| err())?)
            .ok_or_else(err)?;
        if end > u64::from(sb.block_size) {
            return Err(err().into());
        }

        let start = block_index
            .checked_mul(u64::from(sb.block_size))
            .and_then(|start| start.checked_add(u64::from(offset_within_block)))
            .ok_or_else(err)?;
        self.0.reader.borrow_mut().read(start, dst)?;
        Ok(())
    }

    /// Read the inode record for `index`.
    pub(crate) fn read_inode(
        &self,
        index: InodeIndex,
    ) -> Result<Inode, Ext4Error> {
        Inode::read(self, index)
    }

    pub(crate) fn cached_path(&self, dir: InodeIndex) -> Option<String> {
        self.0.path_cache.borrow().get(&dir).cloned()
    }

    pub(crate) fn cache_path(&self, dir: InodeIndex, path: &str) {
        self.0
            .path_cache
            .borrow_mut()
            .insert(dir, path.to_owned());
    }
}

impl Debug for Ext4 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Exclude the reader field, which does not impl Debug.
        f.debug_struct("Ext4")
            .field("superblock", &self.0.superblock)
            .finish_non_exhaustive()
    }
}
