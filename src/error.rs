// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::features::IncompatibleFeatures;
use std::io;
use thiserror::Error;

/// Error returned by the [`Locator`] surface.
///
/// [`Locator`]: crate::Locator
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LocateError {
    /// [`Locator::open`] was called on a handle that is already open.
    ///
    /// [`Locator::open`]: crate::Locator::open
    #[error("handle already open")]
    HandleAlreadyOpen,

    /// An operation that needs an open volume was called on a closed
    /// handle.
    #[error("filesystem handle not open")]
    HandleNotOpen,

    /// The volume could not be opened.
    #[error("failed to open volume: {0}")]
    VolumeOpen(#[source] Ext4Error),

    /// The inode table scan could not be started.
    #[error("failed to open inode scan: {0}")]
    ScanOpen(#[source] Ext4Error),
}

/// Error type for the on-disk reader.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Ext4Error {
    /// An IO operation failed. This error comes from the [`Ext4Read`]
    /// the volume was opened with.
    ///
    /// [`Ext4Read`]: crate::Ext4Read
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The filesystem uses features this library cannot read.
    #[error("incompatible: {0}")]
    Incompatible(#[from] Incompatible),

    /// The filesystem is corrupt in some way.
    #[error("corrupt: {0}")]
    Corrupt(#[from] Corrupt),

    /// A superblock override was given without a block size. The
    /// location of a backup superblock is expressed in blocks, so the
    /// block size must be known before the superblock is read.
    #[error("a superblock override requires an explicit block size")]
    SuperblockWithoutBlockSize,

    /// The block size passed when opening is not a power of two
    /// between 1KiB and 64KiB.
    #[error("invalid block size {0}")]
    InvalidBlockSize(u32),

    /// The block size passed when opening does not match the block
    /// size recorded in the superblock.
    #[error("expected block size {requested}, filesystem uses {actual}")]
    UnexpectedBlockSize {
        /// Block size passed by the caller.
        requested: u32,
        /// Block size from the superblock.
        actual: u32,
    },

    /// An operation that requires a directory inode was attempted on a
    /// non-directory inode.
    #[error("inode {0} is not a directory")]
    NotADirectory(u32),

    /// A directory could not be found in the entries of its own parent.
    #[error("inode {0} is not linked from its parent directory")]
    NotLinked(u32),

    /// Walking up from a directory did not reach the root.
    #[error("path of inode {0} is too deep to resolve")]
    PathTooDeep(u32),
}

impl Ext4Error {
    /// If the error type is [`Ext4Error::Corrupt`], get the underlying error.
    #[must_use]
    pub fn as_corrupt(&self) -> Option<&Corrupt> {
        if let Self::Corrupt(err) = self {
            Some(err)
        } else {
            None
        }
    }

    /// If the error type is [`Ext4Error::Incompatible`], get the
    /// underlying error.
    #[must_use]
    pub fn as_incompatible(&self) -> Option<&Incompatible> {
        if let Self::Incompatible(err) = self {
            Some(err)
        } else {
            None
        }
    }
}

impl PartialEq<Corrupt> for Ext4Error {
    fn eq(&self, other: &Corrupt) -> bool {
        self.as_corrupt() == Some(other)
    }
}

/// Error type used in [`Ext4Error::Corrupt`] when the filesystem is
/// corrupt in some way.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum Corrupt {
    /// Superblock magic is invalid.
    #[error("invalid superblock magic")]
    SuperblockMagic,

    /// Superblock checksum is invalid.
    #[error("invalid superblock checksum")]
    SuperblockChecksum,

    /// The block size is out of range.
    #[error("invalid block size (log value {0})")]
    BlockSize(
        /// Raw `s_log_block_size`.
        u32,
    ),

    /// The number of block groups does not fit in a [`u32`], or the
    /// group geometry is otherwise invalid.
    #[error("invalid block group geometry")]
    BlockGroupGeometry,

    /// Invalid block group descriptor.
    #[error("block group descriptor {0} is invalid")]
    BlockGroupDescriptor(
        /// Block group number.
        u32,
    ),

    /// Block group descriptor checksum is invalid.
    #[error("invalid checksum for block group descriptor {0}")]
    BlockGroupDescriptorChecksum(
        /// Block group number.
        u32,
    ),

    /// An inode number is zero or larger than the inode count.
    #[error("inode {0} is out of range")]
    InodeIndex(
        /// Inode number.
        u64,
    ),

    /// An inode's checksum is invalid.
    #[error("invalid checksum for inode {0}")]
    InodeChecksum(
        /// Inode number.
        u32,
    ),

    /// An inode is invalid.
    #[error("inode {0} is invalid")]
    Inode(
        /// Inode number.
        u32,
    ),

    /// An extent's magic is invalid.
    #[error("extent in inode {0} has invalid magic")]
    ExtentMagic(
        /// Inode number.
        u32,
    ),

    /// An extent's checksum is invalid.
    #[error("extent in inode {0} has an invalid checksum")]
    ExtentChecksum(
        /// Inode number.
        u32,
    ),

    /// An extent's depth is greater than five.
    #[error("extent in inode {0} has an invalid depth")]
    ExtentDepth(
        /// Inode number.
        u32,
    ),

    /// Not enough data is present to read an extent node.
    #[error("extent data in inode {0} is invalid")]
    ExtentNotEnoughData(
        /// Inode number.
        u32,
    ),

    /// An extent node is larger than a block.
    #[error("extent node in inode {0} exceeds the block size")]
    ExtentNodeSize(
        /// Inode number.
        u32,
    ),

    // TODO: consider breaking this down into more specific problems.
    /// A directory entry is invalid.
    #[error("invalid directory entry in inode {0}")]
    DirEntry(
        /// Inode number.
        u32,
    ),

    /// A block read was out of bounds.
    #[error(
        "invalid read of length {read_len} from block {block_index} at offset {offset_within_block}"
    )]
    BlockRead {
        /// Absolute block index.
        block_index: u64,
        /// Offset in bytes within the block.
        offset_within_block: u32,
        /// Length in bytes of the read.
        read_len: usize,
    },
}

/// Error type used in [`Ext4Error::Incompatible`] when the filesystem
/// cannot be read due to incomplete support in this library.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum Incompatible {
    /// One or more unknown bits are set in the incompatible feature flags.
    #[error("unknown features: {0:?}")]
    Unknown(
        /// The unknown features.
        IncompatibleFeatures,
    ),

    /// One or more disallowed incompatible features are present.
    #[allow(clippy::enum_variant_names)]
    #[error("incompatible features: {0:?}")]
    Incompatible(
        /// The incompatible features.
        IncompatibleFeatures,
    ),
}
