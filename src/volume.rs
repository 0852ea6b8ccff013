// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The primitives the lookup needs from a volume.

use crate::Ext4;
use crate::dir_entry::DirEntry;
use crate::error::Ext4Error;
use crate::extent::Extent;
use crate::inode::{Inode, InodeIndex};
use crate::iters::extents::ExtentCursor;
use crate::iters::inode_scan::InodeScan;
use crate::iters::read_dir::ReadDir;
use crate::pathname::pathname;

pub(crate) use crate::iters::inode_scan::ScanItem;

/// Read-only access to the objects of a volume.
///
/// Every iterator returned here is an owned value. Dropping it early
/// releases it; there is no separate close step.
pub(crate) trait Volume {
    /// Iterator over the inode table. `Ok(ScanItem::Bad { .. })` is a
    /// record the scan stepped over, `Err` ends the scan.
    type Scan: Iterator<Item = Result<ScanItem, Ext4Error>>;

    /// Iterator over the entries of one directory.
    type Entries: Iterator<Item = Result<DirEntry, Ext4Error>>;

    /// Pre-order cursor over an extent tree.
    type Extents: Iterator<Item = Result<Extent, Ext4Error>>;

    /// Start a scan of the inode table.
    fn inode_scan(&self) -> Result<Self::Scan, Ext4Error>;

    /// Read one inode.
    fn read_inode(&self, index: InodeIndex) -> Result<Inode, Ext4Error>;

    /// Absolute path of directory `dir`.
    fn pathname(&self, dir: InodeIndex) -> Result<String, Ext4Error>;

    /// Iterate over the entries of directory `dir`.
    fn read_dir(&self, dir: &Inode) -> Result<Self::Entries, Ext4Error>;

    /// Open a cursor over the extent tree of `inode`.
    fn extents(&self, inode: &Inode) -> Result<Self::Extents, Ext4Error>;
}

impl Volume for Ext4 {
    type Scan = InodeScan;
    type Entries = ReadDir;
    type Extents = ExtentCursor;

    fn inode_scan(&self) -> Result<InodeScan, Ext4Error> {
        InodeScan::new(self.clone())
    }

    fn read_inode(&self, index: InodeIndex) -> Result<Inode, Ext4Error> {
        Inode::read(self, index)
    }

    fn pathname(&self, dir: InodeIndex) -> Result<String, Ext4Error> {
        pathname(self, dir)
    }

    fn read_dir(&self, dir: &Inode) -> Result<ReadDir, Ext4Error> {
        ReadDir::new(self.clone(), dir)
    }

    fn extents(&self, inode: &Inode) -> Result<ExtentCursor, Ext4Error> {
        ExtentCursor::new(self.clone(), inode)
    }
}
