// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::Ext4;
use crate::error::LocateError;
use crate::lookup::{Lookup, locate};
use crate::matcher::PendingTargets;
use crate::options::OpenOptions;
use crate::reader::Ext4Read;
use std::path::Path;

/// Handle for finding objects on one volume at a time.
///
/// A handle starts out closed. [`Locator::open`] attaches it to a
/// volume, and [`Locator::close`] releases the volume so that the
/// handle can be opened again.
///
/// The handle keeps a cache of resolved directory paths for as long as
/// it is open, so repeated lookups on the same volume get cheaper.
#[derive(Debug, Default)]
pub struct Locator {
    fs: Option<Ext4>,
}

impl Locator {
    /// Create a closed handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a volume is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.fs.is_some()
    }

    /// Open the volume at `path`, which may be a block device or an
    /// image file.
    pub fn open<P: AsRef<Path>>(
        &mut self,
        path: P,
        options: &OpenOptions,
    ) -> Result<(), LocateError> {
        if self.is_open() {
            return Err(LocateError::HandleAlreadyOpen);
        }
        let path = path.as_ref();
        let fs = Ext4::load_from_path(path, options)
            .map_err(LocateError::VolumeOpen)?;
        log::debug!("opened {}", path.display());
        self.fs = Some(fs);
        Ok(())
    }

    /// Open a volume read through `reader`.
    pub fn open_reader(
        &mut self,
        reader: Box<dyn Ext4Read>,
        options: &OpenOptions,
    ) -> Result<(), LocateError> {
        if self.is_open() {
            return Err(LocateError::HandleAlreadyOpen);
        }
        let fs =
            Ext4::load(reader, options).map_err(LocateError::VolumeOpen)?;
        log::debug!("opened volume from reader");
        self.fs = Some(fs);
        Ok(())
    }

    /// Close the volume.
    pub fn close(&mut self) -> Result<(), LocateError> {
        let fs = self.fs.take().ok_or(LocateError::HandleNotOpen)?;
        log::debug!("closed {fs:?}");
        Ok(())
    }

    /// Find the objects that own the inode numbers in `inodes` and the
    /// physical blocks in `blocks`.
    ///
    /// Each target is reported at most once. Targets that are not found
    /// are simply absent from the result. Apart from failing to start
    /// the scan, problems met along the way are logged and skipped.
    pub fn lookup(
        &self,
        inodes: &[u64],
        blocks: &[u64],
    ) -> Result<Lookup, LocateError> {
        let fs = self.fs.as_ref().ok_or(LocateError::HandleNotOpen)?;
        locate(fs, PendingTargets::new(inodes, blocks))
            .map_err(LocateError::ScanOpen)
    }
}
