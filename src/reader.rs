// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Interface used to read the filesystem data from a storage file or
/// device.
pub trait Ext4Read {
    /// Read bytes into `dst`, starting at `start_byte`.
    ///
    /// Exactly `dst.len()` bytes will be read; an error will be
    /// returned if there is not enough data to fill `dst`, or if the
    /// data cannot be read for any reason.
    fn read(&mut self, start_byte: u64, dst: &mut [u8]) -> io::Result<()>;
}

impl Ext4Read for File {
    fn read(&mut self, start_byte: u64, dst: &mut [u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(start_byte))?;
        self.read_exact(dst)
    }
}

impl Ext4Read for Vec<u8> {
    fn read(&mut self, start_byte: u64, dst: &mut [u8]) -> io::Result<()> {
        let src = usize::try_from(start_byte)
            .ok()
            .and_then(|start| Some(start..start.checked_add(dst.len())?))
            .and_then(|range| self.get(range))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "failed to read {} bytes at offset {start_byte} from a slice of length {}",
                        dst.len(),
                        self.len()
                    ),
                )
            })?;
        dst.copy_from_slice(src);
        Ok(())
    }
}
