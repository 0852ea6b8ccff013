// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::{Corrupt, Ext4Error};
use crate::inode::InodeIndex;
use crate::util::{read_u16le, read_u32le};
use std::borrow::Cow;

/// Directory entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct DirEntry {
    /// Number of the inode that this entry points to.
    pub(crate) inode: InodeIndex,

    /// Raw name of the entry.
    pub(crate) name: Vec<u8>,
}

/// Layout details needed to parse entries in a directory block.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EntryFormat {
    /// `name_len` is one byte, followed by a file type byte. Otherwise
    /// `name_len` is two bytes.
    pub(crate) has_file_type: bool,

    pub(crate) block_size: u32,
}

impl DirEntry {
    /// Minimum size of an entry: inode, `rec_len`, and `name_len`.
    const HEADER_SIZE: usize = 8;

    /// Read a `DirEntry` from a byte slice.
    ///
    /// Returns the entry, or `None` for an unused entry, along with the
    /// entry's `rec_len`.
    pub(crate) fn from_bytes(
        bytes: &[u8],
        format: EntryFormat,
        dir: InodeIndex,
    ) -> Result<(Option<Self>, usize), Ext4Error> {
        let err = || Ext4Error::from(Corrupt::DirEntry(dir.get()));

        if bytes.len() < Self::HEADER_SIZE {
            return Err(err());
        }

        let inode = read_u32le(bytes, 0);
        let rec_len =
            rec_len_from_disk(read_u16le(bytes, 4), format.block_size);
        let name_len = if format.has_file_type {
            usize::from(bytes[6])
        } else {
            usize::from(read_u16le(bytes, 6))
        };

        // Every entry is at least a header long, which also guarantees
        // forward progress.
        if rec_len < Self::HEADER_SIZE || rec_len > bytes.len() {
            return Err(err());
        }

        let Some(inode) = InodeIndex::new(inode) else {
            // Unused entry.
            return Ok((None, rec_len));
        };

        let name = bytes
            .get(Self::HEADER_SIZE..Self::HEADER_SIZE + name_len)
            .filter(|_| Self::HEADER_SIZE + name_len <= rec_len)
            .ok_or_else(err)?;
        if name.is_empty() {
            return Err(err());
        }

        Ok((
            Some(Self {
                inode,
                name: name.to_vec(),
            }),
            rec_len,
        ))
    }

    /// True for the `.` and `..` entries.
    pub(crate) fn is_dot_or_dotdot(&self) -> bool {
        self.name == b"." || self.name == b".."
    }

    /// Get the name as a string, replacing invalid UTF-8.
    pub(crate) fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// Decode the on-disk `rec_len`. With 64KiB blocks a full-block entry
/// doesn't fit in 16 bits, so the low two bits (always zero in a real
/// length) carry bits 16 and 17.
fn rec_len_from_disk(rec_len: u16, block_size: u32) -> usize {
    const MAX_REC_LEN: u32 = 65535;

    let len = u32::from(rec_len);
    let decoded = if block_size < 65536 {
        len
    } else if len == MAX_REC_LEN || len == 0 {
        block_size
    } else {
        (len & 65532) | ((len & 3) << 16)
    };
    // OK to unwrap: at most 2^18.
    usize::try_from(decoded).unwrap()
}
