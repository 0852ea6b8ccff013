// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::Ext4;
use crate::checksum::Checksum;
use crate::error::{Corrupt, Ext4Error};
use crate::extent::Extent;
use crate::inode::Inode;
use crate::util::{read_u16le, read_u32le, u64_from_hilo, usize_from_u32};

/// Size of each entry within an extent node (including the header
/// entry).
const ENTRY_SIZE_IN_BYTES: usize = 12;

const MAGIC: u16 = 0xf30a;
const MAX_DEPTH: u16 = 5;

/// Header at the start of a node in an extent tree.
///
/// An extent tree is made up of nodes. Each node may be internal or
/// leaf. Leaf nodes contain extents. Internal nodes point at other
/// nodes.
struct NodeHeader {
    /// Number of entries in this node, not including the header.
    num_entries: u16,

    /// Maximum number of entries in this node, not including the header.
    max_entries: u16,

    /// Depth of this node in the tree. Zero means it's a leaf node.
    depth: u16,
}

/// Returns `(n + 1) * ENTRY_SIZE_IN_BYTES`.
fn add_one_mul_entry_size(n: u16) -> usize {
    // OK to unwrap: at most `2^16 * 12`, which fits in a `u32`.
    (usize::from(n) + 1).checked_mul(ENTRY_SIZE_IN_BYTES).unwrap()
}

impl NodeHeader {
    fn from_bytes(data: &[u8], inode: u32) -> Result<Self, Ext4Error> {
        if data.len() < ENTRY_SIZE_IN_BYTES {
            return Err(Corrupt::ExtentNotEnoughData(inode).into());
        }

        let eh_magic = read_u16le(data, 0);
        let eh_entries = read_u16le(data, 2);
        let eh_max = read_u16le(data, 4);
        let eh_depth = read_u16le(data, 6);

        if eh_magic != MAGIC {
            return Err(Corrupt::ExtentMagic(inode).into());
        }
        if eh_depth > MAX_DEPTH {
            return Err(Corrupt::ExtentDepth(inode).into());
        }

        Ok(Self {
            num_entries: eh_entries,
            max_entries: eh_max,
            depth: eh_depth,
        })
    }

    /// Size of the node, including the header.
    fn node_size_in_bytes(&self) -> usize {
        add_one_mul_entry_size(self.num_entries)
    }

    /// The checksum is written in the four bytes directly after the
    /// largest node this header allows.
    fn checksum_offset(&self) -> usize {
        add_one_mul_entry_size(self.max_entries)
    }
}

struct ToVisitItem {
    // Node data, truncated to the header plus its entries.
    node: Vec<u8>,

    // Current index within the node. 0 is the node header, 1 is the
    // first entry, etc.
    entry: u32,

    depth: u16,
}

impl ToVisitItem {
    fn new(mut node: Vec<u8>, inode: u32) -> Result<Self, Ext4Error> {
        let header = NodeHeader::from_bytes(&node, inode)?;

        if node.len() < header.node_size_in_bytes() {
            return Err(Corrupt::ExtentNotEnoughData(inode).into());
        }
        node.truncate(header.node_size_in_bytes());

        Ok(Self {
            node,
            entry: 0,
            depth: header.depth,
        })
    }

    fn entry(&self) -> Option<&[u8]> {
        let start =
            usize_from_u32(self.entry).checked_mul(ENTRY_SIZE_IN_BYTES)?;
        let end = start.checked_add(ENTRY_SIZE_IN_BYTES)?;
        self.node.get(start..end)
    }
}

/// Cursor over every entry of an inode's extent tree, in pre-order.
///
/// An index entry is yielded before the entries of the node it points
/// to. Leaf entries within a node come out in on-disk order.
pub(crate) struct ExtentCursor {
    ext4: Ext4,
    inode: u32,
    to_visit: Vec<ToVisitItem>,
    checksum_base: Option<Checksum>,
    is_done: bool,
}

impl ExtentCursor {
    /// Open a cursor at the root node stored in `inode`. Fails if the
    /// root header is invalid.
    pub(crate) fn new(ext4: Ext4, inode: &Inode) -> Result<Self, Ext4Error> {
        let index = inode.index.get();
        Ok(Self {
            ext4,
            inode: index,
            to_visit: vec![ToVisitItem::new(
                inode.inline_data.to_vec(),
                index,
            )?],
            checksum_base: inode.checksum_base.clone(),
            is_done: false,
        })
    }

    fn read_child(
        &self,
        child_block: u64,
        parent_depth: u16,
    ) -> Result<ToVisitItem, Ext4Error> {
        // Read just the header of the child node. This is needed to
        // find out how much data is in the full child node.
        let mut header = [0; ENTRY_SIZE_IN_BYTES];
        self.ext4.read_from_block(child_block, 0, &mut header)?;
        let header = NodeHeader::from_bytes(&header, self.inode)?;

        // Each level must be exactly one shallower than its parent.
        // This also rules out cycles.
        if header.depth.checked_add(1) != Some(parent_depth) {
            return Err(Corrupt::ExtentDepth(self.inode).into());
        }

        let checksum_offset = header.checksum_offset();
        let checksum_size = if self.checksum_base.is_some() { 4 } else { 0 };
        let node_size = checksum_offset + checksum_size;
        if node_size > usize_from_u32(self.ext4.superblock().block_size) {
            return Err(Corrupt::ExtentNodeSize(self.inode).into());
        }
        let mut node = vec![0; node_size];
        self.ext4.read_from_block(child_block, 0, &mut node)?;

        // The root node lives in the inode, which has its own checksum.
        if let Some(base) = &self.checksum_base {
            let expected = read_u32le(&node, checksum_offset);
            let mut checksum = base.clone();
            checksum.update(&node[..checksum_offset]);
            if expected != checksum.finalize() {
                return Err(Corrupt::ExtentChecksum(self.inode).into());
            }
        }

        ToVisitItem::new(node, self.inode)
    }

    fn next_impl(&mut self) -> Result<Option<Extent>, Ext4Error> {
        let Some(item) = self.to_visit.last_mut() else {
            self.is_done = true;
            return Ok(None);
        };

        // Entry 0 is the node header, so the first real entry is 1.
        item.entry += 1;

        let Some(entry) = item.entry() else {
            // Reached end of this node.
            self.to_visit.pop();
            return Ok(None);
        };

        if item.depth == 0 {
            let ee_block = read_u32le(entry, 0);
            let ee_len = read_u16le(entry, 4);
            let ee_start_hi = read_u16le(entry, 6);
            let ee_start_lo = read_u32le(entry, 8);
            let start = u64_from_hilo(u32::from(ee_start_hi), ee_start_lo);
            return Ok(Some(Extent::leaf(ee_block, ee_len, start)));
        }

        let ei_block = read_u32le(entry, 0);
        let ei_leaf_lo = read_u32le(entry, 4);
        let ei_leaf_hi = read_u16le(entry, 8);
        let child_block = u64_from_hilo(u32::from(ei_leaf_hi), ei_leaf_lo);
        let depth = item.depth;

        let child = self.read_child(child_block, depth)?;
        self.to_visit.push(child);
        Ok(Some(Extent::index(ei_block, child_block)))
    }
}

impl_result_iter!(ExtentCursor, Extent);
