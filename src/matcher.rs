// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::object::FilesystemObject;
use crate::ranges::BlockRange;
use std::collections::BTreeSet;

/// Inode and block numbers that have not been found yet.
///
/// Targets are only ever removed, so each one is matched at most once.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct PendingTargets {
    inodes: BTreeSet<u64>,
    blocks: BTreeSet<u64>,
}

impl PendingTargets {
    /// Duplicates in either list collapse into a single target.
    pub(crate) fn new(inodes: &[u64], blocks: &[u64]) -> Self {
        Self {
            inodes: inodes.iter().copied().collect(),
            blocks: blocks.iter().copied().collect(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inodes.is_empty() && self.blocks.is_empty()
    }

    /// Number of targets still pending, as `(inodes, blocks)`.
    pub(crate) fn len(&self) -> (usize, usize) {
        (self.inodes.len(), self.blocks.len())
    }

    /// Remove `inode`. Returns true if it was pending.
    pub(crate) fn remove_inode(&mut self, inode: u64) -> bool {
        self.inodes.remove(&inode)
    }

    /// Remove and return the pending blocks within `range`, in
    /// ascending order.
    pub(crate) fn remove_blocks_in(&mut self, range: BlockRange) -> Vec<u64> {
        let found: Vec<u64> = self
            .blocks
            .range(range.start()..=range.end())
            .copied()
            .collect();
        for block in &found {
            self.blocks.remove(block);
        }
        found
    }
}

/// Check `candidate` against the pending targets.
///
/// One copy of `candidate` is pushed to `found` if its inode is
/// pending, and one more for each pending block inside its ranges.
/// Every target that matched is removed. Returns true once no targets
/// are left.
pub(crate) fn match_object(
    candidate: &FilesystemObject,
    pending: &mut PendingTargets,
    found: &mut Vec<FilesystemObject>,
) -> bool {
    if pending.remove_inode(candidate.inode) {
        log::debug!(
            "inode {} matched: {:?}",
            candidate.inode,
            candidate.path
        );
        found.push(candidate.clone());
    }

    for range in &candidate.ranges {
        for block in pending.remove_blocks_in(*range) {
            log::debug!(
                "block {block} belongs to inode {}: {:?}",
                candidate.inode,
                candidate.path
            );
            found.push(candidate.clone());
        }
    }

    pending.is_empty()
}
