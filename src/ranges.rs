// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt::{self, Display, Formatter};

/// Inclusive range of physical blocks.
///
/// A single-block range has `start == end`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlockRange {
    start: u64,
    end: u64,
}

impl BlockRange {
    /// Create a range covering `start..=end`.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        assert!(start <= end, "invalid block range {start}-{end}");
        Self { start, end }
    }

    /// First block of the range.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last block of the range (inclusive).
    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of blocks in the range.
    ///
    /// This saturates at `u64::MAX` for the range covering every block.
    #[must_use]
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    /// Always false; a range covers at least one block. Provided for
    /// symmetry with [`Self::len`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check if `block` is in the range.
    #[must_use]
    pub fn contains(&self, block: u64) -> bool {
        (self.start..=self.end).contains(&block)
    }
}

/// Formats as `start-end`.
impl Display for BlockRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Convert block numbers into the minimal ascending list of ranges
/// covering them.
///
/// The input may be unsorted and may contain duplicates. Every input
/// value ends up in exactly one range, and no two ranges overlap or
/// touch.
///
/// ```
/// use ext4_locate::{coalesce, BlockRange};
///
/// assert_eq!(
///     coalesce([5, 6, 7, 10, 1, 2]),
///     [
///         BlockRange::new(1, 2),
///         BlockRange::new(5, 7),
///         BlockRange::new(10, 10),
///     ]
/// );
/// ```
#[must_use]
pub fn coalesce<I>(blocks: I) -> Vec<BlockRange>
where
    I: IntoIterator<Item = u64>,
{
    let mut blocks: Vec<u64> = blocks.into_iter().collect();
    blocks.sort_unstable();
    blocks.dedup();

    let mut ranges: Vec<BlockRange> = Vec::new();
    for block in blocks {
        match ranges.last_mut() {
            Some(last) if last.end.checked_add(1) == Some(block) => {
                last.end = block;
            }
            _ => ranges.push(BlockRange::new(block, block)),
        }
    }
    ranges
}
