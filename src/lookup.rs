// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Walking the volume to find the objects that own the requested inode
//! and block numbers.
//!
//! The inode table is scanned in order. Each in-use directory is
//! matched by its own inode number, then each of its non-directory
//! entries is decoded and matched. Subdirectories are not entered from
//! their parent; the scan reaches them on its own. The walk stops as
//! soon as every target has been found.
//!
//! Only a failure to start the scan is an error. Everything that goes
//! wrong later is logged and stepped over.

use crate::decode::{decode_classic, decode_extents};
use crate::dir_entry::DirEntry;
use crate::error::Ext4Error;
use crate::inode::Inode;
use crate::matcher::{PendingTargets, match_object};
use crate::object::{BlockMappingKind, FilesystemObject};
use crate::volume::{ScanItem, Volume};

/// Counters describing how much of the volume a lookup examined.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct TraversalStats {
    /// Number of in-use directories visited.
    pub directories_visited: u64,

    /// Number of non-directory entries whose inode was decoded.
    pub files_examined: u64,
}

/// Result of a lookup.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Lookup {
    /// Matched objects, in the order they were found. An object appears
    /// once per target it matched.
    pub objects: Vec<FilesystemObject>,

    /// How much of the volume was examined.
    pub stats: TraversalStats,
}

/// State of one walk over a volume.
struct Traversal<'a, V: Volume> {
    volume: &'a V,
    pending: PendingTargets,
    lookup: Lookup,
}

/// Find the objects matching `pending` on `volume`.
///
/// Returns immediately if there is nothing to find.
pub(crate) fn locate<V: Volume>(
    volume: &V,
    pending: PendingTargets,
) -> Result<Lookup, Ext4Error> {
    if pending.is_empty() {
        return Ok(Lookup::default());
    }

    let scan = volume.inode_scan()?;
    let mut traversal = Traversal {
        volume,
        pending,
        lookup: Lookup::default(),
    };
    traversal.scan(scan);

    let Traversal {
        pending, lookup, ..
    } = traversal;
    let (inodes_left, blocks_left) = pending.len();
    log::info!(
        "processed {} dirs, {} files, {} matches \
         ({inodes_left} inodes and {blocks_left} blocks not found)",
        lookup.stats.directories_visited,
        lookup.stats.files_examined,
        lookup.objects.len(),
    );
    Ok(lookup)
}

/// Join a directory path and an entry name. The root directory, and a
/// directory whose path is unknown, give `/name`.
fn join(dir: &str, name: &str) -> String {
    let dir = dir.strip_suffix('/').unwrap_or(dir);
    format!("{dir}/{name}")
}

impl<V: Volume> Traversal<'_, V> {
    fn scan(&mut self, scan: V::Scan) {
        for item in scan {
            let inode = match item {
                Ok(ScanItem::Inode(inode)) => inode,
                Ok(ScanItem::Bad { index, error }) => {
                    log::warn!("skipping inode {index}: {error}");
                    continue;
                }
                Err(err) => {
                    log::warn!("inode scan stopped early: {err}");
                    return;
                }
            };

            if inode.links_count == 0 || !inode.is_dir() {
                continue;
            }
            if self.visit_directory(&inode) {
                log::debug!("all targets found");
                return;
            }
        }
    }

    /// Match `dir` itself and each of its entries. Returns true once
    /// every target has been found.
    fn visit_directory(&mut self, dir: &Inode) -> bool {
        let path = self.volume.pathname(dir.index).unwrap_or_else(|err| {
            log::warn!("failed to get path of directory {}: {err}", dir.index);
            String::new()
        });
        self.lookup.stats.directories_visited += 1;
        log::debug!("visiting directory {} {path:?}", dir.index);

        let own = FilesystemObject {
            inode: u64::from(dir.index.get()),
            kind: BlockMappingKind::DirectoryItself,
            ranges: Vec::new(),
            path,
        };
        if match_object(&own, &mut self.pending, &mut self.lookup.objects) {
            return true;
        }

        let entries = match self.volume.read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("failed to read directory {}: {err}", dir.index);
                return false;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!(
                        "stopped reading directory {}: {err}",
                        dir.index
                    );
                    return false;
                }
            };
            if entry.is_dot_or_dotdot() {
                continue;
            }
            if self.visit_entry(&own.path, &entry) {
                return true;
            }
        }
        false
    }

    /// Decode and match one directory entry. Returns true once every
    /// target has been found.
    fn visit_entry(&mut self, dir_path: &str, entry: &DirEntry) -> bool {
        log::trace!(
            "entry {:?} -> inode {}",
            entry.name_lossy(),
            entry.inode
        );

        let inode = match self.volume.read_inode(entry.inode) {
            Ok(inode) => inode,
            Err(err) => {
                log::warn!(
                    "skipping entry {:?} in {dir_path:?}: {err}",
                    entry.name_lossy()
                );
                return false;
            }
        };
        // Reported when the scan reaches them.
        if inode.is_dir() {
            return false;
        }
        self.lookup.stats.files_examined += 1;

        let kind = BlockMappingKind::of_file(&inode);
        let ranges = if kind == BlockMappingKind::ExtentMapped {
            decode_extents(self.volume, &inode).unwrap_or_else(|err| {
                log::warn!(
                    "failed to decode extents of inode {}: {err}",
                    inode.index
                );
                Vec::new()
            })
        } else {
            decode_classic(&inode)
        };

        let candidate = FilesystemObject {
            inode: u64::from(inode.index.get()),
            kind,
            ranges,
            path: join(dir_path, &entry.name_lossy()),
        };
        match_object(&candidate, &mut self.pending, &mut self.lookup.objects)
    }
}
