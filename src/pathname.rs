// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Absolute path of a directory inode.
//!
//! Directories have no name of their own; the path is found by
//! following `..` entries up to the root and looking up each
//! directory's name in its parent.

use crate::Ext4;
use crate::error::Ext4Error;
use crate::inode::{Inode, InodeIndex};
use crate::iters::read_dir::ReadDir;

/// Inode number of the root directory.
// OK to unwrap: 2 is non-zero.
pub(crate) const ROOT_INODE: InodeIndex = InodeIndex::new(2).unwrap();

/// Upper bound on the number of steps to the root. Each step adds at
/// least two bytes to the path, so this is well past `PATH_MAX`.
const MAX_DEPTH: usize = 4096;

/// Get the absolute path of directory `dir`, e.g. `/usr/lib`. The root
/// directory is `/`.
///
/// Resolved paths, including those of every ancestor walked through,
/// are cached on `fs`.
pub(crate) fn pathname(
    fs: &Ext4,
    dir: InodeIndex,
) -> Result<String, Ext4Error> {
    if dir == ROOT_INODE {
        return Ok("/".to_owned());
    }

    // Each directory on the way up, with its name in its parent.
    let mut chain: Vec<(InodeIndex, String)> = Vec::new();
    let mut current = dir;
    let mut path = loop {
        if current == ROOT_INODE {
            break String::new();
        }
        if let Some(cached) = fs.cached_path(current) {
            break cached;
        }
        if chain.len() >= MAX_DEPTH {
            return Err(Ext4Error::PathTooDeep(dir.get()));
        }

        let inode = fs.read_inode(current)?;
        let parent = find_parent(fs, &inode)?;
        let parent_inode = fs.read_inode(parent)?;
        let name = find_name(fs, &parent_inode, current)?;
        chain.push((current, name));
        current = parent;
    };

    for (inode, name) in chain.iter().rev() {
        path.push('/');
        path.push_str(name);
        fs.cache_path(*inode, &path);
    }
    log::trace!("directory {dir} is {path}");
    Ok(path)
}

/// Get the target of the `..` entry of `dir`.
fn find_parent(fs: &Ext4, dir: &Inode) -> Result<InodeIndex, Ext4Error> {
    for entry in ReadDir::new(fs.clone(), dir)? {
        let entry = entry?;
        if entry.name == b".." {
            return Ok(entry.inode);
        }
    }
    Err(Ext4Error::NotLinked(dir.index.get()))
}

/// Get the name under which `child` appears in `parent`.
fn find_name(
    fs: &Ext4,
    parent: &Inode,
    child: InodeIndex,
) -> Result<String, Ext4Error> {
    for entry in ReadDir::new(fs.clone(), parent)? {
        let entry = entry?;
        if entry.inode == child && !entry.is_dot_or_dotdot() {
            return Ok(entry.name_lossy().into_owned());
        }
    }
    Err(Ext4Error::NotLinked(child.get()))
}
