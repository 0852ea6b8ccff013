// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::open_image;
use crate::test_util::{ImageBuilder, ROOT, RawExtent, scenario_image};
use ext4_locate::{
    BlockMappingKind, BlockRange, Ext4Error, FilesystemObject, LocateError,
    OpenFlags, OpenOptions, TraversalStats,
};

fn a_txt() -> FilesystemObject {
    FilesystemObject {
        inode: 12,
        kind: BlockMappingKind::ClassicData,
        ranges: vec![BlockRange::new(100, 102)],
        path: "/sub/a.txt".to_owned(),
    }
}

fn stats(directories_visited: u64, files_examined: u64) -> TraversalStats {
    TraversalStats {
        directories_visited,
        files_examined,
    }
}

#[test]
fn test_lookup_by_inode() {
    let locator = open_image(scenario_image(), &OpenOptions::new());
    let lookup = locator.lookup(&[12], &[]).unwrap();
    assert_eq!(lookup.objects, [a_txt()]);
    assert_eq!(lookup.stats, stats(2, 1));
}

#[test]
fn test_lookup_by_block() {
    let locator = open_image(scenario_image(), &OpenOptions::new());
    let lookup = locator.lookup(&[], &[101]).unwrap();
    assert_eq!(lookup.objects, [a_txt()]);
    assert_eq!(lookup.stats, stats(2, 1));
}

#[test]
fn test_lookup_not_found() {
    let locator = open_image(scenario_image(), &OpenOptions::new());
    let lookup = locator.lookup(&[999], &[]).unwrap();
    assert!(lookup.objects.is_empty());
    assert_eq!(lookup.stats, stats(2, 1));
}

#[test]
fn test_lookup_directory() {
    let locator = open_image(scenario_image(), &OpenOptions::new());
    let lookup = locator.lookup(&[2, 11], &[]).unwrap();
    let found: Vec<(u64, BlockMappingKind, &str)> = lookup
        .objects
        .iter()
        .map(|o| (o.inode, o.kind, o.path.as_str()))
        .collect();
    assert_eq!(
        found,
        [
            (2, BlockMappingKind::DirectoryItself, "/"),
            (11, BlockMappingKind::DirectoryItself, "/sub"),
        ]
    );
    assert!(lookup.objects.iter().all(|o| o.ranges.is_empty()));
}

/// Inode, mapping flag, path, and ranges of a found object.
type Row = (u64, char, String, Vec<String>);

fn row(inode: u64, flag: char, path: &str, ranges: &[&str]) -> Row {
    (
        inode,
        flag,
        path.to_owned(),
        ranges.iter().map(|r| (*r).to_owned()).collect(),
    )
}

/// Every kind of inode on one volume, with each image variant.
#[test]
fn test_lookup_mixed_volume() {
    for builder in [
        ImageBuilder::new(),
        ImageBuilder::new().metadata_checksums(),
        ImageBuilder::new().group_descriptor_checksums(),
        ImageBuilder::new().extent_directories(),
    ] {
        let image = builder
            .dir(ROOT, 11, "usr")
            .dir(11, 12, "lib")
            .file(ROOT, 13, "notes", &[100, 0, 102, 103])
            .extent_file(
                12,
                14,
                "libc.so",
                &[RawExtent::new(0, 8, 500), RawExtent::new(8, 4, 200)],
            )
            .extent_tree_file(
                11,
                15,
                "big",
                vec![
                    vec![RawExtent::new(0, 16, 600)],
                    vec![RawExtent::new(16, 16, 700)],
                ],
            )
            .symlink(12, 16, "libc.so.6", "libc.so")
            .char_device(ROOT, 17, "null")
            .build();
        let locator = open_image(image, &OpenOptions::new());

        let lookup = locator
            .lookup(&[13, 16, 17], &[203, 710, 501])
            .unwrap();
        let mut found: Vec<Row> = lookup
            .objects
            .iter()
            .map(|o| {
                (
                    o.inode,
                    o.kind.flag(),
                    o.path.clone(),
                    o.ranges.iter().map(|r| r.to_string()).collect(),
                )
            })
            .collect();
        found.sort();
        assert_eq!(
            found,
            [
                row(13, 'd', "/notes", &["100-100", "102-103"]),
                row(14, 'e', "/usr/lib/libc.so", &["500-507", "200-203"]),
                row(14, 'e', "/usr/lib/libc.so", &["500-507", "200-203"]),
                row(15, 'e', "/usr/big", &["600-615", "700-715"]),
                row(16, 'd', "/usr/lib/libc.so.6", &[]),
                row(17, 'd', "/null", &[]),
            ]
        );
        assert_eq!(lookup.stats.directories_visited, 3);
        assert_eq!(lookup.stats.files_examined, 5);
    }
}

/// A volume with more directories than fit in one inode table block.
#[test]
fn test_lookup_many_directories() {
    let mut builder = ImageBuilder::new();
    for ino in 11..30 {
        builder = builder.dir(ROOT, ino, &format!("d{ino}"));
    }
    builder = builder.file(29, 30, "last", &[999]);
    let locator = open_image(builder.build(), &OpenOptions::new());

    let lookup = locator.lookup(&[], &[999]).unwrap();
    assert_eq!(lookup.objects.len(), 1);
    assert_eq!(lookup.objects[0].path, "/d29/last");
    assert_eq!(lookup.stats, stats(20, 1));
}

/// An inode with a bad checksum is skipped unless checksums are
/// ignored.
#[test]
fn test_lookup_bad_inode_checksum() {
    let mut image = ImageBuilder::new()
        .metadata_checksums()
        .dir(ROOT, 11, "sub")
        .file(11, 12, "a.txt", &[100, 101, 102])
        .build();
    // Change the access time of inode 12.
    let offset = ImageBuilder::inode_offset(12);
    image[offset + 0x8] ^= 0xff;

    let locator = open_image(image.clone(), &OpenOptions::new());
    let lookup = locator.lookup(&[12], &[]).unwrap();
    assert!(lookup.objects.is_empty());
    assert_eq!(lookup.stats, stats(2, 0));

    let options = OpenOptions::new().flags(OpenFlags::IGNORE_CSUM_ERRORS);
    let locator = open_image(image, &options);
    let lookup = locator.lookup(&[12], &[]).unwrap();
    assert_eq!(lookup.objects, [a_txt()]);
}

/// A directory with a bad checksum is not visited, but the rest of the
/// volume is.
#[test]
fn test_lookup_bad_directory_inode() {
    let mut image = ImageBuilder::new()
        .metadata_checksums()
        .dir(ROOT, 11, "sub")
        .file(11, 12, "a.txt", &[100, 101, 102])
        .file(ROOT, 13, "b", &[50])
        .build();
    let offset = ImageBuilder::inode_offset(11);
    image[offset + 0x8] ^= 0xff;

    let locator = open_image(image, &OpenOptions::new());
    let lookup = locator.lookup(&[12, 13], &[]).unwrap();
    assert_eq!(lookup.objects.len(), 1);
    assert_eq!(lookup.objects[0].path, "/b");
    assert_eq!(lookup.stats, stats(1, 1));
}

#[test]
fn test_lookup_backup_superblock() {
    let mut image = ImageBuilder::new()
        .group_descriptor_checksums()
        .backup_superblock_at(200)
        .dir(ROOT, 11, "sub")
        .file(11, 12, "a.txt", &[100, 101, 102])
        .build();
    // Wipe the primary superblock.
    image[1024..2048].fill(0);

    let options = OpenOptions::new().superblock(200).block_size(1024);
    let locator = open_image(image, &options);
    let lookup = locator.lookup(&[], &[100]).unwrap();
    assert_eq!(lookup.objects, [a_txt()]);
}

/// A directory block that can't be parsed ends that directory; the rest
/// of the volume is still searched.
#[test]
fn test_lookup_corrupt_directory_block() {
    // Directory blocks are allocated in inode order from block 300, so
    // the root is in block 300 and `/sub` in block 301.
    let image = ImageBuilder::new()
        .dir(ROOT, 11, "sub")
        .file(11, 12, "a.txt", &[100, 101, 102])
        .file(ROOT, 13, "b", &[50])
        .raw_block(301, vec![0xff; 1024])
        .build();

    let locator = open_image(image, &OpenOptions::new());
    let lookup = locator.lookup(&[12, 13], &[]).unwrap();
    assert_eq!(lookup.objects.len(), 1);
    assert_eq!(lookup.objects[0].path, "/b");
    assert_eq!(lookup.stats, stats(2, 1));
}

/// A file whose extent tree breaks partway through is still found by
/// inode, with no ranges. Blocks from the leaves read before the error
/// are not reported.
#[test]
fn test_lookup_broken_extent_tree() {
    let mut image = ImageBuilder::new()
        .metadata_checksums()
        .extent_tree_file(
            ROOT,
            12,
            "f",
            vec![
                vec![RawExtent::new(0, 2, 100)],
                vec![RawExtent::new(2, 3, 110)],
            ],
        )
        .build();
    // Second index entry of the root node, then its leaf block.
    let offset = ImageBuilder::inode_offset(12) + 0x28 + 24 + 4;
    let leaf: [u8; 4] = image[offset..offset + 4].try_into().unwrap();
    let leaf = usize::try_from(u32::from_le_bytes(leaf)).unwrap();
    image[leaf * 1024 + 12 + 4] = 9;

    let locator = open_image(image, &OpenOptions::new());
    let lookup = locator.lookup(&[12], &[100]).unwrap();
    assert_eq!(
        lookup.objects,
        [FilesystemObject {
            inode: 12,
            kind: BlockMappingKind::ExtentMapped,
            ranges: Vec::new(),
            path: "/f".to_owned(),
        }]
    );
    assert_eq!(lookup.stats, stats(1, 1));
}

/// An inode table that can't be read at all fails the lookup.
#[test]
fn test_lookup_unreachable_inode_table() {
    let image = scenario_image();
    let image = image[..ImageBuilder::inode_offset(1)].to_vec();

    let locator = open_image(image, &OpenOptions::new());
    assert!(matches!(
        locator.lookup(&[12], &[]),
        Err(LocateError::ScanOpen(Ext4Error::Io(_)))
    ));
}
