// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// In addition to being used as a regular module in lib.rs, this module
// is used in `tests` via the `include!` macro, so it must not use
// anything private to the crate.

use std::collections::BTreeMap;

/// Block size of every image produced by [`ImageBuilder`].
pub(crate) const BLOCK_SIZE: usize = 1024;

/// Inode number of the root directory.
pub(crate) const ROOT: u32 = 2;

const INODE_SIZE: usize = 128;
const INODE_TABLE_BLOCK: u32 = 5;
const GROUP_DESCRIPTOR_BLOCK: u32 = 2;
const BLOCKS_PER_GROUP: u32 = 8192;
const DIR_TAIL_SIZE: usize = 12;
const EXTENT_MAGIC: u16 = 0xf30a;
const UUID: [u8; 16] = [
    0x6c, 0x6f, 0x63, 0x61, 0x74, 0x65, 0x2d, 0x74, 0x65, 0x73, 0x74, 0x2d,
    0x75, 0x75, 0x69, 0x64,
];

const S_IFCHR: u16 = 0x2000;
const S_IFDIR: u16 = 0x4000;
const S_IFREG: u16 = 0x8000;
const S_IFLNK: u16 = 0xa000;
const EXTENTS_FL: u32 = 0x8_0000;

const FT_REG_FILE: u8 = 1;
const FT_DIR: u8 = 2;
const FT_CHRDEV: u8 = 3;
const FT_SYMLINK: u8 = 7;

/// One leaf extent as written to disk.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawExtent {
    pub(crate) logical: u32,
    /// Raw `ee_len`; values above 32768 mark an uninitialized extent.
    pub(crate) len: u16,
    pub(crate) physical: u64,
}

impl RawExtent {
    pub(crate) fn new(logical: u32, len: u16, physical: u64) -> Self {
        Self {
            logical,
            len,
            physical,
        }
    }
}

#[derive(Clone, Debug)]
enum Mapping {
    /// Direct block pointers, at most twelve.
    Direct(Vec<u32>),
    /// Leaf extents stored in the inode, at most four.
    Extents(Vec<RawExtent>),
    /// Depth-one tree; each inner vec becomes one leaf block.
    ExtentTree(Vec<Vec<RawExtent>>),
    /// Raw `i_block` bytes.
    Inline([u8; 60]),
}

#[derive(Clone, Debug)]
struct InodeSpec {
    mode: u16,
    links: u16,
    size: u64,
    mapping: Mapping,
}

/// Crc32c in the same form the kernel uses for metadata checksums.
fn crc32c(seed: u32, parts: &[&[u8]]) -> u32 {
    const CRC32C: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISCSI);
    let mut digest = CRC32C.digest_with_initial(seed.reverse_bits());
    for part in parts {
        digest.update(part);
    }
    digest.finalize() ^ (!0)
}

fn crc16(parts: &[&[u8]]) -> u16 {
    const CRC16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);
    let mut digest = CRC16.digest();
    for part in parts {
        digest.update(part);
    }
    digest.finalize()
}

fn put_u16(buf: &mut [u8], offset: usize, val: u16) {
    buf[offset..offset + 2].copy_from_slice(&val.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, val: u32) {
    buf[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
}

fn lo32(val: u64) -> u32 {
    u32::try_from(val & 0xffff_ffff).unwrap()
}

fn hi16(val: u64) -> u16 {
    u16::try_from((val >> 32) & 0xffff).unwrap()
}

/// Checksum seed of an image: there is no `CHECKSUM_SEED_IN_SUPERBLOCK`
/// feature, so it is derived from the UUID.
pub(crate) fn checksum_seed() -> u32 {
    crc32c(!0, &[&UUID])
}

/// Write an extent node header.
fn put_extent_header(buf: &mut [u8], entries: u16, max: u16, depth: u16) {
    put_u16(buf, 0, EXTENT_MAGIC);
    put_u16(buf, 2, entries);
    put_u16(buf, 4, max);
    put_u16(buf, 6, depth);
    put_u32(buf, 8, 0);
}

fn put_leaf_extent(buf: &mut [u8], offset: usize, extent: &RawExtent) {
    put_u32(buf, offset, extent.logical);
    put_u16(buf, offset + 4, extent.len);
    put_u16(buf, offset + 6, hi16(extent.physical));
    put_u32(buf, offset + 8, lo32(extent.physical));
}

/// Encode a 128-byte inode record.
///
/// If `checksum_seed` is set, the inode checksum is filled in.
pub(crate) fn encode_inode(
    ino: u32,
    mode: u16,
    links: u16,
    size: u64,
    flags: u32,
    i_block: &[u8; 60],
    checksum_seed: Option<u32>,
) -> [u8; INODE_SIZE] {
    let mut raw = [0; INODE_SIZE];
    put_u16(&mut raw, 0x0, mode);
    put_u32(&mut raw, 0x4, lo32(size));
    put_u16(&mut raw, 0x1a, links);
    let sectors = size.div_ceil(512);
    put_u32(&mut raw, 0x1c, lo32(sectors));
    put_u32(&mut raw, 0x20, flags);
    raw[0x28..0x28 + 60].copy_from_slice(i_block);
    put_u32(&mut raw, 0x6c, u32::try_from(size >> 32).unwrap());

    if let Some(seed) = checksum_seed {
        let generation = [0; 4];
        let csum = crc32c(seed, &[&ino.to_le_bytes(), &generation, &raw]);
        put_u16(&mut raw, 0x7c, u16::try_from(csum & 0xffff).unwrap());
    }
    raw
}

/// `i_block` holding direct block pointers.
pub(crate) fn direct_i_block(blocks: &[u32]) -> [u8; 60] {
    assert!(blocks.len() <= 12);
    let mut i_block = [0; 60];
    for (i, block) in blocks.iter().enumerate() {
        put_u32(&mut i_block, i * 4, *block);
    }
    i_block
}

/// `i_block` holding an extent tree root of depth zero.
pub(crate) fn extents_i_block(extents: &[RawExtent]) -> [u8; 60] {
    assert!(extents.len() <= 4);
    let mut i_block = [0; 60];
    put_extent_header(
        &mut i_block,
        u16::try_from(extents.len()).unwrap(),
        4,
        0,
    );
    for (i, extent) in extents.iter().enumerate() {
        put_leaf_extent(&mut i_block, 12 * (i + 1), extent);
    }
    i_block
}

/// Builder for small single-group ext2/ext4 images with 1KiB blocks.
///
/// The image always contains the root directory. Directory blocks and
/// extent leaf blocks are allocated from block 300 upward, so tests are
/// free to use lower block numbers for file data. File data blocks are
/// never written; the locator never reads them.
#[derive(Clone, Debug)]
pub(crate) struct ImageBuilder {
    blocks_count: u32,
    inodes_per_group: u32,
    metadata_checksums: bool,
    group_descriptor_checksums: bool,
    extent_directories: bool,
    itable_unused: u16,
    backup_superblock: Option<u32>,
    inodes: BTreeMap<u32, InodeSpec>,
    dir_entries: BTreeMap<u32, Vec<(Vec<u8>, u32, u8)>>,
    raw_blocks: BTreeMap<u32, Vec<u8>>,
    next_free_block: u32,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    pub(crate) fn new() -> Self {
        let mut builder = Self {
            blocks_count: 1024,
            inodes_per_group: 32,
            metadata_checksums: false,
            group_descriptor_checksums: false,
            extent_directories: false,
            itable_unused: 0,
            backup_superblock: None,
            inodes: BTreeMap::new(),
            dir_entries: BTreeMap::new(),
            raw_blocks: BTreeMap::new(),
            next_free_block: 300,
        };
        builder.add_dir_inode(ROOT, ROOT);
        builder
    }

    pub(crate) fn metadata_checksums(mut self) -> Self {
        self.metadata_checksums = true;
        self
    }

    pub(crate) fn group_descriptor_checksums(mut self) -> Self {
        self.group_descriptor_checksums = true;
        self
    }

    /// Store directory blocks with an extent tree instead of direct
    /// block pointers.
    pub(crate) fn extent_directories(mut self) -> Self {
        self.extent_directories = true;
        self
    }

    /// Mark the last `count` inodes of the group as never used.
    pub(crate) fn itable_unused(mut self, count: u16) -> Self {
        self.itable_unused = count;
        self
    }

    /// Also write a copy of the superblock at `block`, followed by a
    /// copy of the group descriptor table.
    pub(crate) fn backup_superblock_at(mut self, block: u32) -> Self {
        self.backup_superblock = Some(block);
        self
    }

    /// Place raw data in a block.
    pub(crate) fn raw_block(mut self, block: u32, data: Vec<u8>) -> Self {
        assert!(data.len() <= BLOCK_SIZE);
        self.raw_blocks.insert(block, data);
        self
    }

    fn add_dir_inode(&mut self, ino: u32, parent: u32) {
        self.inodes.insert(
            ino,
            InodeSpec {
                mode: S_IFDIR | 0o755,
                links: 2,
                size: 0,
                mapping: Mapping::Direct(Vec::new()),
            },
        );
        self.dir_entries.insert(
            ino,
            vec![(b".".to_vec(), ino, FT_DIR), (b"..".to_vec(), parent, FT_DIR)],
        );
    }

    fn link(&mut self, parent: u32, name: &str, ino: u32, file_type: u8) {
        self.dir_entries
            .get_mut(&parent)
            .expect("parent directory must exist")
            .push((name.as_bytes().to_vec(), ino, file_type));
    }

    fn add_inode(
        mut self,
        parent: u32,
        ino: u32,
        name: &str,
        mode: u16,
        size: u64,
        mapping: Mapping,
        file_type: u8,
    ) -> Self {
        assert!(!self.inodes.contains_key(&ino), "inode {ino} already exists");
        self.inodes.insert(
            ino,
            InodeSpec {
                mode,
                links: 1,
                size,
                mapping,
            },
        );
        self.link(parent, name, ino, file_type);
        self
    }

    /// Add a directory named `name` inside `parent`.
    pub(crate) fn dir(mut self, parent: u32, ino: u32, name: &str) -> Self {
        assert!(!self.inodes.contains_key(&ino), "inode {ino} already exists");
        self.add_dir_inode(ino, parent);
        self.link(parent, name, ino, FT_DIR);
        self.inodes.get_mut(&parent).unwrap().links += 1;
        self
    }

    /// Add a directory inode with a zero link count that no directory
    /// refers to (a deleted directory).
    pub(crate) fn deleted_dir(mut self, ino: u32) -> Self {
        self.add_dir_inode(ino, ROOT);
        self.inodes.get_mut(&ino).unwrap().links = 0;
        self
    }

    /// Add a regular file using direct block pointers. Zero entries
    /// are holes.
    pub(crate) fn file(
        self,
        parent: u32,
        ino: u32,
        name: &str,
        blocks: &[u32],
    ) -> Self {
        let size = u64::try_from(blocks.len() * BLOCK_SIZE).unwrap();
        self.add_inode(
            parent,
            ino,
            name,
            S_IFREG | 0o644,
            size,
            Mapping::Direct(blocks.to_vec()),
            FT_REG_FILE,
        )
    }

    /// Add a regular file whose extents live in the inode.
    pub(crate) fn extent_file(
        self,
        parent: u32,
        ino: u32,
        name: &str,
        extents: &[RawExtent],
    ) -> Self {
        let size = extents
            .iter()
            .map(|e| u64::from(e.logical) + u64::from(e.len & 0x7fff))
            .max()
            .unwrap_or(0)
            * 1024;
        self.add_inode(
            parent,
            ino,
            name,
            S_IFREG | 0o644,
            size,
            Mapping::Extents(extents.to_vec()),
            FT_REG_FILE,
        )
    }

    /// Add a regular file with a depth-one extent tree.
    pub(crate) fn extent_tree_file(
        self,
        parent: u32,
        ino: u32,
        name: &str,
        leaves: Vec<Vec<RawExtent>>,
    ) -> Self {
        assert!(leaves.len() <= 4);
        self.add_inode(
            parent,
            ino,
            name,
            S_IFREG | 0o644,
            0,
            Mapping::ExtentTree(leaves),
            FT_REG_FILE,
        )
    }

    /// Add a fast symlink, with the target stored in the inode.
    pub(crate) fn symlink(
        self,
        parent: u32,
        ino: u32,
        name: &str,
        target: &str,
    ) -> Self {
        assert!(target.len() < 60);
        let mut i_block = [0; 60];
        i_block[..target.len()].copy_from_slice(target.as_bytes());
        self.add_inode(
            parent,
            ino,
            name,
            S_IFLNK | 0o777,
            u64::try_from(target.len()).unwrap(),
            Mapping::Inline(i_block),
            FT_SYMLINK,
        )
    }

    /// Add a character device. The device number lives in `i_block`.
    pub(crate) fn char_device(
        self,
        parent: u32,
        ino: u32,
        name: &str,
    ) -> Self {
        self.add_inode(
            parent,
            ino,
            name,
            S_IFCHR | 0o600,
            0,
            Mapping::Direct(vec![0x0103]),
            FT_CHRDEV,
        )
    }

    /// Add another name for an existing inode.
    pub(crate) fn hard_link(mut self, parent: u32, ino: u32, name: &str) -> Self {
        let spec = self.inodes.get_mut(&ino).expect("inode must exist");
        spec.links += 1;
        let file_type = if spec.mode & 0xf000 == S_IFDIR {
            FT_DIR
        } else {
            FT_REG_FILE
        };
        self.link(parent, name, ino, file_type);
        self
    }

    fn alloc_block(&mut self) -> u32 {
        let block = self.next_free_block;
        self.next_free_block += 1;
        assert!(block < self.blocks_count);
        block
    }

    /// Byte offset of inode `ino` within a built image.
    pub(crate) fn inode_offset(ino: u32) -> usize {
        let table = usize::try_from(INODE_TABLE_BLOCK).unwrap() * BLOCK_SIZE;
        table + usize::try_from(ino - 1).unwrap() * INODE_SIZE
    }

    /// Serialize directory entries into blocks.
    fn dir_blocks(&self, entries: &[(Vec<u8>, u32, u8)]) -> Vec<Vec<u8>> {
        let usable = if self.metadata_checksums {
            BLOCK_SIZE - DIR_TAIL_SIZE
        } else {
            BLOCK_SIZE
        };

        let finish = |block: &mut Vec<u8>, last: usize| {
            let rec_len = u16::try_from(usable - last).unwrap();
            put_u16(block, last + 4, rec_len);
            if usable != BLOCK_SIZE {
                // Checksum tail: an empty entry with a fixed size.
                put_u32(block, usable, 0);
                put_u16(block, usable + 4, 12);
                block[usable + 6] = 0;
                block[usable + 7] = 0xde;
            }
        };

        let mut blocks = Vec::new();
        let mut block = vec![0; BLOCK_SIZE];
        let mut offset = 0;
        let mut last = 0;
        for (name, ino, file_type) in entries {
            let rec_len = (8 + name.len()).next_multiple_of(4);
            if offset + rec_len > usable {
                finish(&mut block, last);
                blocks.push(block);
                block = vec![0; BLOCK_SIZE];
                offset = 0;
            }
            put_u32(&mut block, offset, *ino);
            put_u16(&mut block, offset + 4, u16::try_from(rec_len).unwrap());
            block[offset + 6] = u8::try_from(name.len()).unwrap();
            block[offset + 7] = *file_type;
            block[offset + 8..offset + 8 + name.len()].copy_from_slice(name);
            last = offset;
            offset += rec_len;
        }
        finish(&mut block, last);
        blocks.push(block);
        blocks
    }

    fn write_block(image: &mut [u8], block: u32, data: &[u8]) {
        let start = usize::try_from(block).unwrap() * BLOCK_SIZE;
        image[start..start + data.len()].copy_from_slice(data);
    }

    fn uses_extents(&self) -> bool {
        self.extent_directories
            || self.inodes.values().any(|spec| {
                matches!(
                    spec.mapping,
                    Mapping::Extents(_) | Mapping::ExtentTree(_)
                )
            })
    }

    fn superblock(&self) -> Vec<u8> {
        let mut sb = vec![0; 1024];
        put_u32(&mut sb, 0x0, self.inodes_per_group);
        put_u32(&mut sb, 0x4, self.blocks_count);
        put_u32(&mut sb, 0x14, 1);
        put_u32(&mut sb, 0x18, 0);
        put_u32(&mut sb, 0x20, BLOCKS_PER_GROUP);
        put_u32(&mut sb, 0x24, BLOCKS_PER_GROUP);
        put_u32(&mut sb, 0x28, self.inodes_per_group);
        put_u16(&mut sb, 0x38, 0xef53);
        put_u16(&mut sb, 0x3a, 1);
        put_u32(&mut sb, 0x4c, 1);
        put_u32(&mut sb, 0x54, 11);
        put_u16(&mut sb, 0x58, u16::try_from(INODE_SIZE).unwrap());

        let mut incompat = 0x2;
        if self.uses_extents() {
            incompat |= 0x40;
        }
        put_u32(&mut sb, 0x60, incompat);

        let mut ro_compat = 0x1 | 0x2;
        if self.metadata_checksums {
            ro_compat |= 0x400;
        } else if self.group_descriptor_checksums {
            ro_compat |= 0x10;
        }
        put_u32(&mut sb, 0x64, ro_compat);
        sb[0x68..0x68 + 16].copy_from_slice(&UUID);
        sb[0x78..0x78 + 11].copy_from_slice(b"locate-test");

        if self.metadata_checksums {
            sb[0x175] = 1;
            let csum = crc32c(!0, &[&sb[..0x3fc]]);
            put_u32(&mut sb, 0x3fc, csum);
        }
        sb
    }

    fn group_descriptor(&self) -> Vec<u8> {
        let mut desc = vec![0; 32];
        put_u32(&mut desc, 0x0, 3);
        put_u32(&mut desc, 0x4, 4);
        put_u32(&mut desc, 0x8, INODE_TABLE_BLOCK);
        put_u16(&mut desc, 0x1c, self.itable_unused);

        let group = 0u32.to_le_bytes();
        if self.metadata_checksums {
            let csum = crc32c(
                checksum_seed(),
                &[&group, &desc[..0x1e], &[0, 0], &desc[0x20..]],
            );
            put_u16(&mut desc, 0x1e, u16::try_from(csum & 0xffff).unwrap());
        } else if self.group_descriptor_checksums {
            let csum = crc16(&[&UUID, &group, &desc[..0x1e]]);
            put_u16(&mut desc, 0x1e, csum);
        }
        desc
    }

    /// Produce the image.
    pub(crate) fn build(mut self) -> Vec<u8> {
        let mut image =
            vec![0; usize::try_from(self.blocks_count).unwrap() * BLOCK_SIZE];
        let seed = self.metadata_checksums.then(checksum_seed);

        // Directory data.
        let dirs: Vec<u32> = self.dir_entries.keys().copied().collect();
        for dir in dirs {
            let blocks = self.dir_blocks(&self.dir_entries[&dir]);
            let mut allocated = Vec::new();
            for data in &blocks {
                let block = self.alloc_block();
                Self::write_block(&mut image, block, data);
                allocated.push(block);
            }
            let spec = self.inodes.get_mut(&dir).unwrap();
            spec.size = u64::try_from(blocks.len() * BLOCK_SIZE).unwrap();
            spec.mapping = if self.extent_directories {
                Mapping::Extents(vec![RawExtent::new(
                    0,
                    u16::try_from(allocated.len()).unwrap(),
                    u64::from(allocated[0]),
                )])
            } else {
                Mapping::Direct(allocated)
            };
        }

        // Inodes.
        let inos: Vec<u32> = self.inodes.keys().copied().collect();
        for ino in inos {
            let spec = self.inodes[&ino].clone();
            let (flags, i_block) = match &spec.mapping {
                Mapping::Direct(blocks) => (0, direct_i_block(blocks)),
                Mapping::Extents(extents) => {
                    (EXTENTS_FL, extents_i_block(extents))
                }
                Mapping::Inline(i_block) => (0, *i_block),
                Mapping::ExtentTree(leaves) => {
                    let mut i_block = [0; 60];
                    put_extent_header(
                        &mut i_block,
                        u16::try_from(leaves.len()).unwrap(),
                        4,
                        1,
                    );
                    for (i, leaf) in leaves.iter().enumerate() {
                        let block = self.alloc_block();
                        let mut node = vec![0; BLOCK_SIZE];
                        let max = u16::try_from((BLOCK_SIZE - 12) / 12).unwrap();
                        put_extent_header(
                            &mut node,
                            u16::try_from(leaf.len()).unwrap(),
                            max,
                            0,
                        );
                        for (j, extent) in leaf.iter().enumerate() {
                            put_leaf_extent(&mut node, 12 * (j + 1), extent);
                        }
                        if let Some(seed) = seed {
                            let tail = 12 * (usize::from(max) + 1);
                            let csum = crc32c(
                                seed,
                                &[&ino.to_le_bytes(), &[0; 4], &node[..tail]],
                            );
                            put_u32(&mut node, tail, csum);
                        }
                        Self::write_block(&mut image, block, &node);

                        let offset = 12 * (i + 1);
                        let first = leaf.first().map_or(0, |e| e.logical);
                        put_u32(&mut i_block, offset, first);
                        put_u32(&mut i_block, offset + 4, block);
                        put_u16(&mut i_block, offset + 8, 0);
                    }
                    (EXTENTS_FL, i_block)
                }
            };
            let raw = encode_inode(
                ino, spec.mode, spec.links, spec.size, flags, &i_block, seed,
            );
            let offset = Self::inode_offset(ino);
            image[offset..offset + INODE_SIZE].copy_from_slice(&raw);
        }

        let sb = self.superblock();
        let desc = self.group_descriptor();
        image[1024..2048].copy_from_slice(&sb);
        Self::write_block(&mut image, GROUP_DESCRIPTOR_BLOCK, &desc);
        if let Some(backup) = self.backup_superblock {
            Self::write_block(&mut image, backup, &sb);
            Self::write_block(&mut image, backup + 1, &desc);
        }

        for (block, data) in &self.raw_blocks {
            Self::write_block(&mut image, *block, data);
        }

        image
    }
}

/// The example volume used throughout the tests:
///
/// ```text
/// 2   /
/// 11  /sub
/// 12  /sub/a.txt   blocks 100..=102
/// ```
pub(crate) fn scenario_image() -> Vec<u8> {
    ImageBuilder::new()
        .dir(ROOT, 11, "sub")
        .file(11, 12, "a.txt", &[100, 101, 102])
        .build()
}
