// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::{Context, Result, ensure};
use clap::{ArgAction, Parser};
use ext4_locate::{FilesystemObject, Locator, Lookup, OpenFlags, OpenOptions};
use log::LevelFilter;
use std::path::PathBuf;
use tabled::builder::Builder;
use tabled::settings::object::Column;
use tabled::settings::{Alignment, Style};

/// Find which files own blocks, or where inodes live, in an ext2/3/4
/// filesystem.
#[derive(Parser)]
struct Opt {
    /// Path of a block device or image containing the filesystem.
    #[arg(short, long)]
    device: PathBuf,

    /// Inode number to look up. May be repeated or comma separated.
    #[arg(short, long = "inode", value_delimiter = ',')]
    inodes: Vec<u64>,

    /// Physical block number to look up. May be repeated or comma
    /// separated.
    #[arg(short, long = "block", value_delimiter = ',')]
    blocks: Vec<u64>,

    /// Do not print the header line.
    #[arg(short = 'H')]
    no_header: bool,

    /// Print how many directories and files were examined.
    #[arg(short)]
    stats: bool,

    /// Read the superblock from this block instead of the primary
    /// one. Requires --block-size.
    #[arg(long, requires = "block_size")]
    superblock: Option<u64>,

    /// Expected block size in bytes.
    #[arg(long)]
    block_size: Option<u32>,

    /// Open the filesystem even if it uses unsupported features.
    #[arg(long)]
    force: bool,

    /// Do not verify metadata checksums.
    #[arg(long)]
    ignore_checksums: bool,

    /// Log more details. Repeat for more.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Opt {
    fn open_options(&self) -> OpenOptions {
        let mut flags = OpenFlags::empty();
        if self.force {
            flags |= OpenFlags::FORCE;
        }
        if self.ignore_checksums {
            flags |= OpenFlags::IGNORE_CSUM_ERRORS;
        }

        let mut options = OpenOptions::new().flags(flags);
        if let Some(block) = self.superblock {
            options = options.superblock(block);
        }
        if let Some(block_size) = self.block_size {
            options = options.block_size(block_size);
        }
        options
    }

    fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// `[D]`, `[e]`, or `[d]`.
fn flags_column(object: &FilesystemObject) -> String {
    format!("[{}]", object.kind.flag())
}

/// Block count and ranges, or two empty cells if there are no ranges.
fn blocks_columns(object: &FilesystemObject) -> [String; 2] {
    if object.ranges.is_empty() {
        return [String::new(), String::new()];
    }
    let ranges: Vec<String> =
        object.ranges.iter().map(ToString::to_string).collect();
    [format!("#{}", object.num_blocks()), ranges.join(" ")]
}

fn lookup_to_string(lookup: &Lookup, header: bool) -> String {
    let mut builder = Builder::new();
    if header {
        builder.push_record([
            "Inode", "Filename", "[flags]", "#Blocks", "Blocks",
        ]);
    }
    for object in &lookup.objects {
        let [count, ranges] = blocks_columns(object);
        builder.push_record([
            object.inode.to_string(),
            object.path.clone(),
            flags_column(object),
            count,
            ranges,
        ]);
    }

    builder
        .build()
        .modify(Column::from(0), Alignment::right())
        .with(Style::empty())
        .to_string()
}

fn stats_to_string(lookup: &Lookup) -> String {
    format!(
        "Processed {} dirs, {} files, {} matches",
        lookup.stats.directories_visited,
        lookup.stats.files_examined,
        lookup.objects.len()
    )
}

fn run(opt: &Opt) -> Result<()> {
    ensure!(
        !opt.inodes.is_empty() || !opt.blocks.is_empty(),
        "at least one --inode or --block is required"
    );

    let mut locator = Locator::new();
    locator
        .open(&opt.device, &opt.open_options())
        .with_context(|| {
            format!("error opening filesystem {}", opt.device.display())
        })?;

    let lookup = locator
        .lookup(&opt.inodes, &opt.blocks)
        .context("error looking up filesystem objects")?;
    locator.close()?;

    if opt.stats {
        println!("{}", stats_to_string(&lookup));
    }
    if !lookup.objects.is_empty() || !opt.no_header {
        println!("{}", lookup_to_string(&lookup, !opt.no_header));
    }

    Ok(())
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    env_logger::Builder::new()
        .filter_level(opt.log_level())
        .parse_default_env()
        .init();
    run(&opt)
}
