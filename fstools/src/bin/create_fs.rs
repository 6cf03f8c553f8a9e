//! create_fs -- format a fresh Kestrel filesystem image.
//!
//! Usage:
//!   create_fs <block size (0.5 or 1)> <image path>
//!
//! Writes a zeroed image: superblock, FAT, directory, 4 MiB data region.

use std::env;
use std::path::Path;
use std::process;

use kestrel_fstools::image::{BlockSize, FsImage};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        println!("Usage: {} <block size (0.5 or 1)> <image path>", args[0]);
        process::exit(1);
    }

    let Some(block_size) = BlockSize::from_arg(&args[1]) else {
        println!("Supported block sizes are 0.5 KB and 1 KB");
        process::exit(1);
    };

    let image = FsImage::create(block_size);
    if let Err(err) = image.save(Path::new(&args[2])) {
        println!("Failed to create file system: {}", err);
        process::exit(1);
    }

    println!(
        "File system created: {} with block size {} bytes",
        args[2],
        block_size.bytes()
    );
}
