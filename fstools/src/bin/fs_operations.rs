//! fs_operations -- manipulate an existing Kestrel filesystem image.
//!
//! Usage:
//!   fs_operations <image path> <operation> [args...]
//!
//! Operations:
//!   dir [path]                         list a directory (default: \)
//!   mkdir <path>                       create a directory path
//!   rmdir <dirname>                    remove a directory entry
//!   write <name> <source> [password]   copy a host file in
//!   read <name> <destination> [password]  copy a file out
//!   del <name>                         delete a file and free its chain
//!   chmod <name> <+|-><rw subset>      toggle owner read/write bits
//!   addpw <name> <password>            password protect a file
//!   dumpe2fs                           dump superblock and directory
//!
//! Operation-level failures (not found, bad password, no free blocks) are
//! reported as messages and the image is still rewritten; argument errors
//! and host I/O failures exit non-zero, and an image that failed to load
//! is never rewritten.

use std::env;
use std::path::Path;
use std::process;

use anyhow::{bail, Context, Result};

use kestrel_fstools::error::FsError;
use kestrel_fstools::image::FsImage;
use kestrel_fstools::ops;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: {} <image path> <operation> [args...]", args[0]);
        process::exit(1);
    }

    if let Err(err) = run(&args) {
        println!("{:#}", err);
        process::exit(1);
    }
}

/// Check the exact argument count for an operation, allowing one optional
/// trailing argument when `optional` is set.
fn expect_args(args: &[String], required: usize, optional: bool, usage: &str) -> Result<()> {
    let max = if optional { required + 1 } else { required };
    if args.len() < required || args.len() > max {
        bail!("Usage: {} <image path> {} {}", args[0], args[2], usage);
    }
    Ok(())
}

/// Print the outcome of one image operation: a confirmation line on
/// success, the error message on an operation-level failure.
fn report(result: std::result::Result<(), FsError>, success: String) {
    match result {
        Ok(()) => println!("{}", success),
        Err(err) => println!("{}", err),
    }
}

fn run(args: &[String]) -> Result<()> {
    let image_path = Path::new(&args[1]);
    let op = args[2].as_str();

    let mut img = FsImage::load(image_path)
        .with_context(|| format!("failed to open file system {}", args[1]))?;

    match op {
        "dir" => {
            expect_args(args, 3, true, "[path]")?;
            let path = args.get(3).map(String::as_str).unwrap_or("\\");
            println!("Listing directory: {}", path);
            for name in ops::list(&img, path) {
                println!("{}", name);
            }
        }
        "mkdir" => {
            expect_args(args, 4, false, "<path>")?;
            report(
                ops::mkdir(&mut img, &args[3]),
                format!("Directory created: {}", args[3]),
            );
        }
        "rmdir" => {
            expect_args(args, 4, false, "<dirname>")?;
            report(
                ops::rmdir(&mut img, &args[3]),
                format!("Directory removed: {}", args[3]),
            );
        }
        "write" => {
            expect_args(args, 5, true, "<name> <source> [password]")?;
            let password = args.get(5).map(String::as_str);
            report(
                ops::write_file(&mut img, &args[3], Path::new(&args[4]), password),
                format!("File written: {}", args[3]),
            );
        }
        "read" => {
            expect_args(args, 5, true, "<name> <destination> [password]")?;
            let password = args.get(5).map(String::as_str);
            report(
                ops::read_file(&img, &args[3], Path::new(&args[4]), password),
                format!("File read: {}", args[3]),
            );
        }
        "del" => {
            expect_args(args, 4, false, "<name>")?;
            report(
                ops::delete_file(&mut img, &args[3]),
                format!("File deleted: {}", args[3]),
            );
        }
        "chmod" => {
            expect_args(args, 5, false, "<name> <+|-><rw subset>")?;
            report(
                ops::chmod(&mut img, &args[3], &args[4]),
                format!("Permissions changed: {}", args[3]),
            );
        }
        "addpw" => {
            expect_args(args, 5, false, "<name> <password>")?;
            report(
                ops::addpw(&mut img, &args[3], &args[4]),
                format!("Password added to file: {}", args[3]),
            );
        }
        "dumpe2fs" => {
            expect_args(args, 3, false, "")?;
            print!("{}", ops::dump(&img));
        }
        other => bail!("Unknown operation: {}", other),
    }

    img.save(image_path)
        .with_context(|| format!("failed to save file system {}", args[1]))?;
    Ok(())
}
