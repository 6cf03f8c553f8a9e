//! The operation layer.
//!
//! Each function mutates a loaded [`FsImage`] in memory; the CLI decides
//! when to flush it back to disk. Lookups are exact-match on the full
//! backslash-separated name, the same way the entries are stored.

use std::fmt::Write as _;
use std::fs;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::dir::{DirEntry, FileMode, PATH_SEPARATOR};
use crate::error::FsError;
use crate::fat::{FAT_EOC, FAT_FREE};
use crate::image::FsImage;

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Enumerate one directory level.
///
/// The root (`\` or the empty string) lists every entry whose name has no
/// separator. Any other path lists entries prefixed by `path\`, emitting
/// only the suffix past the separator.
pub fn list(img: &FsImage, path: &str) -> Vec<String> {
    let mut names = Vec::new();
    if path.is_empty() || path == "\\" {
        for entry in img.directory.iter().filter(|e| !e.is_free()) {
            if !entry.name_bytes().contains(&PATH_SEPARATOR) {
                names.push(entry.name_lossy());
            }
        }
        return names;
    }

    let prefix = format!("{}\\", path);
    for entry in img.directory.iter().filter(|e| !e.is_free()) {
        let name = entry.name_lossy();
        if let Some(suffix) = name.strip_prefix(&prefix) {
            names.push(suffix.to_string());
        }
    }
    names
}

/// Create a directory, materializing every missing prefix along the way.
/// Existing prefixes are left alone, so the operation is idempotent.
pub fn mkdir(img: &mut FsImage, path: &str) -> Result<(), FsError> {
    let mut full = String::new();
    for part in path.split('\\').filter(|p| !p.is_empty()) {
        if !full.is_empty() {
            full.push('\\');
        }
        full.push_str(part);

        if img.find_entry(&full).is_some() {
            continue;
        }

        if let Some(sep) = full.rfind('\\') {
            let parent = &full[..sep];
            if img.find_entry(parent).is_none() {
                return Err(FsError::ParentMissing {
                    path: parent.to_string(),
                });
            }
        }

        let slot = img.free_dir_slot().ok_or(FsError::NoFreeSlot)?;
        let mut entry = DirEntry::empty();
        entry.set_name(&full)?;
        entry.mode = FileMode::DIR_DEFAULT;
        let now = now_epoch();
        entry.created = now;
        entry.modified = now;
        img.directory[slot] = entry;
        debug!("directory created: {}", full);
    }
    Ok(())
}

/// Remove a directory entry by exact name. No recursion and no emptiness
/// check: children keep their full names and become orphans.
pub fn rmdir(img: &mut FsImage, name: &str) -> Result<(), FsError> {
    match img.find_entry_mut(name) {
        Some(entry) => {
            entry.clear();
            Ok(())
        }
        None => Err(FsError::NotFound {
            name: name.to_string(),
        }),
    }
}

/// Copy a host file into the image under `name`, optionally password
/// protecting it.
///
/// Every file owns at least one block, even an empty one. If the FAT runs
/// out mid-write the partial chain is released and no entry is left
/// behind, so a failed write does not change the image.
pub fn write_file(
    img: &mut FsImage,
    name: &str,
    source: &Path,
    password: Option<&str>,
) -> Result<(), FsError> {
    let mut entry = DirEntry::empty();
    entry.set_name(name)?;

    let data = fs::read(source)?;
    let slot = img.free_dir_slot().ok_or(FsError::NoFreeSlot)?;

    let head = img.allocate_block()?;
    let block_size = img.block_size();
    let mut current = head;
    for (i, chunk) in data.chunks(block_size).enumerate() {
        if i > 0 {
            let next = match img.allocate_block() {
                Ok(next) => next,
                Err(err) => {
                    img.release_chain(head);
                    return Err(err);
                }
            };
            img.fat.link(current, next);
            current = next;
        }
        img.block_mut(current)[..chunk.len()].copy_from_slice(chunk);
    }

    entry.size = data.len() as u32;
    entry.mode = FileMode::FILE_DEFAULT;
    let now = now_epoch();
    entry.created = now;
    entry.modified = now;
    entry.first_block = head;
    entry.set_password(password);
    img.directory[slot] = entry;

    debug!(
        "file written: {} ({} bytes, head block {})",
        name,
        data.len(),
        head
    );
    Ok(())
}

/// Copy a file out of the image into `destination`, enforcing the
/// password and the owner-read bit before the destination is even opened.
pub fn read_file(
    img: &FsImage,
    name: &str,
    destination: &Path,
    password: Option<&str>,
) -> Result<(), FsError> {
    let entry = img.find_entry(name).ok_or_else(|| FsError::NotFound {
        name: name.to_string(),
    })?;

    if entry.protected && !entry.password_matches(password) {
        return Err(FsError::BadPassword {
            name: name.to_string(),
        });
    }
    if !entry.mode.contains(FileMode::OWNER_READ) {
        return Err(FsError::PermissionDenied {
            name: name.to_string(),
        });
    }

    let mut out = File::create(destination)?;
    let block_size = img.block_size();
    let mut remaining = entry.size as usize;
    let mut current = entry.first_block;

    while remaining > 0 {
        if !img.fat.in_data_region(current) {
            return Err(FsError::CorruptImage {
                reason: "chain leaves the data region",
            });
        }
        let step = remaining.min(block_size);
        out.write_all(&img.block(current)[..step])?;
        remaining -= step;

        if remaining > 0 {
            current = match img.fat.get(current) {
                Some(FAT_EOC) | Some(FAT_FREE) | None => {
                    return Err(FsError::CorruptImage {
                        reason: "chain ends before the file does",
                    });
                }
                Some(next) => next as u32,
            };
        }
    }
    Ok(())
}

/// Delete a file: release its chain, then clear the slot.
pub fn delete_file(img: &mut FsImage, name: &str) -> Result<(), FsError> {
    let first_block = match img.find_entry(name) {
        Some(entry) => entry.first_block,
        None => {
            return Err(FsError::NotFound {
                name: name.to_string(),
            })
        }
    };
    if first_block != 0 {
        img.release_chain(first_block);
    }
    if let Some(entry) = img.find_entry_mut(name) {
        entry.clear();
    }
    debug!("file deleted: {}", name);
    Ok(())
}

/// Apply a `+`/`-` permission spec over the owner read and write bits.
pub fn chmod(img: &mut FsImage, name: &str, spec: &str) -> Result<(), FsError> {
    let invalid = || FsError::InvalidPermissionSpec {
        spec: spec.to_string(),
    };

    let mut chars = spec.chars();
    let sign = chars.next().ok_or_else(invalid)?;
    let rest = chars.as_str();
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut bits = FileMode::empty();
    for c in rest.chars() {
        match c {
            'r' => bits |= FileMode::OWNER_READ,
            'w' => bits |= FileMode::OWNER_WRITE,
            _ => return Err(invalid()),
        }
    }

    let entry = img.find_entry_mut(name).ok_or_else(|| FsError::NotFound {
        name: name.to_string(),
    })?;
    match sign {
        '+' => entry.mode |= bits,
        '-' => entry.mode &= !bits,
        _ => return Err(invalid()),
    }
    Ok(())
}

/// Protect an existing entry with a password.
pub fn addpw(img: &mut FsImage, name: &str, password: &str) -> Result<(), FsError> {
    let entry = img.find_entry_mut(name).ok_or_else(|| FsError::NotFound {
        name: name.to_string(),
    })?;
    entry.set_password(Some(password));
    Ok(())
}

/// Render the superblock and every occupied directory slot.
pub fn dump(img: &FsImage) -> String {
    let mut out = String::new();
    let sb = &img.superblock;
    let _ = writeln!(out, "Block size: {}", sb.block_size);
    let _ = writeln!(out, "Total blocks: {}", sb.total_blocks);
    let _ = writeln!(out, "Free blocks: {}", sb.free_blocks);
    for entry in img.directory.iter().filter(|e| !e.is_free()) {
        let _ = writeln!(
            out,
            "Filename: {}, Size: {}, Permissions: {:o}, Creation time: {}, \
             Modification time: {}, First block: {}, Protected: {}",
            entry.name_lossy(),
            entry.size,
            entry.mode.bits(),
            entry.created,
            entry.modified,
            entry.first_block,
            entry.protected as u32,
        );
    }
    out
}
