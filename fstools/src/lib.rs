//! Offline manipulation of Kestrel filesystem images.
//!
//! An image is a single host file holding, in order: a superblock, a
//! FAT-12-style allocation table (16-bit cells), a flat directory, and the
//! data region. Hierarchy is encoded in backslash-separated names inside
//! the directory; there is no nesting on disk.
//!
//! Every operation loads the whole image into memory, mutates it, and
//! rewrites the same path. There is no concurrent-access story: the image
//! is exclusively owned per CLI run.
//!
//! ## Module Organization
//!
//! - `image`: geometry, superblock, whole-image load/save
//! - `fat`: the allocation table and chain walking
//! - `dir`: fixed-size directory entries, permission bits, passwords
//! - `ops`: the operation layer the CLI binaries drive
//! - `error`: the shared error taxonomy

pub mod dir;
pub mod error;
pub mod fat;
pub mod image;
pub mod ops;

pub use error::FsError;
