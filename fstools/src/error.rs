//! Error taxonomy for image manipulation.
//!
//! The CLI prints operation-level failures (not-found, bad password,
//! permission denied, exhaustion) as plain messages and still rewrites the
//! image; host I/O and argument failures abort without rewriting.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("supported block sizes are 0.5 KB and 1 KB")]
    InvalidBlockSize,

    #[error("corrupt image: {reason}")]
    CorruptImage { reason: &'static str },

    #[error("{name}: not found")]
    NotFound { name: String },

    #[error("parent directory {path} does not exist")]
    ParentMissing { path: String },

    #[error("no free blocks available")]
    NoFreeBlocks,

    #[error("no free directory entries")]
    NoFreeSlot,

    #[error("{name}: permission denied")]
    PermissionDenied { name: String },

    #[error("{name}: incorrect or missing password")]
    BadPassword { name: String },

    #[error("invalid permission spec {spec:?}, expected +/- followed by r, w")]
    InvalidPermissionSpec { spec: String },

    #[error("invalid name: must be 1..=255 bytes with no NUL")]
    InvalidName,
}
