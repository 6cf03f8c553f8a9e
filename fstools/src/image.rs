//! Image geometry and whole-image load/save.
//!
//! On-disk layout, all integers little-endian:
//!
//! ```text
//! 0..12                superblock (block size, total blocks, free blocks)
//! then                 FAT: (total_blocks + 1) x 2 bytes of u16 cells
//! then                 directory: total_blocks entries x 320 bytes
//! then                 data region: total_blocks x block_size bytes
//! ```

use std::fs;
use std::path::Path;

use log::debug;

use crate::dir::{DirEntry, DIR_ENTRY_SIZE};
use crate::error::FsError;
use crate::fat::Fat;

/// The data region is fixed at 4 MiB regardless of block size.
pub const DATA_REGION_BYTES: u32 = 4 * 1024 * 1024;

/// Supported block sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockSize {
    B512,
    B1024,
}

impl BlockSize {
    /// Parse the CLI argument: `0.5` or `1` (kilobytes).
    pub fn from_arg(arg: &str) -> Option<BlockSize> {
        match arg {
            "0.5" => Some(BlockSize::B512),
            "1" => Some(BlockSize::B1024),
            _ => None,
        }
    }

    pub fn from_raw(bytes: u32) -> Option<BlockSize> {
        match bytes {
            512 => Some(BlockSize::B512),
            1024 => Some(BlockSize::B1024),
            _ => None,
        }
    }

    pub fn bytes(self) -> u32 {
        match self {
            BlockSize::B512 => 512,
            BlockSize::B1024 => 1024,
        }
    }

    /// 8192 blocks at 512 B, 4096 at 1 KiB.
    pub fn total_blocks(self) -> u32 {
        DATA_REGION_BYTES / self.bytes()
    }
}

pub struct Superblock {
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
}

impl Superblock {
    pub const SIZE: usize = 12;

    fn serialize(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.block_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.total_blocks.to_le_bytes());
        buf[8..12].copy_from_slice(&self.free_blocks.to_le_bytes());
    }

    fn parse(buf: &[u8]) -> Superblock {
        Superblock {
            block_size: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            total_blocks: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            free_blocks: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
        }
    }
}

/// The whole filesystem, resident in memory between load and save.
pub struct FsImage {
    pub superblock: Superblock,
    pub fat: Fat,
    pub directory: Vec<DirEntry>,
    data: Vec<u8>,
}

impl FsImage {
    /// Build a fresh, empty image: zeroed FAT, zeroed directory, zeroed
    /// data region, every block counted free.
    pub fn create(block_size: BlockSize) -> FsImage {
        let total_blocks = block_size.total_blocks();
        FsImage {
            superblock: Superblock {
                block_size: block_size.bytes(),
                total_blocks,
                free_blocks: total_blocks,
            },
            fat: Fat::new(total_blocks),
            directory: vec![DirEntry::empty(); total_blocks as usize],
            data: vec![0; (total_blocks * block_size.bytes()) as usize],
        }
    }

    /// Read and parse a whole image file, validating its geometry.
    pub fn load(path: &Path) -> Result<FsImage, FsError> {
        let bytes = fs::read(path)?;
        if bytes.len() < Superblock::SIZE {
            return Err(FsError::CorruptImage {
                reason: "file shorter than a superblock",
            });
        }

        let superblock = Superblock::parse(&bytes[..Superblock::SIZE]);
        let block_size =
            BlockSize::from_raw(superblock.block_size).ok_or(FsError::InvalidBlockSize)?;
        if superblock.total_blocks != block_size.total_blocks() {
            return Err(FsError::CorruptImage {
                reason: "block count does not match geometry",
            });
        }

        let total = superblock.total_blocks as usize;
        let fat_len = (total + 1) * 2;
        let dir_len = total * DIR_ENTRY_SIZE;
        let data_len = total * superblock.block_size as usize;
        let expected = Superblock::SIZE + fat_len + dir_len + data_len;
        if bytes.len() != expected {
            return Err(FsError::CorruptImage {
                reason: "file length does not match geometry",
            });
        }

        let mut off = Superblock::SIZE;
        let cells = bytes[off..off + fat_len]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        off += fat_len;

        let directory = bytes[off..off + dir_len]
            .chunks_exact(DIR_ENTRY_SIZE)
            .map(DirEntry::parse)
            .collect();
        off += dir_len;

        let data = bytes[off..off + data_len].to_vec();

        debug!(
            "loaded image {}: {} blocks of {} bytes, {} free",
            path.display(),
            superblock.total_blocks,
            superblock.block_size,
            superblock.free_blocks
        );

        Ok(FsImage {
            fat: Fat::from_cells(cells, superblock.total_blocks),
            superblock,
            directory,
            data,
        })
    }

    /// Serialize the image and rewrite `path` in one shot.
    pub fn save(&self, path: &Path) -> Result<(), FsError> {
        let total = self.superblock.total_blocks as usize;
        let fat_len = (total + 1) * 2;
        let dir_len = total * DIR_ENTRY_SIZE;
        let expected = Superblock::SIZE + fat_len + dir_len + self.data.len();

        let mut bytes = vec![0u8; expected];
        self.superblock.serialize(&mut bytes[..Superblock::SIZE]);

        let mut off = Superblock::SIZE;
        for (cell, out) in self
            .fat
            .cells()
            .iter()
            .zip(bytes[off..off + fat_len].chunks_exact_mut(2))
        {
            out.copy_from_slice(&cell.to_le_bytes());
        }
        off += fat_len;

        for (entry, out) in self
            .directory
            .iter()
            .zip(bytes[off..off + dir_len].chunks_exact_mut(DIR_ENTRY_SIZE))
        {
            entry.serialize(out);
        }
        off += dir_len;

        bytes[off..].copy_from_slice(&self.data);

        fs::write(path, bytes)?;
        debug!("saved image {}", path.display());
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.superblock.block_size as usize
    }

    pub fn block(&self, index: u32) -> &[u8] {
        let bs = self.block_size();
        let start = index as usize * bs;
        &self.data[start..start + bs]
    }

    pub fn block_mut(&mut self, index: u32) -> &mut [u8] {
        let bs = self.block_size();
        let start = index as usize * bs;
        &mut self.data[start..start + bs]
    }

    /// Claim a free block, keeping the superblock's free count in step.
    pub fn allocate_block(&mut self) -> Result<u32, FsError> {
        let block = self.fat.find_free_block().ok_or(FsError::NoFreeBlocks)?;
        self.superblock.free_blocks -= 1;
        Ok(block)
    }

    /// Release a whole chain, keeping the free count in step.
    pub fn release_chain(&mut self, head: u32) {
        let freed = self.fat.free_chain(head);
        self.superblock.free_blocks += freed;
    }

    pub fn find_entry(&self, name: &str) -> Option<&DirEntry> {
        self.directory
            .iter()
            .find(|e| !e.is_free() && e.name_bytes() == name.as_bytes())
    }

    pub fn find_entry_mut(&mut self, name: &str) -> Option<&mut DirEntry> {
        self.directory
            .iter_mut()
            .find(|e| !e.is_free() && e.name_bytes() == name.as_bytes())
    }

    pub fn free_dir_slot(&self) -> Option<usize> {
        self.directory.iter().position(|e| e.is_free())
    }
}
