//! Directory entries.
//!
//! The directory is a flat array of fixed-size records; hierarchy lives in
//! the names, with `\` as the separator. A slot is free exactly when the
//! first name byte is NUL. Directories are entries with `first_block == 0`
//! and `size == 0`.

use bitflags::bitflags;

use crate::error::FsError;

/// Longest usable name, excluding the NUL terminator.
pub const MAX_FILENAME_LEN: usize = 255;

/// Bytes reserved for the name field on disk.
pub const NAME_FIELD_LEN: usize = MAX_FILENAME_LEN + 1;

/// Bytes reserved for the stored password.
///
/// The password is kept verbatim, truncated or zero-padded to this width.
/// This is a placeholder for a real digest, not a hash.
pub const PASSWORD_LEN: usize = 32;

/// Path separator inside names.
pub const PATH_SEPARATOR: u8 = b'\\';

bitflags! {
    /// POSIX-style permission bits. Only the owner read and write bits are
    /// consulted by the operation layer; the rest are carried for display.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileMode: u32 {
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXEC = 0o100;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC = 0o010;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXEC = 0o001;
    }
}

impl FileMode {
    /// rwxr-xr-x, given to directories.
    pub const DIR_DEFAULT: FileMode = FileMode::from_bits_truncate(0o755);
    /// rw-r--r--, given to files.
    pub const FILE_DEFAULT: FileMode = FileMode::from_bits_truncate(0o644);
}

/// One fixed-size directory record.
#[derive(Clone, Copy)]
pub struct DirEntry {
    pub name: [u8; NAME_FIELD_LEN],
    pub size: u32,
    pub mode: FileMode,
    /// Unix epoch seconds.
    pub created: i64,
    pub modified: i64,
    /// Chain head in the FAT; 0 for directories.
    pub first_block: u32,
    pub protected: bool,
    pub password: [u8; PASSWORD_LEN],
}

/// Serialized size: name + size + mode + two timestamps + first block +
/// protected flag + password field.
pub const DIR_ENTRY_SIZE: usize = NAME_FIELD_LEN + 4 + 4 + 8 + 8 + 4 + 4 + PASSWORD_LEN;

const _: () = assert!(DIR_ENTRY_SIZE == 320);

impl DirEntry {
    pub fn empty() -> DirEntry {
        DirEntry {
            name: [0; NAME_FIELD_LEN],
            size: 0,
            mode: FileMode::empty(),
            created: 0,
            modified: 0,
            first_block: 0,
            protected: false,
            password: [0; PASSWORD_LEN],
        }
    }

    /// A slot is free iff the first name byte is NUL.
    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    /// Name bytes up to the terminator.
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_FIELD_LEN);
        &self.name[..len]
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), FsError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_FILENAME_LEN || bytes.contains(&0) {
            return Err(FsError::InvalidName);
        }
        self.name = [0; NAME_FIELD_LEN];
        self.name[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Store a password (protection on) or clear the field (off).
    pub fn set_password(&mut self, password: Option<&str>) {
        match password {
            Some(pw) => {
                self.protected = true;
                self.password = password_field(pw);
            }
            None => {
                self.protected = false;
                self.password = [0; PASSWORD_LEN];
            }
        }
    }

    /// Byte-compare the supplied password against the stored field. Only
    /// meaningful while `protected` is set.
    pub fn password_matches(&self, given: Option<&str>) -> bool {
        match given {
            Some(pw) => self.password == password_field(pw),
            None => false,
        }
    }

    pub fn clear(&mut self) {
        *self = DirEntry::empty();
    }

    pub fn serialize(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= DIR_ENTRY_SIZE);
        buf[..NAME_FIELD_LEN].copy_from_slice(&self.name);
        let mut off = NAME_FIELD_LEN;
        buf[off..off + 4].copy_from_slice(&self.size.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.mode.bits().to_le_bytes());
        off += 4;
        buf[off..off + 8].copy_from_slice(&self.created.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.modified.to_le_bytes());
        off += 8;
        buf[off..off + 4].copy_from_slice(&self.first_block.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&u32::from(self.protected).to_le_bytes());
        off += 4;
        buf[off..off + PASSWORD_LEN].copy_from_slice(&self.password);
    }

    pub fn parse(buf: &[u8]) -> DirEntry {
        debug_assert!(buf.len() >= DIR_ENTRY_SIZE);
        let mut entry = DirEntry::empty();
        entry.name.copy_from_slice(&buf[..NAME_FIELD_LEN]);
        let mut off = NAME_FIELD_LEN;
        entry.size = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let mode = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        entry.mode = FileMode::from_bits_truncate(mode);
        off += 4;
        entry.created = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        entry.modified = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        entry.first_block = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        entry.protected = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()) != 0;
        off += 4;
        entry.password.copy_from_slice(&buf[off..off + PASSWORD_LEN]);
        entry
    }
}

/// Truncate or zero-pad a password to its on-disk width.
pub fn password_field(password: &str) -> [u8; PASSWORD_LEN] {
    let mut field = [0u8; PASSWORD_LEN];
    let bytes = password.as_bytes();
    let len = bytes.len().min(PASSWORD_LEN);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}
