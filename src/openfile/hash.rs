//! `Hash`: the synthetic `<key>.sha1` read-only virtual file. Its content is
//! fixed at open time — the stored SHA-1 of the underlying key, followed by
//! a newline (42 bytes) — and it is never dirty.

use crate::directory::FileInfo;
use crate::error::{FsError, FsResult};

pub struct HashFile {
    content: Vec<u8>,
}

impl HashFile {
    /// Builds the 42-byte `<sha1-hex>\n` content from the target key's
    /// `FileInfo`. A missing SHA-1 (the backend didn't report one) degrades
    /// to 40 zero characters rather than failing the open.
    pub fn new(file_info: &FileInfo) -> Self {
        let hex = file_info
            .sha1_hex
            .clone()
            .unwrap_or_else(|| "0".repeat(40));
        let mut content = hex.into_bytes();
        content.push(b'\n');
        HashFile { content }
    }

    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn read(&self, offset: u64, len: u32) -> Vec<u8> {
        let start = offset.min(self.len()) as usize;
        let end = (offset + len as u64).min(self.len()) as usize;
        self.content[start..end].to_vec()
    }

    pub fn write(&mut self, _offset: u64, _data: &[u8]) -> FsResult<u32> {
        Err(FsError::UnsupportedOperation("hashfiles are read-only"))
    }

    pub fn truncate(&mut self, _len: u64) -> FsResult<()> {
        Err(FsError::UnsupportedOperation("hashfiles are read-only"))
    }
}
