//! `SequentialMemory`: a plain contiguous in-memory buffer, the simplest
//! strategy, suitable for small files and full rewrites, and the default
//! when neither disk-backing nor sparse access is configured.

use crate::directory::FileInfo;
use crate::error::FsResult;
use crate::openfile::remote::RemoteHandle;

pub struct SequentialMemoryFile {
    pub(crate) buffer: Vec<u8>,
    pub(crate) dirty: bool,
    pub(crate) file_info: Option<FileInfo>,
    remote: RemoteHandle,
}

impl SequentialMemoryFile {
    pub fn new_empty(remote: RemoteHandle) -> Self {
        SequentialMemoryFile {
            buffer: Vec::new(),
            dirty: true,
            file_info: None,
            remote,
        }
    }

    pub fn open_existing(remote: RemoteHandle, file_info: FileInfo) -> FsResult<Self> {
        let bytes = remote.fetch(&file_info.key, &file_info.id, None)?;
        Ok(SequentialMemoryFile {
            buffer: bytes,
            dirty: false,
            file_info: Some(file_info),
            remote,
        })
    }

    pub fn len(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn read(&self, offset: u64, len: u32) -> Vec<u8> {
        let start = offset.min(self.len()) as usize;
        let end = (offset + len as u64).min(self.len()) as usize;
        self.buffer[start..end].to_vec()
    }

    pub fn write(&mut self, offset: u64, data: &[u8]) -> u32 {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[start..end].copy_from_slice(data);
        self.dirty = true;
        data.len() as u32
    }

    pub fn truncate(&mut self, len: u64) {
        self.buffer.resize(len as usize, 0);
        self.dirty = true;
    }

    pub fn upload(&mut self, key: &str) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(existing) = &self.file_info {
            self.remote.delete(&existing.id, key)?;
        }
        let info = self.remote.publish(key, &self.buffer)?;
        self.file_info = Some(info);
        self.dirty = false;
        Ok(())
    }

    pub fn delete(&mut self, key: &str, remote: bool) -> FsResult<()> {
        if remote {
            if let Some(existing) = &self.file_info {
                self.remote.delete(&existing.id, key)?;
            }
        }
        self.buffer.clear();
        Ok(())
    }
}
