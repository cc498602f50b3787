//! The open-file set (§4.4): one `OpenFile` per currently-open path,
//! dispatching to one of four strategies behind a single tagged variant, per
//! design note §9 ("tagged variant with one function table").

pub mod disk;
pub mod hash;
pub mod remote;
pub mod sequential;
pub mod sparse;

use std::path::Path;

use crate::directory::FileInfo;
use crate::error::FsResult;

pub use remote::RemoteHandle;

use disk::DiskBackedFile;
use hash::HashFile;
use sequential::SequentialMemoryFile;
use sparse::SparseMemoryFile;

/// Which backing strategy `open`/`create` should install for a regular
/// (non-hashfile) path, driven by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    SequentialMemory,
    DiskBacked,
    SparseMemory,
}

pub enum OpenFile {
    SequentialMemory(SequentialMemoryFile),
    DiskBacked(DiskBackedFile),
    SparseMemory(SparseMemoryFile),
    Hash(HashFile),
}

impl OpenFile {
    pub fn new_empty(strategy: StrategyKind, remote: RemoteHandle, temp_root: &Path, key: &str, part_size: u64) -> FsResult<Self> {
        Ok(match strategy {
            StrategyKind::SequentialMemory => OpenFile::SequentialMemory(SequentialMemoryFile::new_empty(remote)),
            StrategyKind::DiskBacked => OpenFile::DiskBacked(DiskBackedFile::new_empty(remote, temp_root, key)?),
            StrategyKind::SparseMemory => OpenFile::SparseMemory(SparseMemoryFile::new_empty(remote, part_size)),
        })
    }

    pub fn open_existing(
        strategy: StrategyKind,
        remote: RemoteHandle,
        temp_root: &Path,
        key: &str,
        part_size: u64,
        file_info: FileInfo,
    ) -> FsResult<Self> {
        Ok(match strategy {
            StrategyKind::SequentialMemory => {
                OpenFile::SequentialMemory(SequentialMemoryFile::open_existing(remote, file_info)?)
            }
            StrategyKind::DiskBacked => {
                OpenFile::DiskBacked(DiskBackedFile::open_existing(remote, temp_root, key, file_info)?)
            }
            StrategyKind::SparseMemory => {
                OpenFile::SparseMemory(SparseMemoryFile::open_existing(remote, part_size, file_info))
            }
        })
    }

    pub fn new_hash(file_info: &FileInfo) -> Self {
        OpenFile::Hash(HashFile::new(file_info))
    }

    pub fn len(&self) -> u64 {
        match self {
            OpenFile::SequentialMemory(f) => f.len(),
            OpenFile::DiskBacked(f) => f.len(),
            OpenFile::SparseMemory(f) => f.len(),
            OpenFile::Hash(f) => f.len(),
        }
    }

    pub fn read(&mut self, offset: u64, len: u32) -> FsResult<Vec<u8>> {
        match self {
            OpenFile::SequentialMemory(f) => Ok(f.read(offset, len)),
            OpenFile::DiskBacked(f) => f.read(offset, len),
            OpenFile::SparseMemory(f) => f.read(offset, len),
            OpenFile::Hash(f) => Ok(f.read(offset, len)),
        }
    }

    pub fn write(&mut self, offset: u64, data: &[u8]) -> FsResult<u32> {
        match self {
            OpenFile::SequentialMemory(f) => Ok(f.write(offset, data)),
            OpenFile::DiskBacked(f) => f.write(offset, data),
            OpenFile::SparseMemory(f) => f.write(offset, data),
            OpenFile::Hash(f) => f.write(offset, data),
        }
    }

    pub fn truncate(&mut self, len: u64) -> FsResult<()> {
        match self {
            OpenFile::SequentialMemory(f) => {
                f.truncate(len);
                Ok(())
            }
            OpenFile::DiskBacked(f) => f.truncate(len),
            OpenFile::SparseMemory(f) => f.truncate(len),
            OpenFile::Hash(f) => f.truncate(len),
        }
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        match self {
            OpenFile::SequentialMemory(f) => f.dirty = dirty,
            OpenFile::DiskBacked(f) => f.dirty = dirty,
            OpenFile::SparseMemory(_) | OpenFile::Hash(_) => {}
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            OpenFile::SequentialMemory(f) => f.dirty,
            OpenFile::DiskBacked(f) => f.dirty,
            OpenFile::SparseMemory(_) | OpenFile::Hash(_) => false,
        }
    }

    /// Whole-object replace: no-op unless dirty.
    pub fn upload(&mut self, key: &str) -> FsResult<()> {
        match self {
            OpenFile::SequentialMemory(f) => f.upload(key),
            OpenFile::DiskBacked(f) => f.upload(key),
            OpenFile::SparseMemory(f) => f.upload(key),
            OpenFile::Hash(_) => Ok(()),
        }
    }

    pub fn delete(&mut self, key: &str, remote: bool) -> FsResult<()> {
        match self {
            OpenFile::SequentialMemory(f) => f.delete(key, remote),
            OpenFile::DiskBacked(f) => f.delete(key, remote),
            OpenFile::SparseMemory(f) => f.delete(key, remote),
            OpenFile::Hash(_) => Ok(()),
        }
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        match self {
            OpenFile::SequentialMemory(f) => f.file_info.as_ref(),
            OpenFile::DiskBacked(f) => f.file_info.as_ref(),
            OpenFile::SparseMemory(f) => f.file_info.as_ref(),
            OpenFile::Hash(_) => None,
        }
    }

    pub fn is_hash(&self) -> bool {
        matches!(self, OpenFile::Hash(_))
    }
}
