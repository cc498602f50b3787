//! `DiskBacked`: a scratch file under a private temp root, opened
//! read/write, with length queried from the filesystem rather than tracked
//! in memory. Files live at `temp_folder/<key>`, with parent directories
//! created on open and the scratch file removed on delete.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::directory::FileInfo;
use crate::error::FsResult;
use crate::openfile::remote::RemoteHandle;

pub struct DiskBackedFile {
    pub(crate) path: PathBuf,
    pub(crate) file: File,
    pub(crate) dirty: bool,
    pub(crate) file_info: Option<FileInfo>,
    remote: RemoteHandle,
}

fn scratch_path(temp_root: &Path, key: &str) -> PathBuf {
    temp_root.join(key)
}

impl DiskBackedFile {
    fn open_scratch(path: &Path) -> FsResult<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(file)
    }

    pub fn new_empty(remote: RemoteHandle, temp_root: &Path, key: &str) -> FsResult<Self> {
        let path = scratch_path(temp_root, key);
        let file = Self::open_scratch(&path)?;
        file.set_len(0)?;
        Ok(DiskBackedFile {
            path,
            file,
            dirty: true,
            file_info: None,
            remote,
        })
    }

    pub fn open_existing(
        remote: RemoteHandle,
        temp_root: &Path,
        key: &str,
        file_info: FileInfo,
    ) -> FsResult<Self> {
        let path = scratch_path(temp_root, key);
        let mut file = Self::open_scratch(&path)?;
        let bytes = remote.fetch(key, &file_info.id, None)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        Ok(DiskBackedFile {
            path,
            file,
            dirty: false,
            file_info: Some(file_info),
            remote,
        })
    }

    pub fn len(&self) -> u64 {
        self.file.metadata().map(|m| m.len()).unwrap_or(0)
    }

    pub fn read(&mut self, offset: u64, len: u32) -> FsResult<Vec<u8>> {
        let total = self.len();
        let start = offset.min(total);
        let end = (offset + len as u64).min(total);
        if start >= end {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; (end - start) as usize];
        self.file.seek(SeekFrom::Start(start))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write(&mut self, offset: u64, data: &[u8]) -> FsResult<u32> {
        let total = self.len();
        if offset > total {
            self.file.set_len(offset)?;
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.dirty = true;
        Ok(data.len() as u32)
    }

    pub fn truncate(&mut self, len: u64) -> FsResult<()> {
        self.file.set_len(len)?;
        self.dirty = true;
        Ok(())
    }

    pub fn upload(&mut self, key: &str) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut bytes = Vec::with_capacity(self.len() as usize);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut bytes)?;

        if let Some(existing) = &self.file_info {
            self.remote.delete(&existing.id, key)?;
        }
        let info = self.remote.publish(key, &bytes)?;
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
        let _ = fs::remove_file(&self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{client::BucketClient, Bucket};
    use std::time::Duration;
    use tempfile::tempdir;

    fn remote() -> RemoteHandle {
        let client = BucketClient::new("acct".into(), "key".into(), "bucket".into(), 3);
        RemoteHandle::new(std::sync::Arc::new(Bucket::new(client, Duration::from_secs(60))))
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let mut f = DiskBackedFile::new_empty(remote(), dir.path(), "a/b.txt").unwrap();
        f.write(0, b"hello").unwrap();
        assert_eq!(f.read(0, 5).unwrap(), b"hello");
        assert_eq!(f.len(), 5);
    }

    #[test]
    fn parent_directories_are_created_on_open() {
        let dir = tempdir().unwrap();
        let f = DiskBackedFile::new_empty(remote(), dir.path(), "nested/dir/file.bin").unwrap();
        assert!(dir.path().join("nested/dir").is_dir());
        drop(f);
    }

    #[test]
    fn truncate_then_delete_removes_scratch_file() {
        let dir = tempdir().unwrap();
        let mut f = DiskBackedFile::new_empty(remote(), dir.path(), "x.txt").unwrap();
        f.write(0, b"data").unwrap();
        let path = f.path.clone();
        f.delete("x.txt", false).unwrap();
        assert!(!path.exists());
    }
}
