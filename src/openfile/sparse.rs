//! `SparseMemory`: a byte range split into fixed-size parts, fetched
//! on-demand via ranged downloads, with a best-effort prefetch of the next
//! `K` parts.
//!
//! Random (non-append) writes are a known limitation of this strategy, so
//! `write` on anything but the current end-of-file returns
//! `UnsupportedOperation`.

use std::sync::{Arc, Mutex};

use crate::directory::FileInfo;
use crate::error::{FsError, FsResult};
use crate::openfile::remote::RemoteHandle;

/// Number of parts past the requested range to opportunistically prefetch.
pub const PREFETCH_PARTS: u64 = 1;

struct PartState {
    parts: Vec<Option<Vec<u8>>>,
    requested: Vec<bool>,
    ready: Vec<bool>,
}

pub struct SparseMemoryFile {
    key: String,
    part_size: u64,
    size: u64,
    state: Arc<Mutex<PartState>>,
    dirty: bool,
    pub(crate) file_info: Option<FileInfo>,
    remote: RemoteHandle,
}

fn num_parts(size: u64, part_size: u64) -> usize {
    if size == 0 {
        1
    } else {
        ((size + part_size - 1) / part_size) as usize
    }
}

impl SparseMemoryFile {
    pub fn new_empty(remote: RemoteHandle, part_size: u64) -> Self {
        SparseMemoryFile {
            key: String::new(),
            part_size,
            size: 0,
            state: Arc::new(Mutex::new(PartState {
                parts: vec![Some(Vec::new())],
                requested: vec![true],
                ready: vec![true],
            })),
            dirty: true,
            file_info: None,
            remote,
        }
    }

    pub fn open_existing(remote: RemoteHandle, part_size: u64, file_info: FileInfo) -> Self {
        let n = num_parts(file_info.size, part_size);
        SparseMemoryFile {
            key: file_info.key.clone(),
            part_size,
            size: file_info.size,
            state: Arc::new(Mutex::new(PartState {
                parts: vec![None; n],
                requested: vec![false; n],
                ready: vec![false; n],
            })),
            dirty: false,
            file_info: Some(file_info),
            remote,
        }
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    fn part_range(&self, part: u64) -> (u64, u64) {
        let lo = part * self.part_size;
        let hi = ((part + 1) * self.part_size - 1).min(self.size.saturating_sub(1));
        (lo, hi)
    }

    fn fetch_part(&self, state: &mut PartState, part: usize) -> FsResult<()> {
        if state.ready[part] {
            return Ok(());
        }
        let id = self
            .file_info
            .as_ref()
            .ok_or(FsError::NotFound)?
            .id
            .clone();
        let (lo, hi) = self.part_range(part as u64);
        let bytes = self.remote.fetch(&self.key, &id, Some((lo, hi)))?;
        state.parts[part] = Some(bytes);
        state.requested[part] = true;
        state.ready[part] = true;
        Ok(())
    }

    /// Fires a detached prefetch of parts `(b+1..=b+K)` that never blocks
    /// the caller; a part already `requested` is skipped even if not yet
    /// `ready`, so repeated reads over the same window don't pile up
    /// redundant fetches.
    fn prefetch_after(&self, last_fetched_part: usize) {
        let total_parts = {
            let state = self.state.lock().expect("sparse state poisoned");
            state.parts.len()
        };
        let file_id = match &self.file_info {
            Some(info) => info.id.clone(),
            None => return,
        };
        let key = self.key.clone();
        let part_size = self.part_size;
        let size = self.size;
        let state = Arc::clone(&self.state);
        let remote = self.remote.clone();

        let to_prefetch: Vec<usize> = (1..=PREFETCH_PARTS)
            .map(|k| last_fetched_part + k as usize)
            .filter(|&p| p < total_parts)
            .collect();
        if to_prefetch.is_empty() {
            return;
        }

        {
            let mut guard = state.lock().expect("sparse state poisoned");
            for &p in &to_prefetch {
                guard.requested[p] = true;
            }
        }

        std::thread::spawn(move || {
            for part in to_prefetch {
                let lo = part as u64 * part_size;
                let hi = ((part as u64 + 1) * part_size - 1).min(size.saturating_sub(1));
                if let Ok(bytes) = remote.fetch(&key, &file_id, Some((lo, hi))) {
                    let mut guard = state.lock().expect("sparse state poisoned");
                    if !guard.ready[part] {
                        guard.parts[part] = Some(bytes);
                        guard.ready[part] = true;
                    }
                }
            }
        });
    }

    pub fn read(&self, offset: u64, len: u32) -> FsResult<Vec<u8>> {
        let start = offset.min(self.size);
        let end = (offset + len as u64).min(self.size);
        if start >= end {
            return Ok(Vec::new());
        }

        let first_part = (start / self.part_size) as usize;
        let last_part = ((end - 1) / self.part_size) as usize;

        {
            let mut state = self.state.lock().expect("sparse state poisoned");
            for part in first_part..=last_part {
                self.fetch_part(&mut state, part)?;
            }
        }
        self.prefetch_after(last_part);

        let state = self.state.lock().expect("sparse state poisoned");
        let mut out = Vec::with_capacity((end - start) as usize);
        for part in first_part..=last_part {
            let (part_lo, _) = self.part_range(part as u64);
            let buf = state.parts[part].as_ref().expect("part marked ready with no buffer");
            let lo = start.max(part_lo) - part_lo;
            let hi = (end.min(part_lo + self.part_size)) - part_lo;
            out.extend_from_slice(&buf[lo as usize..hi as usize]);
        }
        Ok(out)
    }

    /// Only append is supported; see module docs.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> FsResult<u32> {
        if offset != self.size {
            return Err(FsError::UnsupportedOperation("random write not supported"));
        }
        let mut state = self.state.lock().expect("sparse state poisoned");
        let last_part = state.parts.len() - 1;
        let buf = state.parts[last_part].get_or_insert_with(Vec::new);
        buf.extend_from_slice(data);
        self.size += data.len() as u64;
        state.ready[last_part] = true;
        state.requested[last_part] = true;

        if buf.len() as u64 >= self.part_size {
            state.parts.push(Some(Vec::new()));
            state.requested.push(true);
            state.ready.push(true);
        }

        self.dirty = true;
        Ok(data.len() as u32)
    }

    /// Only resetting to zero is supported; see module docs.
    pub fn truncate(&mut self, len: u64) -> FsResult<()> {
        if len != 0 {
            return Err(FsError::UnsupportedOperation("sparse truncate only supports 0"));
        }
        let mut state = self.state.lock().expect("sparse state poisoned");
        state.parts = vec![Some(Vec::new())];
        state.requested = vec![true];
        state.ready = vec![true];
        self.size = 0;
        self.dirty = true;
        Ok(())
    }

    pub fn upload(&mut self, key: &str) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let bytes = {
            let state = self.state.lock().expect("sparse state poisoned");
            let mut buf = Vec::with_capacity(self.size as usize);
            for part in &state.parts {
                if let Some(part) = part {
                    buf.extend_from_slice(part);
                }
            }
            buf
        };
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
        let mut state = self.state.lock().expect("sparse state poisoned");
        state.parts.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_parts_rounds_up() {
        assert_eq!(num_parts(0, 1024), 1);
        assert_eq!(num_parts(1024, 1024), 1);
        assert_eq!(num_parts(1025, 1024), 2);
    }

    #[test]
    fn non_append_write_is_unsupported() {
        let remote = RemoteHandle::new(Arc::new(crate::bucket::Bucket::new(
            crate::bucket::client::BucketClient::new("a".into(), "k".into(), "b".into(), 1),
            std::time::Duration::from_secs(1),
        )));
        let mut f = SparseMemoryFile::new_empty(remote, 1024);
        f.write(0, b"abc").unwrap();
        let err = f.write(0, b"x").unwrap_err();
        assert!(matches!(err, FsError::UnsupportedOperation(_)));
    }

    #[test]
    fn append_write_grows_size() {
        let remote = RemoteHandle::new(Arc::new(crate::bucket::Bucket::new(
            crate::bucket::client::BucketClient::new("a".into(), "k".into(), "b".into(), 1),
            std::time::Duration::from_secs(1),
        )));
        let mut f = SparseMemoryFile::new_empty(remote, 4);
        f.write(0, b"ab").unwrap();
        f.write(2, b"cdef").unwrap();
        assert_eq!(f.len(), 6);
    }

    #[test]
    fn truncate_nonzero_is_unsupported() {
        let remote = RemoteHandle::new(Arc::new(crate::bucket::Bucket::new(
            crate::bucket::client::BucketClient::new("a".into(), "k".into(), "b".into(), 1),
            std::time::Duration::from_secs(1),
        )));
        let mut f = SparseMemoryFile::new_empty(remote, 1024);
        assert!(f.truncate(5).is_err());
        assert!(f.truncate(0).is_ok());
    }
}
