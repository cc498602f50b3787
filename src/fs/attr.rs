//! `getattr`/`setattr`/`statfs` (§4.6). Permissions and ownership are fixed
//! per the Non-goals ("POSIX permission semantics beyond a fixed mode");
//! `setattr`'s utimens/chmod/chown arguments are accepted and ignored.
//!
//! These return a plain `FsResult` instead of writing to a `fuser::Reply*`
//! directly — `fuser`'s reply types have no public constructor, so nothing
//! outside this crate's `fuser::Filesystem` impl in `mod.rs` could drive
//! them in a test. `mod.rs` converts the `Result` into the matching reply
//! call; everything here is plain, directly testable logic.

use super::prelude::*;

const BLOCK_SIZE: u32 = 65536;
const TOTAL_BLOCKS: u64 = 1u64 << 34; // 1 PiB / 64 KiB

pub fn getattr(fs: &mut RemoteFs, ino: u64) -> FsResult<FileAttr> {
    if ino == ROOT_INO {
        return Ok(fs.root_attr());
    }
    let path = fs.path_for_inode(ino).ok_or(FsError::NotFound)?;
    fs.attr_for_path(&path).ok_or(FsError::NotFound)
}

/// Accepted and ignored, per §4.6 — the backend has no native permission or
/// timestamp model. Still returns the current attributes so tools that
/// chmod/touch right after creating a file don't see a stale size.
pub fn setattr(fs: &mut RemoteFs, ino: u64, size: Option<u64>, fh: Option<u64>) -> FsResult<FileAttr> {
    if let (Some(new_len), Some(fh)) = (size, fh) {
        if let Some(handle) = fs.open_file(fh) {
            handle.file.borrow_mut().truncate(new_len)?;
        }
    }

    if ino == ROOT_INO {
        return Ok(fs.root_attr());
    }
    let path = fs.path_for_inode(ino).ok_or(FsError::NotFound)?;
    fs.attr_for_path(&path).ok_or(FsError::NotFound)
}

/// The numbers `statfs` reports: a fixed, large capacity minus the total
/// size of every file the directory index currently knows about, per §6 —
/// the remote bucket's real usage isn't tracked any more precisely than
/// "sum of what we've listed". Can't fail, so there's no `FsResult` here.
pub struct StatfsReport {
    pub blocks: u64,
    pub bfree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

pub fn statfs(fs: &RemoteFs) -> StatfsReport {
    let used_bytes = fs.directory_index.total_bytes();
    let used_blocks = used_bytes.div_ceil(BLOCK_SIZE as u64);
    let free_blocks = TOTAL_BLOCKS.saturating_sub(used_blocks);
    StatfsReport {
        blocks: TOTAL_BLOCKS,
        bfree: free_blocks,
        bsize: BLOCK_SIZE,
        namelen: 255,
        frsize: BLOCK_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{client::BucketClient, Bucket};
    use crate::config::Config;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_fs() -> RemoteFs {
        let client = BucketClient::new("a".into(), "k".into(), "b".into(), 1);
        let bucket = Arc::new(Bucket::new(client, Duration::from_secs(60)));
        RemoteFs::new(Config::default(), bucket, None)
    }

    #[test]
    fn getattr_root_is_a_directory() {
        let mut fs = test_fs();
        let attr = getattr(&mut fs, ROOT_INO).unwrap();
        assert_eq!(attr.kind, fuser::FileType::Directory);
    }

    #[test]
    fn getattr_unknown_inode_is_not_found() {
        let mut fs = test_fs();
        assert!(matches!(getattr(&mut fs, 999), Err(FsError::NotFound)));
    }

    #[test]
    fn statfs_reports_zero_usage_on_an_empty_index() {
        let fs = test_fs();
        let report = statfs(&fs);
        assert_eq!(report.bfree, report.blocks);
    }
}
