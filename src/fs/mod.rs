//! The filesystem operations layer: translates FUSE calls into
//! `DirectoryIndex` queries and `OpenFile` operations, and keeps the
//! inode bookkeeping the mount interface needs that the path-addressed
//! translation layer above doesn't — the flat keyspace has no notion of
//! inodes, and no notion of a directory that holds no files, so `RemoteFs`
//! also tracks the set of locally-created directories.
//!
//! `mod.rs` only routes to per-operation submodules; `lookup`/`readdir`
//! are served from `DirectoryIndex` queries.

mod attr;
mod create;
mod delete;
mod prelude;
mod read;
mod rename;
#[cfg(test)]
mod scenarios;
mod write;
mod xattr;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use fuser::{FileAttr, FileType, Filesystem, Request};
use fuser::{
    ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen,
    ReplyStatfs, ReplyWrite,
};

use crate::bucket::Bucket;
use crate::config::Config;
use crate::directory::DirectoryIndex;
use crate::error::{FsError, FsResult};
use crate::openfile::{OpenFile, RemoteHandle};
use crate::pipeline::WritePipeline;

pub const ROOT_INO: u64 = 1;
pub const ATTR_TTL: Duration = Duration::from_secs(1);

/// One currently-open file handle: its canonical path (so `flush`/`release`
/// can name the key without a reverse inode lookup) and a shared reference
/// to its backing strategy. The strategy is shared (`Rc<RefCell<_>>`), not
/// owned outright, because `open_files` is keyed by file handle while the
/// buffer it refers to is per-*path* (spec.md line 21); two handles opened
/// on the same path point at the same buffer instead of racing two
/// independent, unsynchronized copies.
pub struct OpenHandle {
    pub path: String,
    pub file: Rc<RefCell<OpenFile>>,
}

/// Strips a single leading `/`; the empty string is the root. Mirrors the
/// "Path canonicalisation" rule in §4.6.
pub fn canonicalize(path: &str) -> String {
    path.strip_prefix('/').unwrap_or(path).to_string()
}

pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Strips the `.sha1` suffix from a virtual hashfile path, if present.
pub fn hash_target(path: &str) -> Option<&str> {
    path.strip_suffix(".sha1")
}

/// Splits a canonical path into its parent path and basename. The root's
/// children have an empty parent.
pub fn split_parent_base(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((parent, base)) => (parent.to_string(), base.to_string()),
        None => (String::new(), path.to_string()),
    }
}

/// The main FUSE-facing state. Owns the directory index, the open-file
/// table and the local-directories set; holds a shared reference to the
/// bucket (and, if the async tier is enabled, the write pipeline).
pub struct RemoteFs {
    bucket: Arc<Bucket>,
    pipeline: Option<Arc<WritePipeline>>,
    remote: RemoteHandle,
    config: Config,

    directory_index: DirectoryIndex,
    local_dirs: HashSet<String>,

    inode_to_path: HashMap<u64, String>,
    path_to_inode: HashMap<String, u64>,
    next_inode: u64,

    open_files: HashMap<u64, OpenHandle>,
    next_fh: u64,

    uid: u32,
    gid: u32,
}

impl RemoteFs {
    pub fn new(config: Config, bucket: Arc<Bucket>, pipeline: Option<Arc<WritePipeline>>) -> Self {
        let remote = match &pipeline {
            Some(p) => RemoteHandle::with_pipeline(Arc::clone(&bucket), Arc::clone(p)),
            None => RemoteHandle::new(Arc::clone(&bucket)),
        };
        let mut inode_to_path = HashMap::new();
        let mut path_to_inode = HashMap::new();
        inode_to_path.insert(ROOT_INO, String::new());
        path_to_inode.insert(String::new(), ROOT_INO);

        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };

        RemoteFs {
            bucket,
            pipeline,
            remote,
            config,
            directory_index: DirectoryIndex::new(),
            local_dirs: HashSet::new(),
            inode_to_path,
            path_to_inode,
            next_inode: 2,
            open_files: HashMap::new(),
            next_fh: 1,
            uid,
            gid,
        }
    }

    fn remote_handle(&self) -> RemoteHandle {
        self.remote.clone()
    }

    fn strategy_kind(&self) -> crate::openfile::StrategyKind {
        use crate::openfile::StrategyKind::*;
        if self.config.use_disk {
            DiskBacked
        } else if self.config.sparse_reads {
            SparseMemory
        } else {
            SequentialMemory
        }
    }

    /// Rebuilds the synthetic directory tree from a fresh listing of every
    /// key in the bucket, unioned with the set of locally-created
    /// directories. A file that's been `create`d but not yet flushed won't
    /// appear here yet — callers needing its attributes fall back to the
    /// open-file table (see `open_handle_for_path`).
    fn refresh_directory_index(&mut self) {
        let files = match self.bucket.list_keys("") {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(error = %e, "failed to refresh directory index from remote");
                Vec::new()
            }
        };
        let local_dirs: Vec<&str> = self.local_dirs.iter().map(String::as_str).collect();
        self.directory_index.rebuild(files, local_dirs);
    }

    /// An open handle whose path matches and hasn't been uploaded yet is a
    /// file the directory index can't see; this lets `getattr`/`lookup`
    /// still answer for it (size/dirty state tracked by the open file). Also
    /// the lookup `open()` uses to find a buffer to attach a new handle to,
    /// per the §4.6 open-table row ("else if not yet open, install the
    /// configured strategy" — a conditional, implying reuse otherwise).
    fn open_handle_for_path(&self, path: &str) -> Option<Rc<RefCell<OpenFile>>> {
        self.open_files
            .values()
            .find(|h| h.path == path && !h.file.borrow().is_hash())
            .map(|h| Rc::clone(&h.file))
    }

    fn get_or_create_inode(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_inode.get(path) {
            return ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.inode_to_path.insert(ino, path.to_string());
        self.path_to_inode.insert(path.to_string(), ino);
        ino
    }

    fn path_for_inode(&self, ino: u64) -> Option<String> {
        self.inode_to_path.get(&ino).cloned()
    }

    fn parent_inode(&mut self, ino: u64, path: &str) -> u64 {
        if ino == ROOT_INO {
            return ROOT_INO;
        }
        let (parent_path, _) = split_parent_base(path);
        self.get_or_create_inode(&parent_path)
    }

    /// Builds the strategy-selected `OpenFile` for `path`: a fresh empty
    /// buffer for `create`, or the existing version's buffer for `open`.
    fn build_open_file(&mut self, path: &str, new: bool) -> FsResult<OpenFile> {
        let strategy = self.strategy_kind();
        let remote = self.remote_handle();
        let part_size = self.config.part_size_bytes();
        let temp_root = self.config.temp_folder.clone();
        if new {
            OpenFile::new_empty(strategy, remote, &temp_root, path, part_size)
        } else {
            let info = self
                .directory_index
                .get_file_info(path)
                .cloned()
                .ok_or(FsError::NotFound)?;
            OpenFile::open_existing(strategy, remote, &temp_root, path, part_size, info)
        }
    }

    fn next_file_handle(&mut self) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        fh
    }

    /// Installs a freshly built strategy under a new handle.
    fn insert_open_file(&mut self, path: String, file: OpenFile) -> u64 {
        self.attach_open_file(path, Rc::new(RefCell::new(file)))
    }

    /// Installs a new handle sharing an already-open path's buffer, so
    /// concurrent handles on the same path see and mutate the same state
    /// instead of drifting apart.
    fn attach_open_file(&mut self, path: String, file: Rc<RefCell<OpenFile>>) -> u64 {
        let fh = self.next_file_handle();
        self.open_files.insert(fh, OpenHandle { path, file });
        fh
    }

    fn open_file(&self, fh: u64) -> Option<&OpenHandle> {
        self.open_files.get(&fh)
    }

    fn take_open_file(&mut self, fh: u64) -> Option<OpenHandle> {
        self.open_files.remove(&fh)
    }

    /// Drops any open handle bound to `path` — used by `unlink`/`rmdir`/
    /// `rename` so a dangling buffer can't serve reads for a path the
    /// remote no longer has (§9's resolved Open Question: the buffer is
    /// discarded, not kept alive).
    fn discard_open_buffers_for_path(&mut self, path: &str) {
        self.open_files.retain(|_, h| h.path != path);
    }

    fn local_dirs_insert(&mut self, path: String) {
        self.local_dirs.insert(path);
    }

    fn local_dirs_remove(&mut self, path: &str) {
        self.local_dirs.remove(path);
    }

    fn make_attr(&self, ino: u64, kind: FileType, size: u64, perm: u16, mtime_secs: u64) -> FileAttr {
        let mtime = std::time::UNIX_EPOCH + Duration::from_secs(mtime_secs);
        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(512),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind,
            perm,
            nlink: if kind == FileType::Directory { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            flags: 0,
            blksize: 65536,
        }
    }

    fn root_attr(&self) -> FileAttr {
        self.make_attr(ROOT_INO, FileType::Directory, 0, 0o777, 0)
    }

    /// Resolves a canonical path to the `FileAttr` it should report, per the
    /// `getattr` table: a known directory, a listed file, a `.sha1`
    /// hashfile (if enabled), or a locally-open-but-unlisted file. `None`
    /// means the path resolves to nothing.
    fn attr_for_path(&mut self, path: &str) -> Option<FileAttr> {
        if let Some(target) = hash_target(path) {
            if !self.config.enable_hashfiles {
                return None;
            }
            let size = self
                .directory_index
                .get_file_info(target)?
                .sha1_hex
                .as_ref()
                .map(|h| h.len() as u64 + 1)
                .unwrap_or(0);
            let ino = self.get_or_create_inode(path);
            return Some(self.make_attr(ino, FileType::RegularFile, size, 0o444, 0));
        }

        if self.directory_index.is_directory(path) {
            let ino = self.get_or_create_inode(path);
            return Some(self.make_attr(ino, FileType::Directory, 0, 0o777, 0));
        }

        let file_meta = self
            .directory_index
            .get_file_info(path)
            .map(|info| (info.size, info.upload_time_ms));
        if let Some((size, upload_time_ms)) = file_meta {
            let ino = self.get_or_create_inode(path);
            return Some(self.make_attr(ino, FileType::RegularFile, size, 0o777, upload_time_ms / 1000));
        }

        let open_size = self.open_handle_for_path(path).map(|f| f.borrow().len());
        if let Some(size) = open_size {
            let ino = self.get_or_create_inode(path);
            return Some(self.make_attr(ino, FileType::RegularFile, size, 0o777, 0));
        }

        None
    }
}

impl Filesystem for RemoteFs {
    fn init(&mut self, _req: &Request, _config: &mut fuser::KernelConfig) -> Result<(), libc::c_int> {
        if let Err(e) = self.bucket.authorize() {
            tracing::error!(error = %e, "authorization failed, cannot mount");
            return Err(libc::EIO);
        }
        if self.config.temp_folder.exists() && self.config.use_disk {
            tracing::warn!(path = %self.config.temp_folder.display(), "scratch root already exists at startup");
        }
        self.refresh_directory_index();
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.shutdown();
        }
        if self.config.use_disk {
            let _ = std::fs::remove_dir_all(&self.config.temp_folder);
        }
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match read::lookup(self, parent, name) {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match attr::getattr(self, ino) {
            Ok(a) => reply.attr(&ATTR_TTL, &a),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match attr::setattr(self, ino, size, fh) {
            Ok(a) => reply.attr(&ATTR_TTL, &a),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, _mask: i32, reply: ReplyEmpty) {
        match xattr::access(self, ino) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let r = attr::statfs(self);
        reply.statfs(r.blocks, r.bfree, r.bfree, 0, 0, r.bsize, r.namelen, r.frsize);
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        match read::readdir_entries(self, ino) {
            Ok(entries) => {
                for (i, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
                    if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match read::open(self, ino) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        match read::read(self, fh, offset, size) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match write::write(self, fh, offset, data) {
            Ok(n) => reply.written(n),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match write::flush(self, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match write::release(self, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match create::create(self, parent, name) {
            Ok((attr, fh)) => reply.created(&ATTR_TTL, &attr, 0, fh, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
        match create::mkdir(self, parent, name) {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match delete::unlink(self, parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match delete::rmdir(self, parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        match rename::rename(self, parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }
}

use std::ffi::OsStr;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_one_leading_slash() {
        assert_eq!(canonicalize("/a/b"), "a/b");
        assert_eq!(canonicalize("a/b"), "a/b");
        assert_eq!(canonicalize("/"), "");
        assert_eq!(canonicalize(""), "");
    }

    #[test]
    fn join_handles_root_parent() {
        assert_eq!(join("", "a.txt"), "a.txt");
        assert_eq!(join("dir", "a.txt"), "dir/a.txt");
    }

    #[test]
    fn hash_target_strips_suffix_only() {
        assert_eq!(hash_target("a.txt.sha1"), Some("a.txt"));
        assert_eq!(hash_target("a.txt"), None);
    }

    #[test]
    fn split_parent_base_handles_root_children() {
        assert_eq!(split_parent_base("a.txt"), (String::new(), "a.txt".to_string()));
        assert_eq!(
            split_parent_base("dir/a.txt"),
            ("dir".to_string(), "a.txt".to_string())
        );
    }
}
