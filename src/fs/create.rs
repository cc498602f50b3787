//! `create`, `mkdir` (§4.6).

use super::prelude::*;
use fuser::FileType;

pub fn create(fs: &mut RemoteFs, parent: u64, name: &OsStr) -> FsResult<(FileAttr, u64)> {
    let parent_path = fs.path_for_inode(parent).ok_or(FsError::NotFound)?;
    let path = join(&parent_path, &name.to_string_lossy());

    let file = fs.build_open_file(&path, true)?;
    let ino = fs.get_or_create_inode(&path);
    let fh = fs.insert_open_file(path.clone(), file);
    let attr = fs
        .attr_for_path(&path)
        .unwrap_or_else(|| fs.make_attr(ino, FileType::RegularFile, 0, 0o777, 0));
    Ok((attr, fh))
}

/// Directories are purely local bookkeeping — the flat keyspace has no
/// native notion of one. Appends to the local-directories set and rebuilds
/// the index so the new directory is immediately visible.
pub fn mkdir(fs: &mut RemoteFs, parent: u64, name: &OsStr) -> FsResult<FileAttr> {
    let parent_path = fs.path_for_inode(parent).ok_or(FsError::NotFound)?;
    let path = join(&parent_path, &name.to_string_lossy());

    fs.local_dirs_insert(path.clone());
    fs.refresh_directory_index();

    let ino = fs.get_or_create_inode(&path);
    Ok(fs.make_attr(ino, FileType::Directory, 0, 0o777, 0))
}
