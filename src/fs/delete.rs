//! `unlink`, `rmdir` (§4.6). `rmdir` only removes same-level files — source
//! behavior per §9's resolved Open Question, not a recursive delete.

use super::prelude::*;

pub fn unlink(fs: &mut RemoteFs, parent: u64, name: &OsStr) -> FsResult<()> {
    let parent_path = fs.path_for_inode(parent).ok_or(FsError::NotFound)?;
    let path = join(&parent_path, &name.to_string_lossy());

    let info = fs.directory_index.get_file_info(&path).cloned();
    if let Some(info) = info {
        fs.bucket.delete_key(&path, &info.id)?;
    }
    fs.discard_open_buffers_for_path(&path);
    fs.refresh_directory_index();
    Ok(())
}

pub fn rmdir(fs: &mut RemoteFs, parent: u64, name: &OsStr) -> FsResult<()> {
    let parent_path = fs.path_for_inode(parent).ok_or(FsError::NotFound)?;
    let path = join(&parent_path, &name.to_string_lossy());

    if !fs.directory_index.is_directory(&path) {
        return Err(FsError::NotFound);
    }

    let children: Vec<(String, String)> = fs
        .directory_index
        .get_directory(&path)
        .map(|dir| dir.files.iter().map(|f| (f.key.clone(), f.id.clone())).collect())
        .unwrap_or_default();

    for (key, id) in &children {
        fs.bucket.delete_key(key, id)?;
        fs.discard_open_buffers_for_path(key);
    }

    fs.local_dirs_remove(&path);
    fs.refresh_directory_index();
    Ok(())
}
