//! `rename` (§4.6). The backend has no native rename: `open(o)`, read the
//! full contents, `create(n)`, write, upload, then delete `o`. If `n`
//! already exists it's deleted first.

use super::prelude::*;

pub fn rename(
    fs: &mut RemoteFs,
    parent: u64,
    name: &OsStr,
    newparent: u64,
    newname: &OsStr,
) -> FsResult<()> {
    let old_parent = fs.path_for_inode(parent).ok_or(FsError::NotFound)?;
    let new_parent = fs.path_for_inode(newparent).ok_or(FsError::NotFound)?;
    let old_path = join(&old_parent, &name.to_string_lossy());
    let new_path = join(&new_parent, &newname.to_string_lossy());

    if !fs.directory_index.is_file(&old_path) {
        return Err(FsError::NotFound);
    }

    if let Some(existing) = fs.directory_index.get_file_info(&new_path).cloned() {
        fs.bucket.delete_key(&new_path, &existing.id)?;
        fs.discard_open_buffers_for_path(&new_path);
    }

    let mut source = fs.build_open_file(&old_path, false)?;
    let len = source.len().min(u32::MAX as u64) as u32;
    let contents = source.read(0, len)?;

    let mut dest = fs.build_open_file(&new_path, true)?;
    dest.write(0, &contents)?;
    dest.upload(&new_path)?;

    if let Some(old_info) = fs.directory_index.get_file_info(&old_path).cloned() {
        fs.bucket.delete_key(&old_path, &old_info.id)?;
    }
    fs.discard_open_buffers_for_path(&old_path);

    fs.refresh_directory_index();
    Ok(())
}
