//! `access` (§4.6). Extended attributes aren't supported (Non-goals);
//! `fuser`'s default `getxattr`/`setxattr`/`listxattr` implementations
//! already reply `ENOSYS`, so only `access` needs a body here.

use super::prelude::*;

pub fn access(fs: &mut RemoteFs, ino: u64) -> FsResult<()> {
    if ino == ROOT_INO {
        return Ok(());
    }
    let path = fs.path_for_inode(ino).ok_or(FsError::PermissionDenied)?;
    let known = fs.directory_index.is_directory(&path)
        || fs.directory_index.is_file(&path)
        || fs.open_handle_for_path(&path).is_some();
    if known {
        Ok(())
    } else {
        Err(FsError::PermissionDenied)
    }
}
