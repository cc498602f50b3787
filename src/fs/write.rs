//! `write`, `flush`, `release` (§4.6). `flush` performs the whole-object
//! replace; `release` flushes again (in case the kernel never called
//! `flush`) and optionally purges the local buffer.

use super::prelude::*;

pub fn write(fs: &mut RemoteFs, fh: u64, offset: i64, data: &[u8]) -> FsResult<u32> {
    let handle = fs.open_file(fh).ok_or(FsError::NotFound)?;
    handle.file.borrow_mut().write(offset as u64, data)
}

/// Files whose basename starts with `.` are skipped — a conservative guard
/// against churning on editor swap/lock files, applied once here rather
/// than duplicated per strategy.
pub fn flush(fs: &mut RemoteFs, fh: u64) -> FsResult<()> {
    let Some(handle) = fs.open_file(fh) else {
        return Ok(());
    };
    let (_, base) = split_parent_base(&handle.path);
    if base.starts_with('.') {
        return Ok(());
    }
    let key = handle.path.clone();
    handle.file.borrow_mut().upload(&key)
}

pub fn release(fs: &mut RemoteFs, fh: u64) -> FsResult<()> {
    let Some(handle) = fs.take_open_file(fh) else {
        return Ok(());
    };

    let (_, base) = split_parent_base(&handle.path);
    if !base.starts_with('.') {
        handle.file.borrow_mut().upload(&handle.path)?;
    }

    if fs.config.purge_on_release {
        let _ = handle.file.borrow_mut().delete(&handle.path, false);
    }

    Ok(())
}
