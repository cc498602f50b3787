//! `lookup`, `readdir`, `open`, `read` (§4.6).
//!
//! These return plain `FsResult`s instead of writing to `fuser::Reply*`
//! directly (see `prelude.rs`/`mod.rs`), which also makes them callable
//! directly from tests without a kernel-issued `fuser::Request`.

use super::prelude::*;
use fuser::FileType;

pub fn lookup(fs: &mut RemoteFs, parent: u64, name: &OsStr) -> FsResult<FileAttr> {
    let parent_path = fs.path_for_inode(parent).ok_or(FsError::NotFound)?;
    let child_path = join(&parent_path, &name.to_string_lossy());
    fs.attr_for_path(&child_path).ok_or(FsError::NotFound)
}

/// Rebuilds the directory index from a fresh listing ∪ local directories,
/// then unions in any open-but-not-yet-listed files, per §4.6's `readdir`
/// row. `.sha1` virtual siblings are synthesised when hashfiles are enabled.
/// Returns the full entry list (including `.`/`..`); the trait impl in
/// `mod.rs` applies the FUSE-side offset/`reply.add` pagination over it.
pub fn readdir_entries(fs: &mut RemoteFs, ino: u64) -> FsResult<Vec<(u64, FileType, String)>> {
    let path = fs.path_for_inode(ino).ok_or(FsError::NotFound)?;

    fs.refresh_directory_index();

    if ino != ROOT_INO && !fs.directory_index.is_directory(&path) {
        return Err(FsError::NotFound);
    }

    let mut names = fs.directory_index.children(&path);

    let open_siblings: Vec<String> = fs
        .open_files
        .values()
        .filter(|h| !h.file.borrow().is_hash())
        .filter_map(|h| {
            let (parent, base) = split_parent_base(&h.path);
            (parent == path).then_some(base)
        })
        .collect();
    for name in open_siblings {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    if fs.config.enable_hashfiles {
        let hash_names: Vec<String> = names
            .iter()
            .filter(|n| !fs.directory_index.is_directory(&join(&path, n)))
            .map(|n| format!("{n}.sha1"))
            .collect();
        names.extend(hash_names);
    }

    let parent_ino = fs.parent_inode(ino, &path);
    let mut entries: Vec<(u64, FileType, String)> = vec![
        (ino, FileType::Directory, ".".to_string()),
        (parent_ino, FileType::Directory, "..".to_string()),
    ];

    for name in names {
        let child_path = join(&path, &name);
        let kind = if name.ends_with(".sha1") || !fs.directory_index.is_directory(&child_path) {
            FileType::RegularFile
        } else {
            FileType::Directory
        };
        let child_ino = fs.get_or_create_inode(&child_path);
        entries.push((child_ino, kind, name));
    }

    Ok(entries)
}

/// NotFound if the path resolves to nothing; installs Hash over the
/// de-suffixed path for a `.sha1` open, otherwise attaches to the already-
/// open buffer for `path` if one exists, or installs the configured
/// strategy if not — the §4.6 open-table row is a conditional ("else if
/// **not yet open**, install the configured strategy"), and buffers are
/// per-*path* (spec.md line 21), not per-handle: two concurrent opens of
/// the same path must share one buffer, or a write+flush on one handle
/// could be silently clobbered by the other's stale flush.
pub fn open(fs: &mut RemoteFs, ino: u64) -> FsResult<u64> {
    let path = fs.path_for_inode(ino).ok_or(FsError::NotFound)?;

    if let Some(target) = hash_target(&path) {
        if !fs.config.enable_hashfiles {
            return Err(FsError::NotFound);
        }
        let info = fs
            .directory_index
            .get_file_info(target)
            .cloned()
            .ok_or(FsError::NotFound)?;
        let file = OpenFile::new_hash(&info);
        return Ok(fs.insert_open_file(path, file));
    }

    if !fs.directory_index.is_file(&path) {
        return Err(FsError::NotFound);
    }

    if let Some(existing) = fs.open_handle_for_path(&path) {
        return Ok(fs.attach_open_file(path, existing));
    }

    let file = fs.build_open_file(&path, false)?;
    Ok(fs.insert_open_file(path, file))
}

pub fn read(fs: &mut RemoteFs, fh: u64, offset: i64, size: u32) -> FsResult<Vec<u8>> {
    let handle = fs.open_file(fh).ok_or(FsError::NotFound)?;
    handle.file.borrow_mut().read(offset as u64, size)
}
