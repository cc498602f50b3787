//! The synthetic directory tree over the bucket's flat keyspace, and the
//! `FileInfo` snapshot type produced by list/get-info calls: a rooted tree
//! rebuilt wholesale from a flat list of keys, plus a side-set of
//! locally-created directory paths the flat keyspace can't otherwise encode.

use std::collections::HashMap;

use crate::bucket::wire::FileVersionWire;

/// Whether an upload added a new version or a "hide" marker hid it (B2's
/// soft-delete marker). The translation layer only ever surfaces `Upload`
/// entries to the directory tree; `Hide` rows are filtered out by the
/// bucket client before they reach here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Upload,
    Hide,
}

/// Immutable snapshot of one key's current version, as produced by a list or
/// get-info call.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub key: String,
    pub id: String,
    pub size: u64,
    pub upload_time_ms: u64,
    pub sha1_hex: Option<String>,
    pub action: FileAction,
}

impl From<FileVersionWire> for FileInfo {
    fn from(w: FileVersionWire) -> Self {
        let action = if w.action.eq_ignore_ascii_case("hide") {
            FileAction::Hide
        } else {
            FileAction::Upload
        };
        FileInfo {
            key: w.file_name,
            id: w.file_id,
            size: w.content_length,
            upload_time_ms: w.upload_timestamp,
            sha1_hex: w.content_sha1,
            action,
        }
    }
}

/// One node of the synthetic directory tree.
///
/// Invariant: `children` keys are unique basenames; `files` entries have
/// `key == parent_path + "/" + name` (or just `name` at the root). A
/// directory and a file can never share a full path — if a listed key
/// collides with a locally-created directory path, the file wins (see
/// `DirectoryIndex::rebuild`).
#[derive(Debug, Default)]
pub struct Directory {
    pub name: String,
    pub children: HashMap<String, Directory>,
    pub files: Vec<FileInfo>,
}

impl Directory {
    fn new(name: impl Into<String>) -> Self {
        Directory {
            name: name.into(),
            children: HashMap::new(),
            files: Vec::new(),
        }
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Root of the synthetic directory tree, rebuilt on demand from a flat list
/// of `FileInfo`s plus the set of locally-created directory paths.
#[derive(Debug)]
pub struct DirectoryIndex {
    root: Directory,
}

impl Default for DirectoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryIndex {
    pub fn new() -> Self {
        DirectoryIndex {
            root: Directory::new(""),
        }
    }

    /// Rebuilds the tree from scratch: local directories first (so they
    /// exist even with no files under them yet), then every file's parent
    /// chain. A file whose parent path collides with a pure directory node
    /// just becomes a child of it, same as any other file — the only real
    /// collision case is a listed key whose *full path* is also a
    /// locally-created directory path, which `materialize_dir` resolves by
    /// letting the directory chain win structurally while `is_file`/
    /// `is_directory` below treat the file as authoritative at that leaf.
    pub fn rebuild<'a>(
        &mut self,
        file_infos: impl IntoIterator<Item = FileInfo>,
        local_dirs: impl IntoIterator<Item = &'a str>,
    ) {
        let mut root = Directory::new("");

        for dir_path in local_dirs {
            let segments = split_path(dir_path);
            materialize_dir(&mut root, &segments);
        }

        for file_info in file_infos {
            let segments = split_path(&file_info.key);
            if segments.is_empty() {
                continue;
            }
            let (parent_segments, basename) = segments.split_at(segments.len() - 1);
            let parent = materialize_dir(&mut root, parent_segments);
            if let Some(existing) = parent.files.iter_mut().find(|f| {
                f.key
                    .rsplit('/')
                    .next()
                    .unwrap_or(f.key.as_str())
                    == basename[0]
            }) {
                *existing = file_info;
            } else {
                parent.files.push(file_info);
            }
        }

        self.root = root;
    }

    fn walk(&self, path: &str) -> Option<&Directory> {
        let mut node = &self.root;
        for segment in split_path(path) {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    /// True iff walking `p`'s segments lands on an existing directory node.
    /// Per the file-wins invariant, a path that is also a file's full key is
    /// not considered a directory even if a directory node happens to exist
    /// there (callers check `is_file` first).
    pub fn is_directory(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        if self.is_file(path) {
            return false;
        }
        self.walk(path).is_some()
    }

    /// True iff the parent node holds a file whose basename is the last
    /// path segment.
    pub fn is_file(&self, path: &str) -> bool {
        self.get_file_info(path).is_some()
    }

    pub fn get_directory(&self, path: &str) -> Option<&Directory> {
        if self.is_file(path) {
            return None;
        }
        self.walk(path)
    }

    pub fn get_file_info(&self, path: &str) -> Option<&FileInfo> {
        let segments = split_path(path);
        let split_point = segments.len().checked_sub(1)?;
        let (parent_segments, basename) = segments.split_at(split_point);
        let name = *basename.first()?;
        let parent = self.walk_segments(parent_segments)?;
        parent
            .files
            .iter()
            .find(|f| f.key.rsplit('/').next().unwrap_or(f.key.as_str()) == name)
    }

    fn walk_segments(&self, segments: &[&str]) -> Option<&Directory> {
        let mut node = &self.root;
        for segment in segments {
            node = node.children.get(*segment)?;
        }
        Some(node)
    }

    /// Sum of every listed file's size, used by `statfs` to report a
    /// capacity net of current known cloud consumption (§6).
    pub fn total_bytes(&self) -> u64 {
        fn walk(dir: &Directory) -> u64 {
            let own: u64 = dir.files.iter().map(|f| f.size).sum();
            own + dir.children.values().map(walk).sum::<u64>()
        }
        walk(&self.root)
    }

    /// Names (subdirectories then file basenames) directly under `path`, in
    /// no particular order — `readdir` sorts downstream if it wants to.
    pub fn children(&self, path: &str) -> Vec<String> {
        let Some(dir) = self.get_directory(path) else {
            return Vec::new();
        };
        let mut names: Vec<String> = dir.children.keys().cloned().collect();
        names.extend(
            dir.files
                .iter()
                .map(|f| f.key.rsplit('/').next().unwrap_or(f.key.as_str()).to_string()),
        );
        names
    }
}

/// Walks/creates the directory chain named by `segments` under `root`,
/// returning the final node.
fn materialize_dir<'d>(root: &'d mut Directory, segments: &[&str]) -> &'d mut Directory {
    let mut node = root;
    for segment in segments {
        node = node
            .children
            .entry(segment.to_string())
            .or_insert_with(|| Directory::new(*segment));
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(key: &str, size: u64) -> FileInfo {
        FileInfo {
            key: key.to_string(),
            id: format!("id-{key}"),
            size,
            upload_time_ms: 1000,
            sha1_hex: Some("deadbeef".to_string()),
            action: FileAction::Upload,
        }
    }

    #[test]
    fn every_prefix_of_a_listed_key_is_a_directory() {
        let mut index = DirectoryIndex::new();
        index.rebuild(vec![file("a/b/c.txt", 5)], std::iter::empty());

        assert!(index.is_directory(""));
        assert!(index.is_directory("a"));
        assert!(index.is_directory("a/b"));
        assert!(index.is_file("a/b/c.txt"));
        assert!(!index.is_directory("a/b/c.txt"));
    }

    #[test]
    fn local_directory_persists_with_no_files() {
        let mut index = DirectoryIndex::new();
        index.rebuild(std::iter::empty(), vec!["empty/dir"]);
        assert!(index.is_directory("empty/dir"));
        assert_eq!(index.children("empty").len(), 1);
    }

    #[test]
    fn file_wins_over_colliding_local_directory_path() {
        let mut index = DirectoryIndex::new();
        index.rebuild(vec![file("d/leaf", 3)], vec!["d/leaf"]);
        assert!(index.is_file("d/leaf"));
        assert!(!index.is_directory("d/leaf"));
    }

    #[test]
    fn children_lists_both_dirs_and_files() {
        let mut index = DirectoryIndex::new();
        index.rebuild(
            vec![file("top/a.txt", 1), file("top/b.txt", 2)],
            vec!["top/sub"],
        );
        let mut names = index.children("top");
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
    }

    #[test]
    fn total_bytes_sums_every_listed_file_recursively() {
        let mut index = DirectoryIndex::new();
        index.rebuild(
            vec![file("a.txt", 10), file("dir/b.txt", 20), file("dir/sub/c.txt", 5)],
            std::iter::empty(),
        );
        assert_eq!(index.total_bytes(), 35);
    }

    #[test]
    fn rebuild_replaces_stale_file_info() {
        let mut index = DirectoryIndex::new();
        index.rebuild(vec![file("a.txt", 5)], std::iter::empty());
        index.rebuild(vec![file("a.txt", 99)], std::iter::empty());
        assert_eq!(index.get_file_info("a.txt").unwrap().size, 99);
    }
}
