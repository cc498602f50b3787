//! The bucket cache (§4.2): a per-call-name memoization layer over the
//! remote API, with a specialised variant for list-keys that can be
//! speculatively patched by a put/delete before the next real round-trip.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::directory::FileInfo;

struct CacheEntry<T> {
    inserted_at: Instant,
    value: T,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        CacheEntry {
            inserted_at: Instant::now(),
            value,
        }
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.inserted_at.elapsed() >= timeout
    }
}

/// A single named bucket of `params -> value`, keyed by whatever the caller
/// uses to identify the call (e.g. a file id for `get_info`).
struct NamedBucket<T> {
    entries: DashMap<String, CacheEntry<T>>,
    timeout: Duration,
}

impl<T: Clone> NamedBucket<T> {
    fn new(timeout: Duration) -> Self {
        NamedBucket {
            entries: DashMap::new(),
            timeout,
        }
    }

    fn get(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(self.timeout) {
                return Some(entry.value.clone());
            }
        }
        // Expired entries are deleted on access, per the design.
        self.entries.remove(key);
        None
    }

    fn put(&self, key: String, value: T) {
        self.entries.insert(key, CacheEntry::new(value));
    }

    fn invalidate_all(&self) {
        self.entries.clear();
    }
}

/// The list-keys bucket: cached per prefix, with `add_file`/`remove_file`
/// patch operations so an upload-then-stat workflow sees the new key
/// without a server round-trip.
struct ListCache {
    entries: DashMap<String, CacheEntry<Vec<FileInfo>>>,
    timeout: Duration,
}

impl ListCache {
    fn new(timeout: Duration) -> Self {
        ListCache {
            entries: DashMap::new(),
            timeout,
        }
    }

    fn get(&self, prefix: &str) -> Option<Vec<FileInfo>> {
        if let Some(entry) = self.entries.get(prefix) {
            if !entry.is_expired(self.timeout) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove(prefix);
        None
    }

    fn put(&self, prefix: String, files: Vec<FileInfo>) {
        self.entries.insert(prefix, CacheEntry::new(files));
    }

    fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Patches every cached listing whose prefix is a prefix of `file.key`,
    /// deduplicated by key (last write wins). Does not touch the entry's
    /// expiry — a speculative patch keeps riding the same TTL window as the
    /// listing it patched.
    fn add_file(&self, file: FileInfo) {
        for mut entry in self.entries.iter_mut() {
            let prefix = entry.key().clone();
            if !file.key.starts_with(&prefix) {
                continue;
            }
            let files = &mut entry.value_mut().value;
            if let Some(existing) = files.iter_mut().find(|f| f.key == file.key) {
                *existing = file.clone();
            } else {
                files.push(file.clone());
            }
        }
    }

    fn remove_file(&self, key: &str) {
        for mut entry in self.entries.iter_mut() {
            entry.value_mut().value.retain(|f| f.key != key);
        }
    }
}

/// Aggregates the list-keys cache and the get-info cache behind one handle;
/// every mutating remote call (upload, delete) invalidates the bucket that
/// could have gone stale.
pub struct BucketCache {
    list_cache: ListCache,
    get_info_cache: NamedBucket<FileInfo>,
}

impl BucketCache {
    pub fn new(timeout: Duration) -> Self {
        BucketCache {
            list_cache: ListCache::new(timeout),
            get_info_cache: NamedBucket::new(timeout),
        }
    }

    pub fn get_list(&self, prefix: &str) -> Option<Vec<FileInfo>> {
        self.list_cache.get(prefix)
    }

    pub fn put_list(&self, prefix: &str, files: Vec<FileInfo>) {
        self.list_cache.put(prefix.to_string(), files);
    }

    pub fn get_info(&self, id: &str) -> Option<FileInfo> {
        self.get_info_cache.get(id)
    }

    pub fn put_info(&self, id: &str, file: FileInfo) {
        self.get_info_cache.put(id.to_string(), file);
    }

    /// Called after a successful upload: the new version becomes visible to
    /// every cached listing it falls under, and the get-info bucket is
    /// invalidated wholesale (a new file id exists; any cached result keyed
    /// by the old id is no longer reachable, and we don't try to be clever
    /// about it).
    pub fn note_upload(&self, file: FileInfo) {
        self.list_cache.add_file(file);
        self.get_info_cache.invalidate_all();
    }

    /// Called after a successful delete: removes the key from every cached
    /// listing and drops any cached get-info result for it.
    pub fn note_delete(&self, key: &str, id: &str) {
        self.list_cache.remove_file(key);
        self.get_info_cache.entries.remove(id);
    }

    pub fn invalidate_all(&self) {
        self.list_cache.invalidate_all();
        self.get_info_cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FileAction;

    fn file(key: &str) -> FileInfo {
        FileInfo {
            key: key.to_string(),
            id: format!("id-{key}"),
            size: 1,
            upload_time_ms: 0,
            sha1_hex: None,
            action: FileAction::Upload,
        }
    }

    #[test]
    fn list_cache_round_trips() {
        let cache = BucketCache::new(Duration::from_secs(60));
        assert!(cache.get_list("").is_none());
        cache.put_list("", vec![file("a.txt")]);
        assert_eq!(cache.get_list("").unwrap().len(), 1);
    }

    #[test]
    fn expired_entries_are_dropped_on_access() {
        let cache = BucketCache::new(Duration::from_millis(1));
        cache.put_list("", vec![file("a.txt")]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_list("").is_none());
    }

    #[test]
    fn note_upload_patches_matching_cached_listings() {
        let cache = BucketCache::new(Duration::from_secs(60));
        cache.put_list("", vec![file("a.txt")]);
        cache.put_list("dir/", vec![]);

        cache.note_upload(file("b.txt"));
        cache.note_upload(file("dir/nested.txt"));

        let root = cache.get_list("").unwrap();
        assert!(root.iter().any(|f| f.key == "b.txt"));
        assert!(!root.iter().any(|f| f.key == "dir/nested.txt"));

        let dir = cache.get_list("dir/").unwrap();
        assert!(dir.iter().any(|f| f.key == "dir/nested.txt"));
    }

    #[test]
    fn note_delete_removes_from_every_cached_listing() {
        let cache = BucketCache::new(Duration::from_secs(60));
        cache.put_list("", vec![file("a.txt"), file("b.txt")]);
        cache.note_delete("a.txt", "id-a.txt");
        let root = cache.get_list("").unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].key, "b.txt");
    }

    #[test]
    fn invalidate_all_clears_both_buckets() {
        let cache = BucketCache::new(Duration::from_secs(60));
        cache.put_list("", vec![file("a.txt")]);
        cache.put_info("id-a.txt", file("a.txt"));
        cache.invalidate_all();
        assert!(cache.get_list("").is_none());
        assert!(cache.get_info("id-a.txt").is_none());
    }
}
