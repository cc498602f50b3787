//! The remote bucket: a typed client (§4.1) fronted by a memoizing cache
//! (§4.2). `Bucket` is the façade the rest of the crate talks to — it never
//! calls `BucketClient` directly without checking the cache first, and it
//! patches or invalidates the cache after every mutation.

pub mod cache;
pub mod client;
pub mod wire;

use std::time::Duration;

use crate::directory::FileInfo;
use crate::error::FsResult;

pub use client::BucketClient;

pub struct Bucket {
    client: BucketClient,
    cache: cache::BucketCache,
}

impl Bucket {
    pub fn new(client: BucketClient, cache_timeout: Duration) -> Self {
        Bucket {
            client,
            cache: cache::BucketCache::new(cache_timeout),
        }
    }

    pub fn authorize(&self) -> FsResult<()> {
        self.client.authorize()
    }

    /// Lists every key under `prefix`, serving from the cache when fresh.
    pub fn list_keys(&self, prefix: &str) -> FsResult<Vec<FileInfo>> {
        if let Some(cached) = self.cache.get_list(prefix) {
            return Ok(cached);
        }
        let files = self.client.list_keys(prefix)?;
        self.cache.put_list(prefix, files.clone());
        Ok(files)
    }

    pub fn get_info(&self, id: &str) -> FsResult<FileInfo> {
        if let Some(cached) = self.cache.get_info(id) {
            return Ok(cached);
        }
        let info = self.client.get_info(id)?;
        self.cache.put_info(id, info.clone());
        Ok(info)
    }

    pub fn download(&self, id: &str, range: Option<(u64, u64)>) -> FsResult<Vec<u8>> {
        self.client.download(id, range)
    }

    /// Uploads a new version and patches the cache so the upload is
    /// immediately visible to the next `readdir`/`getattr` without a fresh
    /// list round-trip (§4.2's "upload then immediately stat" workflow).
    pub fn upload(&self, key: &str, bytes: &[u8]) -> FsResult<FileInfo> {
        let info = self.client.upload(key, bytes)?;
        self.cache.note_upload(info.clone());
        Ok(info)
    }

    pub fn delete_version(&self, id: &str, key: &str) -> FsResult<()> {
        self.client.delete_version(id, key)?;
        self.cache.note_delete(key, id);
        Ok(())
    }

    /// Deletes every known version of `key`, given the caller already has
    /// its current `FileInfo` (the whole-object-replace path in
    /// `OpenFile::upload` needs exactly one version deleted per call; this
    /// is the convenience used there and by `unlink`/`rmdir`).
    pub fn delete_key(&self, key: &str, id: &str) -> FsResult<()> {
        self.delete_version(id, key)
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    /// Patches the cache as if `info` had just been uploaded, without
    /// actually talking to the remote. Used by the async write pipeline
    /// (§4.5) so a deferred upload is visible to the local directory view
    /// before the worker pool gets to it.
    pub fn note_speculative_upload(&self, info: FileInfo) {
        self.cache.note_upload(info);
    }

    /// Patches the cache as if `key`/`id` had just been deleted, without
    /// actually talking to the remote. The async write pipeline's
    /// counterpart to `note_speculative_upload`.
    pub fn note_speculative_delete(&self, key: &str, id: &str) {
        self.cache.note_delete(key, id);
    }
}
