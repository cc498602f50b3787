//! The narrow capability an `OpenFile` is given instead of a back-pointer to
//! the whole filesystem (design note §9, "Cyclic/owning references"): fetch
//! bytes by id/range, publish a new version, and delete a version. Nothing
//! else — an `OpenFile` cannot list keys, touch the directory index, or
//! reach another open file through this handle.
//!
//! When the async write pipeline (§4.5) is enabled, `publish`/`delete` stage
//! the remote side-effect and return immediately with a speculative result;
//! otherwise they call straight through to the bucket, synchronously.

use std::sync::Arc;

use crate::bucket::Bucket;
use crate::directory::FileInfo;
use crate::error::FsResult;
use crate::pipeline::WritePipeline;

#[derive(Clone)]
pub struct RemoteHandle {
    bucket: Arc<Bucket>,
    pipeline: Option<Arc<WritePipeline>>,
}

impl RemoteHandle {
    pub fn new(bucket: Arc<Bucket>) -> Self {
        RemoteHandle { bucket, pipeline: None }
    }

    pub fn with_pipeline(bucket: Arc<Bucket>, pipeline: Arc<WritePipeline>) -> Self {
        RemoteHandle { bucket, pipeline: Some(pipeline) }
    }

    /// Fetches bytes by id. When the pipeline is enabled, acquires `key`'s
    /// per-key mutex first — the same lock a deferred upload/delete for that
    /// key holds while it runs — so a fetch observes either the pre- or
    /// post-mutation state, never a partial one (§5's ordering guarantee).
    pub fn fetch(&self, key: &str, id: &str, range: Option<(u64, u64)>) -> FsResult<Vec<u8>> {
        match &self.pipeline {
            Some(pipeline) => pipeline.with_key_lock(key, || self.bucket.download(id, range)),
            None => self.bucket.download(id, range),
        }
    }

    /// Whole-object publish. With the pipeline enabled this stages the
    /// upload and patches the bucket cache speculatively so the caller's
    /// next `getattr`/`readdir` sees the new size without waiting on the
    /// worker pool to actually talk to the remote (§4.5's `put_file`
    /// contract). Without it, uploads synchronously as §4.6 describes for
    /// the direct path.
    pub fn publish(&self, key: &str, bytes: &[u8]) -> FsResult<FileInfo> {
        match &self.pipeline {
            Some(pipeline) => {
                let info = pipeline.put_file(key, bytes.to_vec());
                self.bucket.note_speculative_upload(info.clone());
                Ok(info)
            }
            None => self.bucket.upload(key, bytes),
        }
    }

    /// Mirrors `publish`: staged and speculatively reflected in the cache
    /// when the pipeline is enabled, synchronous otherwise.
    pub fn delete(&self, id: &str, key: &str) -> FsResult<()> {
        match &self.pipeline {
            Some(pipeline) => {
                pipeline.delete_file(key, id.to_string());
                self.bucket.note_speculative_delete(key, id);
                Ok(())
            }
            None => self.bucket.delete_version(id, key),
        }
    }
}
