//! Error kinds shared by every layer of the crate, and their translation into
//! the errno values `fuser` replies with.
//!
//! The variants mirror the "Error kinds" table in the design: each one is a
//! single point where an internal failure mode is mapped onto the narrow
//! vocabulary the kernel filesystem interface understands (ENOENT, EACCES,
//! EIO, ...).

use thiserror::Error;

/// A failure from any layer of the translation stack.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("path not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("target already exists")]
    AlreadyExists,

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("remote transient failure: {0}")]
    RemoteTransient(String),

    #[error("remote fatal failure: {0}")]
    RemoteFatal(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("local io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Maps an error kind to the errno surfaced to the FUSE caller.
    ///
    /// `AlreadyExists` never reaches a FUSE reply in practice — `rename`
    /// resolves collisions internally by unlinking the target first — but it
    /// still needs an errno for completeness and for unit tests that exercise
    /// the mapping directly.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::PermissionDenied => libc::EACCES,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::UnsupportedOperation(_) => libc::EIO,
            FsError::RemoteTransient(_) => libc::EIO,
            FsError::RemoteFatal(_) => libc::EIO,
            FsError::UploadFailed(_) => libc::EIO,
            FsError::Io(_) => libc::EIO,
        }
    }
}

/// Classifies a `reqwest` failure into the retriable/fatal split §4.1 of the
/// design calls for: server 5xx, network timeouts and TLS read-timeouts are
/// transient; everything else (4xx, auth failures) is fatal.
pub fn classify_reqwest_error(err: &reqwest::Error) -> FsError {
    if err.is_timeout() {
        return FsError::RemoteTransient(err.to_string());
    }
    if let Some(status) = err.status() {
        if status.is_server_error() {
            return FsError::RemoteTransient(format!("{status}"));
        }
        return FsError::RemoteFatal(format!("{status}"));
    }
    // Connection-level errors (reset, refused, TLS handshake) are treated as
    // transient: a retry a moment later is the common recovery path.
    if err.is_connect() || err.is_request() {
        return FsError::RemoteTransient(err.to_string());
    }
    FsError::RemoteFatal(err.to_string())
}

pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_matches_design() {
        assert_eq!(FsError::NotFound.to_errno(), libc::ENOENT);
        assert_eq!(FsError::PermissionDenied.to_errno(), libc::EACCES);
        assert_eq!(FsError::AlreadyExists.to_errno(), libc::EEXIST);
        assert_eq!(
            FsError::UnsupportedOperation("random write not supported").to_errno(),
            libc::EIO
        );
        assert_eq!(FsError::RemoteFatal("500".into()).to_errno(), libc::EIO);
    }
}
