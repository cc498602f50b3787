//! Shared imports for the `fs` submodules: `FileAttr` (a plain data struct,
//! freely constructible, unlike `fuser`'s `Reply*` types), the error type,
//! and the core `RemoteFs` state, so each operation file only has to
//! `use super::prelude::*;`.

pub use fuser::FileAttr;

pub use std::ffi::OsStr;

pub use crate::error::{FsError, FsResult};
pub use crate::openfile::OpenFile;

pub use super::{hash_target, join, split_parent_base, RemoteFs, ROOT_INO};
