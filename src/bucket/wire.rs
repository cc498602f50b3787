//! JSON wire shapes for the remote bucket API (§6 of the design).
//!
//! These are the raw `serde` types `BucketClient` deserializes responses
//! into; `crate::directory::FileInfo` is the typed snapshot the rest of the
//! crate actually works with (see `From<FileVersionWire> for FileInfo`).

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone)]
pub struct AuthorizeAccountResponse {
    #[serde(rename = "authorizationToken")]
    pub authorization_token: String,
    #[serde(rename = "apiUrl")]
    pub api_url: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}

#[derive(Serialize, Debug)]
pub struct AuthorizeAccountRequest<'a> {
    #[serde(rename = "accountId")]
    pub account_id: &'a str,
    #[serde(rename = "applicationKey")]
    pub application_key: &'a str,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GetUploadUrlResponse {
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
    #[serde(rename = "authorizationToken")]
    pub authorization_token: String,
}

/// One version of one key, as the server reports it (list, get-info and
/// upload responses all share this shape).
#[derive(Deserialize, Debug, Clone)]
pub struct FileVersionWire {
    #[serde(rename = "fileId")]
    pub file_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "contentLength", default)]
    pub content_length: u64,
    #[serde(rename = "uploadTimestamp", default)]
    pub upload_timestamp: u64,
    #[serde(rename = "contentSha1", default)]
    pub content_sha1: Option<String>,
    #[serde(default = "default_action")]
    pub action: String,
}

fn default_action() -> String {
    "upload".to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct ListFileNamesResponse {
    pub files: Vec<FileVersionWire>,
    #[serde(rename = "nextFileName")]
    pub next_file_name: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct ListFileNamesRequest<'a> {
    #[serde(rename = "bucketId")]
    pub bucket_id: &'a str,
    #[serde(rename = "startFileName", skip_serializing_if = "Option::is_none")]
    pub start_file_name: Option<&'a str>,
    #[serde(rename = "prefix", skip_serializing_if = "str::is_empty")]
    pub prefix: &'a str,
    #[serde(rename = "maxFileCount")]
    pub max_file_count: u32,
}

#[derive(Serialize, Debug)]
pub struct GetFileInfoRequest<'a> {
    #[serde(rename = "fileId")]
    pub file_id: &'a str,
}

#[derive(Serialize, Debug)]
pub struct DeleteFileVersionRequest<'a> {
    #[serde(rename = "fileName")]
    pub file_name: &'a str,
    #[serde(rename = "fileId")]
    pub file_id: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub status: u16,
}
