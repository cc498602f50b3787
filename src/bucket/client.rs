//! The Remote Bucket Client: typed, blocking operations over the remote
//! object-storage API (§4.1). Everything above this layer works in terms of
//! `FileInfo`/bytes; this is the only module that knows about JSON, HTTP
//! headers, percent-encoding and B2-style wire shapes.

use std::sync::RwLock;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use sha1::{Digest, Sha1};

use crate::bucket::wire::{
    AuthorizeAccountRequest, AuthorizeAccountResponse, DeleteFileVersionRequest, ErrorResponse,
    FileVersionWire, GetFileInfoRequest, GetUploadUrlResponse, ListFileNamesRequest,
    ListFileNamesResponse,
};
use crate::directory::{FileAction, FileInfo};
use crate::error::{classify_reqwest_error, FsError, FsResult};

const ACCOUNT_AUTHORIZE_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";
const MAX_FILE_COUNT: u32 = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Characters that must be percent-encoded in an `X-Bz-File-Name` header,
/// per RFC 3986, applied to the UTF-8 bytes of the key.
const FILE_NAME_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'%');

/// Turns a non-2xx response into an `FsError`, preferring the B2 error
/// body's `code`/`message` over the bare status line when the server sent
/// one — `error_for_status` alone only has the numeric status to report.
/// Consumes `response`, so callers must use the returned value on success.
fn check_status(response: reqwest::blocking::Response) -> FsResult<reqwest::blocking::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => format!("{} ({}): {}", err.code, err.status, err.message),
        Err(_) if body.is_empty() => format!("{status}"),
        Err(_) => body,
    };
    if status.is_server_error() {
        Err(FsError::RemoteTransient(detail))
    } else {
        Err(FsError::RemoteFatal(detail))
    }
}

#[derive(Debug, Default)]
struct Session {
    auth_token: String,
    api_url: String,
    download_url: String,
    upload_url: String,
    upload_auth_token: String,
}

/// Typed, blocking client for the remote bucket API.
///
/// Holds the current session token/URLs behind a lock so a background
/// pipeline worker and the mount dispatch thread can share one client. All
/// operations are synchronous, matching §4.1's "All blocking" contract.
pub struct BucketClient {
    http: reqwest::blocking::Client,
    account_id: String,
    application_key: String,
    bucket_id: String,
    max_retries: u32,
    session: RwLock<Session>,
    authorize_url: String,
}

impl BucketClient {
    pub fn new(account_id: String, application_key: String, bucket_id: String, max_retries: u32) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        BucketClient {
            http,
            account_id,
            application_key,
            bucket_id,
            max_retries,
            session: RwLock::new(Session::default()),
            authorize_url: ACCOUNT_AUTHORIZE_URL.to_string(),
        }
    }

    /// Points `authorize` at a different endpoint than the real B2 account
    /// API — the rest of the session (`api_url`/`download_url`/upload URLs)
    /// is always whatever the authorize response says, so overriding just
    /// this one hardcoded URL is enough to run the whole client against a
    /// local fake server in tests.
    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    /// Authorizes the account. Must be called once before any other
    /// operation; failure here is fatal at startup (§4.1).
    pub fn authorize(&self) -> FsResult<()> {
        let body = AuthorizeAccountRequest {
            account_id: &self.account_id,
            application_key: &self.application_key,
        };
        let response = self
            .http
            .post(&self.authorize_url)
            .basic_auth(&self.account_id, Some(&self.application_key))
            .json(&body)
            .send()
            .map_err(|e| classify_reqwest_error(&e))?;

        let response = check_status(response).map_err(|e| {
            tracing::error!(error = %e, "authorize failed");
            e
        })?;

        let parsed: AuthorizeAccountResponse = response
            .json()
            .map_err(|e| FsError::RemoteFatal(e.to_string()))?;

        let mut session = self.session.write().expect("session lock poisoned");
        session.auth_token = parsed.authorization_token;
        session.api_url = parsed.api_url;
        session.download_url = parsed.download_url;
        tracing::info!("authorized against remote bucket API");
        Ok(())
    }

    fn api_url(&self, path: &str) -> String {
        let session = self.session.read().expect("session lock poisoned");
        format!("{}/b2api/v2/{}", session.api_url, path)
    }

    fn auth_token(&self) -> String {
        self.session.read().expect("session lock poisoned").auth_token.clone()
    }

    /// Runs `op` up to `max_retries + 1` times, sleeping a fixed backoff
    /// between attempts whenever the error is classified transient.
    fn with_retry<T>(&self, op: impl Fn() -> FsResult<T>) -> FsResult<T> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match op() {
                Ok(value) => return Ok(value),
                Err(FsError::RemoteTransient(msg)) => {
                    tracing::warn!(attempt, %msg, "transient remote failure, retrying");
                    last_err = Some(FsError::RemoteTransient(msg));
                    std::thread::sleep(Duration::from_millis(250 * (attempt as u64 + 1)));
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_err.unwrap_or(FsError::RemoteFatal("retries exhausted".into())))
    }

    /// Pages through `list_file_names` while `nextFileName` still begins
    /// with `prefix`, per §4.1's ListKeys algorithm. Returns every `Upload`
    /// version; `Hide` markers (B2's soft-delete rows) are dropped here so
    /// the directory index never has to reason about them.
    pub fn list_keys(&self, prefix: &str) -> FsResult<Vec<FileInfo>> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.with_retry(|| self.list_keys_page(prefix, cursor.as_deref()))?;
            let page_had_entries = !page.files.is_empty();
            for wire in page.files {
                let info: FileInfo = wire.into();
                if info.action == FileAction::Upload {
                    results.push(info);
                }
            }
            match page.next_file_name {
                Some(next) if page_had_entries && next.starts_with(prefix) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(results)
    }

    fn list_keys_page(&self, prefix: &str, cursor: Option<&str>) -> FsResult<ListFileNamesResponse> {
        let body = ListFileNamesRequest {
            bucket_id: &self.bucket_id,
            start_file_name: cursor,
            prefix,
            max_file_count: MAX_FILE_COUNT,
        };
        let response = self
            .http
            .post(self.api_url("b2_list_file_names"))
            .bearer_auth(self.auth_token())
            .json(&body)
            .send()
            .map_err(|e| classify_reqwest_error(&e))?;

        let response = check_status(response)?;
        response
            .json()
            .map_err(|e| FsError::RemoteFatal(e.to_string()))
    }

    /// Fetches the full `FileInfo` (including SHA-1) for a single file id.
    pub fn get_info(&self, id: &str) -> FsResult<FileInfo> {
        self.with_retry(|| {
            let body = GetFileInfoRequest { file_id: id };
            let response = self
                .http
                .post(self.api_url("b2_get_file_info"))
                .bearer_auth(self.auth_token())
                .json(&body)
                .send()
                .map_err(|e| classify_reqwest_error(&e))?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(FsError::NotFound);
            }
            let response = check_status(response)?;
            let wire: FileVersionWire = response
                .json()
                .map_err(|e| FsError::RemoteFatal(e.to_string()))?;
            Ok(wire.into())
        })
    }

    /// Downloads the full content, or a byte range `[lo, hi]` inclusive, of
    /// a file by id.
    pub fn download(&self, id: &str, range: Option<(u64, u64)>) -> FsResult<Vec<u8>> {
        self.with_retry(|| {
            let download_url = {
                let session = self.session.read().expect("session lock poisoned");
                format!("{}/b2api/v2/b2_download_file_by_id?fileId={}", session.download_url, id)
            };
            let mut request = self.http.get(&download_url).bearer_auth(self.auth_token());
            if let Some((lo, hi)) = range {
                request = request.header("Range", format!("bytes={lo}-{hi}"));
            }
            let response = request.send().map_err(|e| classify_reqwest_error(&e))?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(FsError::NotFound);
            }
            let response = check_status(response)?;
            let bytes = response.bytes().map_err(|e| classify_reqwest_error(&e))?;
            Ok(bytes.to_vec())
        })
    }

    fn get_upload_url(&self) -> FsResult<GetUploadUrlResponse> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            #[serde(rename = "bucketId")]
            bucket_id: &'a str,
        }
        let response = self
            .http
            .post(self.api_url("b2_get_upload_url"))
            .bearer_auth(self.auth_token())
            .json(&Req { bucket_id: &self.bucket_id })
            .send()
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = check_status(response)?;
        response.json().map_err(|e| FsError::RemoteFatal(e.to_string()))
    }

    /// Uploads `bytes` as a new version of `key`. Computes SHA-1 locally and
    /// sends it as `X-Bz-Content-Sha1`; retries once against a freshly
    /// fetched upload URL if the current one is rejected as invalid.
    pub fn upload(&self, key: &str, bytes: &[u8]) -> FsResult<FileInfo> {
        {
            let needs_url = self.session.read().expect("session lock poisoned").upload_url.is_empty();
            if needs_url {
                self.refresh_upload_url()?;
            }
        }

        match self.upload_once(key, bytes) {
            Ok(info) => Ok(info),
            Err(FsError::RemoteFatal(msg)) if msg.contains("401") || msg.contains("expired") => {
                tracing::warn!("upload token invalid, re-acquiring and retrying once");
                self.refresh_upload_url()?;
                self.upload_once(key, bytes)
            }
            Err(other) => Err(other),
        }
    }

    fn refresh_upload_url(&self) -> FsResult<()> {
        let upload_info = self.get_upload_url()?;
        let mut session = self.session.write().expect("session lock poisoned");
        session.upload_url = upload_info.upload_url;
        session.upload_auth_token = upload_info.authorization_token;
        Ok(())
    }

    fn upload_once(&self, key: &str, bytes: &[u8]) -> FsResult<FileInfo> {
        let (upload_url, upload_token) = {
            let session = self.session.read().expect("session lock poisoned");
            (session.upload_url.clone(), session.upload_auth_token.clone())
        };

        let sha1_hex = hex::encode(Sha1::digest(bytes));
        let encoded_name = utf8_percent_encode(key, FILE_NAME_ENCODE_SET).to_string();

        let response = self
            .http
            .post(&upload_url)
            .header("Authorization", upload_token)
            .header("X-Bz-File-Name", encoded_name)
            .header("Content-Type", "b2/x-auto")
            .header("X-Bz-Content-Sha1", sha1_hex)
            .header("Content-Length", bytes.len().to_string())
            .body(bytes.to_vec())
            .send()
            .map_err(|e| classify_reqwest_error(&e))?;

        let response = check_status(response)?;
        let wire: FileVersionWire = response
            .json()
            .map_err(|e| FsError::UploadFailed(e.to_string()))?;
        Ok(wire.into())
    }

    /// Deletes one specific version of a key. A 404 is treated as success —
    /// the end state the caller wants (version gone) already holds.
    pub fn delete_version(&self, id: &str, key: &str) -> FsResult<()> {
        self.with_retry(|| {
            let body = DeleteFileVersionRequest { file_name: key, file_id: id };
            let response = self
                .http
                .post(self.api_url("b2_delete_file_version"))
                .bearer_auth(self.auth_token())
                .json(&body)
                .send()
                .map_err(|e| classify_reqwest_error(&e))?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(());
            }
            check_status(response)?;
            Ok(())
        })
    }
}
