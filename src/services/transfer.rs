//! Multipart upload and streaming download on top of a `StorageClient`.
//!
//! Uploads stream each file part straight into a provider writer; nothing is
//! buffered beyond a single chunk. Limits are enforced while streaming and a
//! rejected part aborts its writer so no partial object is left behind.

use crate::{
    models::file::{FileMetadata, StoredFile},
    services::storage_client::{FileWriter, StorageClient, StorageError, WriteOptions},
};
use axum::{
    body::Body,
    extract::{Multipart, multipart::MultipartError},
    http::{HeaderMap, HeaderValue, header},
    response::Response,
};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FIELDS_SIZE: u64 = 2 * 1024 * 1024;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A file part as received, before it is given its stored name.
#[derive(Clone, Debug)]
pub struct IncomingFile {
    pub field: String,
    pub name: String,
    pub content_type: String,
}

/// Computes the stored name of an incoming file.
pub type FilenameFn = Arc<dyn Fn(&IncomingFile) -> String + Send + Sync>;

/// What to do when an upload would reuse an existing name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NameConflict {
    /// Replace the base name with a UUID, keeping the extension.
    MakeUnique,
    Overwrite,
}

impl FromStr for NameConflict {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "makeUnique" | "make-unique" | "make_unique" => Ok(Self::MakeUnique),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("unknown name conflict policy `{}`", other)),
        }
    }
}

#[derive(Clone, Default)]
pub struct UploadOptions {
    pub container: Option<String>,
    pub get_filename: Option<FilenameFn>,
    pub acl: Option<String>,
    pub allowed_content_types: Option<Vec<String>>,
    pub max_file_size: Option<u64>,
    pub max_fields_size: Option<u64>,
    pub name_conflict: Option<NameConflict>,
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("container", &self.container)
            .field("get_filename", &self.get_filename.is_some())
            .field("acl", &self.acl)
            .field("allowed_content_types", &self.allowed_content_types)
            .field("max_file_size", &self.max_file_size)
            .field("max_fields_size", &self.max_fields_size)
            .field("name_conflict", &self.name_conflict)
            .finish()
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub container: String,
    pub name: String,
    pub original_filename: String,
    pub field: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    /// MD5 of the received bytes.
    pub etag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acl: Option<String>,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct UploadResult {
    pub files: BTreeMap<String, Vec<UploadedFile>>,
    pub fields: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("no container configured for upload")]
    MissingContainer,
    #[error("invalid file name `{0}`")]
    InvalidFileName(String),
    #[error("field `{0}` is not valid UTF-8")]
    InvalidFieldEncoding(String),
    #[error(
        "contentType \"{content_type}\" is not allowed (must be in [{}])",
        .allowed.join(", ")
    )]
    ContentTypeNotAllowed {
        content_type: String,
        allowed: Vec<String>,
    },
    #[error("maxFileSize exceeded, received more than {limit} bytes of file data")]
    FileTooLarge { limit: u64 },
    #[error("maxFieldsSize exceeded, received more than {limit} bytes of field data")]
    FieldsTooLarge { limit: u64 },
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Store every file part of `multipart` and collect the text fields.
pub async fn upload(
    client: &dyn StorageClient,
    mut multipart: Multipart,
    options: &UploadOptions,
) -> Result<UploadResult, TransferError> {
    let container = options
        .container
        .as_deref()
        .ok_or(TransferError::MissingContainer)?;
    let max_file_size = options.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE);
    let max_fields_size = options.max_fields_size.unwrap_or(DEFAULT_MAX_FIELDS_SIZE);

    let mut result = UploadResult::default();
    let mut fields_size: u64 = 0;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();

        let Some(original) = field.file_name().map(str::to_string) else {
            let value =
                read_text_field(field, &field_name, &mut fields_size, max_fields_size).await?;
            result.fields.entry(field_name).or_default().push(value);
            continue;
        };
        if original.is_empty() {
            debug!(field = %field_name, "skipping file part without a name");
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        check_content_type(&content_type, options.allowed_content_types.as_deref())?;

        let incoming = IncomingFile {
            field: field_name.clone(),
            name: resolve_conflict(base_name(&original)?, options.name_conflict),
            content_type: content_type.clone(),
        };
        let name = match &options.get_filename {
            Some(get_filename) => get_filename(&incoming),
            None => incoming.name.clone(),
        };

        let write_options = WriteOptions {
            content_type: Some(content_type.clone()),
            acl: options.acl.clone(),
        };
        let (stored, etag) =
            store_stream(client, container, &name, &write_options, max_file_size, field).await?;

        info!(container, name = %name, size = stored.size(), "stored upload");
        result
            .files
            .entry(field_name.clone())
            .or_default()
            .push(UploadedFile {
                container: container.to_string(),
                name,
                original_filename: original,
                field: field_name,
                content_type,
                size: stored.size(),
                etag,
                acl: options.acl.clone(),
            });
    }

    Ok(result)
}

/// Stream `body` into `container/name`, enforcing `max_size`.
///
/// Returns the stored file and the MD5 of the bytes written.
pub async fn store_stream<S, E>(
    client: &dyn StorageClient,
    container: &str,
    name: &str,
    options: &WriteOptions,
    max_size: u64,
    body: S,
) -> Result<(StoredFile, String), TransferError>
where
    S: Stream<Item = Result<Bytes, E>>,
    TransferError: From<E>,
{
    let mut writer = client.writer(container, name, options).await?;
    let mut size: u64 = 0;
    let mut digest = Context::new();

    pin_mut!(body);
    while let Some(chunk_res) = body.next().await {
        let chunk = match chunk_res {
            Ok(chunk) => chunk,
            Err(err) => {
                discard(writer, name).await;
                return Err(err.into());
            }
        };
        size += chunk.len() as u64;
        if size > max_size {
            discard(writer, name).await;
            return Err(TransferError::FileTooLarge { limit: max_size });
        }
        digest.consume(&chunk);
        let written = writer.write(chunk).await;
        if let Err(err) = written {
            discard(writer, name).await;
            return Err(err.into());
        }
    }

    let stored = writer.close().await?;
    Ok((stored, format!("{:x}", digest.compute())))
}

/// Read a text part chunk by chunk, charging every byte to the shared fields
/// budget so an oversized part fails before it is buffered.
async fn read_text_field<S, E>(
    body: S,
    name: &str,
    fields_size: &mut u64,
    limit: u64,
) -> Result<String, TransferError>
where
    S: Stream<Item = Result<Bytes, E>>,
    TransferError: From<E>,
{
    pin_mut!(body);
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        *fields_size += chunk.len() as u64;
        if *fields_size > limit {
            return Err(TransferError::FieldsTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf).map_err(|_| TransferError::InvalidFieldEncoding(name.to_string()))
}

async fn discard(writer: Box<dyn FileWriter>, name: &str) {
    if let Err(err) = writer.abort().await {
        warn!(name, "failed to abort upload: {}", err);
    }
}

/// Stream `container/path` back as an HTTP response.
pub async fn download(
    client: &dyn StorageClient,
    container: &str,
    path: &str,
) -> Result<Response, TransferError> {
    let (file, stream) = client.read(container, path).await?;
    let mut response = Response::new(Body::from_stream(stream));
    set_file_headers(response.headers_mut(), file.metadata());
    Ok(response)
}

fn set_file_headers(headers: &mut HeaderMap, meta: &FileMetadata) {
    let content_type = meta.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));

    if let Some(etag) = meta.etag.as_ref() {
        let quoted = format!("\"{}\"", etag.trim_matches('"'));
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }
    if let Some(modified) = meta.last_modified {
        let http_date = modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&http_date) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
}

fn check_content_type(content_type: &str, allowed: Option<&[String]>) -> Result<(), TransferError> {
    match allowed {
        Some(allowed)
            if !allowed
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(content_type)) =>
        {
            Err(TransferError::ContentTypeNotAllowed {
                content_type: content_type.to_string(),
                allowed: allowed.to_vec(),
            })
        }
        _ => Ok(()),
    }
}

/// Last path component of a client-supplied file name.
fn base_name(name: &str) -> Result<&str, TransferError> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if base.is_empty() || base == "." || base == ".." || base.bytes().any(|b| b.is_ascii_control())
    {
        return Err(TransferError::InvalidFileName(name.to_string()));
    }
    Ok(base)
}

fn resolve_conflict(name: &str, policy: Option<NameConflict>) -> String {
    match policy {
        Some(NameConflict::MakeUnique) => {
            let ext = match name.rfind('.') {
                Some(pos) if pos > 0 => &name[pos..],
                _ => "",
            };
            format!("{}{}", Uuid::new_v4(), ext)
        }
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{opendal_client::OpendalClient, storage_client::ListOptions};
    use chrono::{TimeZone, Utc};
    use futures::stream;
    use opendal::{Operator, services::Fs};
    use std::io;
    use tempfile::TempDir;

    fn fs_client(dir: &TempDir) -> OpendalClient {
        let operator = Operator::new(Fs::default().root(dir.path().to_str().unwrap()))
            .unwrap()
            .finish();
        OpendalClient::new("filesystem", operator)
    }

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, StorageError>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(*p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn store_stream_writes_and_hashes() {
        let dir = TempDir::new().unwrap();
        let client = fs_client(&dir);

        let (stored, etag) = store_stream(
            &client,
            "uploads",
            "9/a.txt",
            &WriteOptions::default(),
            100,
            chunks(&[b"hello ", b"world"]),
        )
        .await
        .unwrap();

        assert_eq!(stored.size(), 11);
        assert_eq!(etag, format!("{:x}", md5::compute(b"hello world")));
    }

    #[tokio::test]
    async fn store_stream_aborts_over_limit() {
        let dir = TempDir::new().unwrap();
        let client = fs_client(&dir);

        let err = store_stream(
            &client,
            "uploads",
            "9/big.bin",
            &WriteOptions::default(),
            4,
            chunks(&[b"abc", b"def"]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::FileTooLarge { limit: 4 }));
        let files = client
            .get_files("uploads", &ListOptions::with_prefix("9/"))
            .await
            .unwrap();
        assert!(files.iter().all(|f| f.size() == 0));
    }

    #[tokio::test]
    async fn store_stream_propagates_body_errors() {
        let dir = TempDir::new().unwrap();
        let client = fs_client(&dir);
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(StorageError::Io(io::Error::other("connection reset"))),
        ]);

        let err = store_stream(
            &client,
            "uploads",
            "9/broken.bin",
            &WriteOptions::default(),
            100,
            body,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Storage(StorageError::Io(_))));
    }

    #[tokio::test]
    async fn text_fields_share_one_budget() {
        let mut used = 0;
        let first = read_text_field(chunks(&[b"abc", b"de"]), "a", &mut used, 8)
            .await
            .unwrap();
        assert_eq!(first, "abcde");
        assert_eq!(used, 5);

        let err = read_text_field(chunks(&[b"fgh", b"i"]), "b", &mut used, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::FieldsTooLarge { limit: 8 }));
    }

    #[tokio::test]
    async fn endless_text_field_stops_at_the_limit() {
        let body = stream::repeat(Bytes::from_static(b"xxxx")).map(Ok::<_, StorageError>);
        let mut used = 0;
        let err = read_text_field(body, "caption", &mut used, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::FieldsTooLarge { limit: 8 }));
        assert_eq!(used, 12);
    }

    #[tokio::test]
    async fn text_field_must_be_utf8() {
        let mut used = 0;
        let err = read_text_field(chunks(&[b"\xff\xfe"]), "bio", &mut used, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidFieldEncoding(ref name) if name == "bio"));
    }

    #[test]
    fn download_headers_describe_the_file() {
        let meta = FileMetadata {
            container: "uploads".into(),
            name: "9/a.png".into(),
            size: 2048,
            content_type: Some("image/png".into()),
            etag: Some("5d41402abc4b2a76b9719d911017c592".into()),
            last_modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single(),
        };
        let mut headers = HeaderMap::new();
        set_file_headers(&mut headers, &meta);

        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(headers[header::CONTENT_LENGTH], "2048");
        assert_eq!(headers[header::ETAG], "\"5d41402abc4b2a76b9719d911017c592\"");
        assert_eq!(headers[header::LAST_MODIFIED], "Wed, 01 May 2024 12:00:00 GMT");

        let bare = FileMetadata {
            content_type: None,
            etag: Some("\"already-quoted\"".into()),
            last_modified: None,
            ..meta
        };
        let mut headers = HeaderMap::new();
        set_file_headers(&mut headers, &bare);
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(headers[header::ETAG], "\"already-quoted\"");
        assert!(!headers.contains_key(header::LAST_MODIFIED));
    }

    #[test]
    fn content_type_allowlist() {
        let allowed = vec!["image/png".to_string(), "image/jpeg".to_string()];
        assert!(check_content_type("image/PNG", Some(&allowed)).is_ok());
        assert!(check_content_type("text/plain", None).is_ok());
        let err = check_content_type("text/plain", Some(&allowed)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "contentType \"text/plain\" is not allowed (must be in [image/png, image/jpeg])"
        );
    }

    #[test]
    fn base_name_strips_client_paths() {
        assert_eq!(base_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(base_name("C:\\docs\\cv.pdf").unwrap(), "cv.pdf");
        assert!(base_name("uploads/..").is_err());
        assert!(base_name("dir/").is_err());
    }

    #[test]
    fn make_unique_keeps_extension() {
        let name = resolve_conflict("photo.final.jpg", Some(NameConflict::MakeUnique));
        assert!(name.ends_with(".jpg"));
        assert_ne!(name, "photo.final.jpg");
        assert_eq!(name.len(), 36 + 4);
        assert_eq!(resolve_conflict(".env", Some(NameConflict::MakeUnique)).len(), 36);
        assert_eq!(resolve_conflict("a.txt", Some(NameConflict::Overwrite)), "a.txt");
        assert_eq!(resolve_conflict("a.txt", None), "a.txt");
    }

    #[test]
    fn parses_name_conflict() {
        assert_eq!(
            "makeUnique".parse::<NameConflict>(),
            Ok(NameConflict::MakeUnique)
        );
        assert_eq!(
            "overwrite".parse::<NameConflict>(),
            Ok(NameConflict::Overwrite)
        );
        assert!("rename".parse::<NameConflict>().is_err());
    }
}
