use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncSeek};

use crate::error::{StorageError, StorageResult};
use crate::pipe::{self, Pipe};
use crate::sniff;

/// Readable, seekable upload source.
pub trait ByteSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> ByteSource for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

/// Destination and encoding for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Container the object is written into.
    pub bucket: String,
    /// Object key within the bucket.
    pub key: String,
    /// Explicit content type; sniffed from the source when absent.
    pub content_type: Option<String>,
    /// Gzip the object while streaming it.
    pub compress: bool,
}

impl UploadOptions {
    /// Options for `bucket`/`key` with a sniffed type and no compression.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            content_type: None,
            compress: false,
        }
    }

    /// Override the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Enable or disable gzip compression.
    #[must_use]
    pub const fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub(crate) fn validate(&self) -> StorageResult<()> {
        validate_segment("bucket", &self.bucket, false)?;
        validate_segment("key", &self.key, true)
    }
}

/// Where an object ended up, as confirmed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutput {
    /// Container holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Stored size in bytes.
    pub size_bytes: u64,
    /// Content type recorded with the object.
    pub content_type: String,
    /// Whether the stored bytes are gzip-encoded.
    pub compressed: bool,
}

/// Object storage capable of streaming uploads.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stream `source` into the object described by `options`.
    async fn upload(
        &self,
        source: Box<dyn ByteSource>,
        options: &UploadOptions,
    ) -> StorageResult<UploadOutput>;
}

/// Resolve the content type, then start streaming the source.
pub(crate) async fn prepare(
    mut source: Box<dyn ByteSource>,
    options: &UploadOptions,
) -> StorageResult<(String, Pipe)> {
    options.validate()?;
    let content_type = match &options.content_type {
        Some(explicit) => explicit.clone(),
        None => sniff::detect(&mut source)
            .await
            .map_err(|source| StorageError::io("upload.sniff", None, source))?
            .to_string(),
    };
    Ok((content_type, pipe::spawn(source, options.compress)))
}

fn validate_segment(field: &'static str, value: &str, allow_nested: bool) -> StorageResult<()> {
    let invalid = |reason| StorageError::InvalidInput {
        field,
        reason,
        value: Some(value.to_string()),
    };
    if value.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.starts_with('/') || value.contains('\\') {
        return Err(invalid("must be a relative path"));
    }
    if !allow_nested && value.contains('/') {
        return Err(invalid("must not contain '/'"));
    }
    if value
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("must not contain empty or dot segments"));
    }
    Ok(())
}
