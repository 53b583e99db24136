//! Buckets as directories under a root, objects as files.
//!
//! Objects are written to a `.part` file and renamed into place once the
//! stream ends, so readers never see a partial object. Content type and
//! encoding are recorded in a JSON sidecar under `<root>/.meta/`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::pipe::Pipe;
use crate::service::{self, ByteSource, Storage, UploadOptions, UploadOutput};

const META_DIR: &str = ".meta";
const PART_SUFFIX: &str = ".part";

/// Metadata recorded next to each stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Content type of the original bytes.
    pub content_type: String,
    /// `gzip` when the stored bytes are compressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Stored size in bytes.
    pub size_bytes: u64,
    /// Size of the source before encoding.
    pub source_bytes: u64,
}

/// Filesystem-backed object store.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Store objects beneath `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of an object on disk.
    #[must_use]
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    fn meta_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(META_DIR).join(bucket).join(key).into_os_string();
        path.push(".json");
        PathBuf::from(path)
    }

    /// Read the metadata sidecar of a stored object.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar is missing or malformed.
    pub async fn metadata(&self, bucket: &str, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.meta_path(bucket, key);
        let raw = fs::read_to_string(&path)
            .await
            .map_err(|source| StorageError::io("fs.meta.read", Some(path.clone()), source))?;
        serde_json::from_str(&raw).map_err(|source| StorageError::Metadata {
            operation: "fs.meta.parse",
            path,
            source,
        })
    }

    async fn persist_meta(&self, bucket: &str, key: &str, meta: &ObjectMeta) -> StorageResult<()> {
        let path = self.meta_path(bucket, key);
        ensure_parent(&path).await?;
        let serialised =
            serde_json::to_vec_pretty(meta).map_err(|source| StorageError::Metadata {
                operation: "fs.meta.serialize",
                path: path.clone(),
                source,
            })?;
        fs::write(&path, serialised)
            .await
            .map_err(|source| StorageError::io("fs.meta.write", Some(path), source))
    }
}

#[async_trait]
impl Storage for FsStorage {
    #[instrument(name = "storage.fs.upload", skip(self, source), fields(bucket = %options.bucket, key = %options.key))]
    async fn upload(
        &self,
        source: Box<dyn ByteSource>,
        options: &UploadOptions,
    ) -> StorageResult<UploadOutput> {
        let (content_type, Pipe { mut stream, producer }) =
            service::prepare(source, options).await?;

        let target = self.object_path(&options.bucket, &options.key);
        ensure_parent(&target).await?;
        let mut part = target.clone().into_os_string();
        part.push(PART_SUFFIX);
        let part = PathBuf::from(part);

        let written = async {
            let mut file = fs::File::create(&part)
                .await
                .map_err(|source| StorageError::io("fs.create", Some(part.clone()), source))?;
            while let Some(chunk) = stream.next().await {
                let chunk =
                    chunk.map_err(|source| StorageError::io("fs.stream", Some(part.clone()), source))?;
                file.write_all(&chunk)
                    .await
                    .map_err(|source| StorageError::io("fs.write", Some(part.clone()), source))?;
            }
            file.sync_all()
                .await
                .map_err(|source| StorageError::io("fs.sync", Some(part.clone()), source))
        }
        .await;
        drop(stream);
        let summary = producer.join().await;

        let summary = match (written, summary) {
            (Err(err), _) | (Ok(()), Err(err)) => {
                let _ = fs::remove_file(&part).await;
                return Err(err);
            }
            (Ok(()), Ok(summary)) => summary,
        };

        fs::rename(&part, &target)
            .await
            .map_err(|source| StorageError::io("fs.rename", Some(target.clone()), source))?;
        let size_bytes = fs::metadata(&target)
            .await
            .map_err(|source| StorageError::io("fs.confirm", Some(target.clone()), source))?
            .len();

        self.persist_meta(
            &options.bucket,
            &options.key,
            &ObjectMeta {
                content_type: content_type.clone(),
                content_encoding: options.compress.then(|| "gzip".to_string()),
                size_bytes,
                source_bytes: summary.read,
            },
        )
        .await?;

        debug!(size_bytes, compressed = options.compress, "object stored");
        Ok(UploadOutput {
            bucket: options.bucket.clone(),
            key: options.key.clone(),
            size_bytes,
            content_type,
            compressed: options.compress,
        })
    }
}

async fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| StorageError::io("fs.create_dir", Some(parent.to_path_buf()), source))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::{Cursor, Read};

    #[tokio::test]
    async fn plain_upload_lands_under_bucket_with_sniffed_type() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let storage = FsStorage::new(root.path());
        let output = storage
            .upload(
                Box::new(Cursor::new(b"%PDF-1.4 body".to_vec())),
                &UploadOptions::new("docs", "reports/q1.pdf"),
            )
            .await?;

        assert_eq!(output.bucket, "docs");
        assert_eq!(output.key, "reports/q1.pdf");
        assert_eq!(output.content_type, "application/pdf");
        assert_eq!(output.size_bytes, 13);
        let stored = std::fs::read(storage.object_path("docs", "reports/q1.pdf"))?;
        assert_eq!(stored, b"%PDF-1.4 body");

        let meta = storage.metadata("docs", "reports/q1.pdf").await?;
        assert_eq!(meta.content_type, "application/pdf");
        assert_eq!(meta.content_encoding, None);
        assert!(!root.path().join("docs/reports/q1.pdf.part").exists());
        Ok(())
    }

    #[tokio::test]
    async fn compressed_upload_is_gzip_and_keeps_override() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let storage = FsStorage::new(root.path());
        let body = "line of text\n".repeat(1_000);
        let output = storage
            .upload(
                Box::new(Cursor::new(body.clone().into_bytes())),
                &UploadOptions::new("logs", "app.log")
                    .with_content_type("text/x-log")
                    .with_compression(true),
            )
            .await?;

        assert!(output.compressed);
        assert_eq!(output.content_type, "text/x-log");
        let stored = std::fs::read(storage.object_path("logs", "app.log"))?;
        assert_eq!(output.size_bytes, stored.len() as u64);
        assert!(stored.len() < body.len());

        let mut decoded = String::new();
        GzDecoder::new(stored.as_slice()).read_to_string(&mut decoded)?;
        assert_eq!(decoded, body);

        let meta = storage.metadata("logs", "app.log").await?;
        assert_eq!(meta.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(meta.source_bytes, body.len() as u64);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_key_is_rejected_before_writing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let storage = FsStorage::new(root.path());
        let result = storage
            .upload(
                Box::new(Cursor::new(Vec::new())),
                &UploadOptions::new("b", "../outside"),
            )
            .await;
        assert!(matches!(result, Err(StorageError::InvalidInput { field: "key", .. })));
        assert!(std::fs::read_dir(root.path())?.next().is_none());
        Ok(())
    }
}
