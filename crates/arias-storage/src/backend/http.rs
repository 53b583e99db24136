use async_trait::async_trait;
use reqwest::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use reqwest::{Body, Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{StorageError, StorageResult};
use crate::pipe::Pipe;
use crate::service::{self, ByteSource, Storage, UploadOptions, UploadOutput};

/// Object store reached over HTTP: objects live at
/// `{endpoint}/{bucket}/{key}`, are written with a streamed `PUT`, and are
/// confirmed with `HEAD`.
#[derive(Debug, Clone)]
pub struct HttpObjectStorage {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpObjectStorage {
    /// Store objects under `endpoint`, authenticating with `token` as a bearer
    /// credential when provided.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] if `endpoint` is not an absolute
    /// http(s) URL.
    pub fn new(endpoint: &str, token: Option<String>) -> StorageResult<Self> {
        Self::with_client(Client::new(), endpoint, token)
    }

    /// Like [`HttpObjectStorage::new`] with a caller-configured client.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] if `endpoint` is not an absolute
    /// http(s) URL.
    pub fn with_client(client: Client, endpoint: &str, token: Option<String>) -> StorageResult<Self> {
        let invalid = |reason| StorageError::InvalidInput {
            field: "endpoint",
            reason,
            value: Some(endpoint.to_string()),
        };
        let endpoint = Url::parse(endpoint).map_err(|_| invalid("must be an absolute url"))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> StorageResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::InvalidInput {
                field: "endpoint",
                reason: "cannot be a base url",
                value: Some(self.endpoint.to_string()),
            })?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn confirm(&self, url: &Url) -> StorageResult<HeaderMap> {
        let response = self
            .authorize(self.client.head(url.clone()))
            .send()
            .await
            .map_err(|source| StorageError::request("http.head", url.as_str(), source))?;
        ensure_success("http.head", url, response.status())?;
        Ok(response.headers().clone())
    }
}

#[async_trait]
impl Storage for HttpObjectStorage {
    #[instrument(name = "storage.http.upload", skip(self, source), fields(bucket = %options.bucket, key = %options.key))]
    async fn upload(
        &self,
        source: Box<dyn ByteSource>,
        options: &UploadOptions,
    ) -> StorageResult<UploadOutput> {
        let url = self.object_url(&options.bucket, &options.key)?;
        let (content_type, Pipe { stream, producer }) = service::prepare(source, options).await?;

        let mut request = self
            .authorize(self.client.put(url.clone()))
            .header(CONTENT_TYPE, &content_type)
            .body(Body::wrap_stream(stream));
        if options.compress {
            request = request.header(CONTENT_ENCODING, "gzip");
        }

        let sent = request
            .send()
            .await
            .map_err(|source| StorageError::request("http.put", url.as_str(), source));
        let summary = producer.join().await;
        let response = sent?;
        ensure_success("http.put", &url, response.status())?;
        let summary = summary?;

        let headers = self.confirm(&url).await?;
        let size_bytes = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(summary.written);
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or(content_type, str::to_string);

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

fn ensure_success(operation: &'static str, url: &Url, status: StatusCode) -> StorageResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(StorageError::Rejected {
            operation,
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method;
    use httpmock::prelude::*;
    use std::io::Cursor;

    #[test]
    fn object_urls_nest_bucket_and_key() -> anyhow::Result<()> {
        let storage = HttpObjectStorage::new("http://store.local/objects/", None)?;
        assert_eq!(
            storage.object_url("media", "clips/a b.mp4")?.as_str(),
            "http://store.local/objects/media/clips/a%20b.mp4"
        );
        assert!(HttpObjectStorage::new("ftp://store.local", None).is_err());
        assert!(HttpObjectStorage::new("not a url", None).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn upload_streams_put_then_confirms_with_head() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/media/a.bin")
                    .header("content-type", "application/pdf")
                    .header("authorization", "Bearer s3cret")
                    .body("%PDF-1.7 payload");
                then.status(200);
            })
            .await;
        let head = server
            .mock_async(|when, then| {
                when.method(Method::HEAD).path("/media/a.bin");
                then.status(200).header("content-type", "application/pdf");
            })
            .await;

        let storage = HttpObjectStorage::new(&server.base_url(), Some("s3cret".to_string()))?;
        let output = storage
            .upload(
                Box::new(Cursor::new(b"%PDF-1.7 payload".to_vec())),
                &UploadOptions::new("media", "a.bin"),
            )
            .await?;

        put.assert_async().await;
        head.assert_async().await;
        assert_eq!(output.bucket, "media");
        assert_eq!(output.key, "a.bin");
        assert_eq!(output.content_type, "application/pdf");
        assert!(!output.compressed);
        Ok(())
    }

    #[tokio::test]
    async fn compressed_upload_declares_gzip_encoding() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/logs/app.log")
                    .header("content-encoding", "gzip");
                then.status(201);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(Method::HEAD).path("/logs/app.log");
                then.status(200);
            })
            .await;

        let storage = HttpObjectStorage::new(&server.base_url(), None)?;
        let output = storage
            .upload(
                Box::new(Cursor::new(b"hello hello hello".to_vec())),
                &UploadOptions::new("logs", "app.log").with_compression(true),
            )
            .await?;
        put.assert_async().await;
        assert!(output.compressed);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_put_surfaces_status() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/media/a.bin");
                then.status(403);
            })
            .await;

        let storage = HttpObjectStorage::new(&server.base_url(), None)?;
        let result = storage
            .upload(
                Box::new(Cursor::new(b"data".to_vec())),
                &UploadOptions::new("media", "a.bin"),
            )
            .await;
        assert!(matches!(
            result,
            Err(StorageError::Rejected {
                operation: "http.put",
                status: 403,
                ..
            })
        ));
        Ok(())
    }
}
