//! Object storage for repacked tarballs
//!
//! [`ObjectStorage`] is the seam; [`HttpObjectStorage`] speaks plain
//! S3-style `HEAD`/`GET`/`PUT` on `{url}/{bucket}/{key}`.

use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::StorageError;

/// Tarball store keyed by deterministic file names
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Bucket the store reads and writes
    fn bucket(&self) -> &str;

    /// Check that `key` exists
    async fn get_file(&self, key: &str) -> Result<(), StorageError>;

    /// Download `key` to `dest`
    async fn download(&self, key: &str, dest: &Path) -> Result<(), StorageError>;

    /// Upload `local` as `key`, returning the object URL
    async fn upload(&self, local: &Path, key: &str) -> Result<String, StorageError>;
}

/// Percent-encode everything but `A-Z a-z 0-9 - _ . ! ~ * ' ( )`
pub fn encode_uri_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&byte) {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// S3-compatible HTTP object storage
#[derive(Debug, Clone)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    url: String,
    bucket: String,
}

impl HttpObjectStorage {
    /// Create a store for `bucket` at the given endpoint
    pub fn new(url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .connect_timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url: url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }

    /// URL of an object; the key is encoded once more so it is stored verbatim
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.url, self.bucket, encode_uri_component(key))
    }

    fn network(key: &str, error: impl ToString) -> StorageError {
        StorageError::Network {
            key: key.to_string(),
            error: error.to_string(),
        }
    }

    fn check_status(&self, key: &str, response: &reqwest::Response) -> Result<(), StorageError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                bucket: self.bucket.clone(),
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(Self::network(key, format!("HTTP {status}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get_file(&self, key: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .head(self.object_url(key))
            .send()
            .await
            .map_err(|e| Self::network(key, e))?;
        self.check_status(key, &response)
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<(), StorageError> {
        let io_error = |e: std::io::Error| StorageError::Io {
            path: dest.to_path_buf(),
            error: e.to_string(),
        };

        let response = self
            .client
            .get(self.object_url(key))
            .send()
            .await
            .map_err(|e| Self::network(key, e))?;
        self.check_status(key, &response)?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = tokio::fs::File::create(dest).await.map_err(io_error)?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::network(key, e))?;
            file.write_all(&chunk).await.map_err(io_error)?;
        }
        file.flush().await.map_err(io_error)?;

        Ok(())
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<String, StorageError> {
        let io_error = |e: std::io::Error| StorageError::Io {
            path: local.to_path_buf(),
            error: e.to_string(),
        };

        let (checksum, size) = sha256_file(local).await.map_err(io_error)?;
        let file = tokio::fs::File::open(local).await.map_err(io_error)?;
        let body = reqwest::Body::wrap_stream(tokio_util::io::ReaderStream::new(file));
        let url = self.object_url(key);

        let response = self
            .client
            .put(&url)
            .header("x-amz-content-sha256", checksum)
            .header(reqwest::header::CONTENT_LENGTH, size)
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(body)
            .send()
            .await
            .map_err(|e| Self::network(key, e))?;
        self.check_status(key, &response)?;

        Ok(url)
    }
}

/// Hex SHA-256 and size of a file
async fn sha256_file(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    let mut size = 0u64;

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        size += n as u64;
    }

    Ok((hex::encode(hasher.finalize()), size))
}
