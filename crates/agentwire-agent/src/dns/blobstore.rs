//! Content-addressed blob access.

use std::path::PathBuf;

use async_trait::async_trait;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::BlobstoreError;

/// Fetches a blob into a local temporary file the caller must delete.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, blob_id: &str, digest: &str) -> Result<PathBuf, BlobstoreError>;
}

/// Blob store backed by a local directory of `<blob_id>` files.
pub struct LocalBlobstore {
    blobs_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl LocalBlobstore {
    pub fn new(blobs_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            blobs_dir: blobs_dir.into(),
            tmp_dir: tmp_dir.into(),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobstore {
    async fn get(&self, blob_id: &str, digest: &str) -> Result<PathBuf, BlobstoreError> {
        if blob_id.is_empty() || blob_id.contains('/') || blob_id.contains("..") {
            return Err(BlobstoreError::NotFound(blob_id.to_string()));
        }
        let expected = ExpectedDigest::parse(digest)?;

        let source = self.blobs_dir.join(blob_id);
        let contents = match tokio::fs::read(&source).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobstoreError::NotFound(blob_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let actual = expected.algorithm.hex_digest(&contents);
        if actual != expected.hex {
            let name = expected.algorithm.name();
            return Err(BlobstoreError::DigestMismatch {
                expected: format!("{}:{}", name, expected.hex),
                actual: format!("{}:{}", name, actual),
            });
        }

        tokio::fs::create_dir_all(&self.tmp_dir).await?;
        let target = self.tmp_dir.join(format!("blob-{}", Uuid::new_v4()));
        tokio::fs::write(&target, &contents).await?;
        tracing::debug!(blob_id, path = %target.display(), "Blob fetched");
        Ok(target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Algorithm implied by the length of an unprefixed hex digest.
    fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    fn hex_len(self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Sha256 => 64,
        }
    }

    fn hex_digest(self, contents: &[u8]) -> String {
        match self {
            Self::Sha1 => hex::encode(Sha1::digest(contents)),
            Self::Sha256 => hex::encode(Sha256::digest(contents)),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ExpectedDigest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl ExpectedDigest {
    /// Pick the strongest supported entry out of a digest string.
    ///
    /// Accepts `sha1:<hex>`, `sha256:<hex>`, a bare 40 or 64 character hex
    /// string, or a `;`-separated list of those. Unknown algorithms in a
    /// list are skipped.
    fn parse(digest: &str) -> Result<Self, BlobstoreError> {
        let mut best: Option<Self> = None;
        for part in digest.split(';').map(str::trim) {
            let (algorithm, value) = match part.split_once(':') {
                Some((name, value)) => match DigestAlgorithm::from_name(name) {
                    Some(algorithm) => (algorithm, value),
                    None => continue,
                },
                None => match DigestAlgorithm::from_hex_len(part.len()) {
                    Some(algorithm) => (algorithm, part),
                    None => continue,
                },
            };
            if value.len() != algorithm.hex_len() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
                continue;
            }
            if best.as_ref().map_or(true, |b| algorithm > b.algorithm) {
                best = Some(Self {
                    algorithm,
                    hex: value.to_ascii_lowercase(),
                });
            }
        }
        best.ok_or_else(|| BlobstoreError::UnsupportedDigest(digest.to_string()))
    }
}
