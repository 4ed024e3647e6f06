//! Versioned convergence of DNS records.
//!
//! A record set arrives as a content-addressed blob tagged with a version.
//! Stale or duplicate deliveries are no-ops, concurrent calls never
//! interleave an apply, and the recorded version only moves after both the
//! apply and the state write succeeded.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use agentwire_core::fs::FileSystem;
use agentwire_core::types::ProtocolVersion;
use async_trait::async_trait;
use serde_json::Value;

use crate::action::{argument, Action};
use crate::dns::{BlobStore, DnsRecords, RecordedVersion, RecordsWriter};
use crate::error::{ActionError, DnsError};

const SYNCED: &str = "synced";

/// Shared by every `sync_dns` request so the apply lock is process-wide.
pub struct SyncDnsAction {
    blobstore: Arc<dyn BlobStore>,
    writer: Arc<dyn RecordsWriter>,
    fs: Arc<dyn FileSystem>,
    state_path: PathBuf,
    lock: Mutex<()>,
}

impl SyncDnsAction {
    pub fn new(
        blobstore: Arc<dyn BlobStore>,
        writer: Arc<dyn RecordsWriter>,
        fs: Arc<dyn FileSystem>,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            blobstore,
            writer,
            fs,
            state_path: state_path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Converge on record set `version` stored as `blob_id`.
    ///
    /// Blob fetch failures are returned immediately; the caller re-sends the
    /// sync periodically.
    pub async fn sync(&self, blob_id: &str, digest: &str, version: u64) -> Result<Value, DnsError> {
        if self.is_local_version_at_least(version) {
            tracing::debug!(version, "DNS records already synced");
            return Ok(Value::from(SYNCED));
        }

        let path = self
            .blobstore
            .get(blob_id, digest)
            .await
            .map_err(|source| DnsError::Fetch {
                blob_id: blob_id.to_string(),
                source,
            })?;

        let result = self.apply_fetched(blob_id, &path, version);

        if let Err(e) = self.fs.remove_all(&path) {
            tracing::error!(path = %path.display(), error = %e, "Failed to remove dns blob");
        }
        result
    }

    fn apply_fetched(&self, blob_id: &str, path: &Path, version: u64) -> Result<Value, DnsError> {
        let contents = self.fs.read_file(path).map_err(|e| DnsError::Read {
            blob_id: blob_id.to_string(),
            message: e.to_string(),
        })?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        // A concurrent caller may have applied this version while we fetched.
        if self.is_local_version_at_least(version) {
            return Ok(Value::from(SYNCED));
        }

        let records: DnsRecords =
            serde_json::from_slice(&contents).map_err(|e| DnsError::Parse(e.to_string()))?;
        if records.version != version {
            return Err(DnsError::VersionMismatch {
                expected: version,
                actual: records.version,
            });
        }

        self.writer.save_records(&records).map_err(DnsError::Apply)?;
        self.fs
            .write_file(&self.state_path, &contents)
            .map_err(|e| DnsError::Persist(e.to_string()))?;

        tracing::info!(version, records = records.records.len(), "DNS records synced");
        Ok(Value::from(SYNCED))
    }

    /// Version of the last applied blob, if any.
    pub fn local_version(&self) -> Option<u64> {
        if !self.fs.exists(&self.state_path) {
            return None;
        }
        let parsed = self
            .fs
            .read_file(&self.state_path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<RecordedVersion>(&bytes).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(state) => Some(state.version),
            Err(e) => {
                tracing::warn!(path = %self.state_path.display(), error = %e, "Unreadable dns state, treating as unsynced");
                None
            }
        }
    }

    fn is_local_version_at_least(&self, version: u64) -> bool {
        self.local_version().is_some_and(|local| local >= version)
    }
}

#[async_trait]
impl Action for SyncDnsAction {
    fn is_asynchronous(&self, _version: ProtocolVersion) -> bool {
        false
    }

    fn is_persistent(&self) -> bool {
        false
    }

    async fn run(&self, args: &[Value]) -> Result<Value, ActionError> {
        let blob_id: String = argument(args, 0, "blob_id")?;
        let digest: String = argument(args, 1, "digest")?;
        let version: u64 = argument(args, 2, "version")?;
        Ok(self.sync(&blob_id, &digest, version).await?)
    }
}
