//! Error types for the agent side of the protocol.
//!
//! Every error that reaches the wire is flattened to its `Display` output in
//! an `{"exception": {"message": ...}}` response.

use crate::types::TaskState;
use agentwire_core::error::AgentError;

/// Errors from resolving or running an action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// No action is registered for the method. Never retried.
    #[error("unknown message {0}")]
    UnknownMethod(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
    #[error("Action does not support {0}")]
    NotSupported(&'static str),
    #[error("Action was cancelled")]
    Cancelled,
    /// A persistent action could not be journaled, so it was never started.
    #[error("Action Failed {method}: {source}")]
    Registration {
        method: String,
        #[source]
        source: TaskError,
    },
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Dns(#[from] DnsError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Errors from task lifecycle management and the persistent registry.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task with id {0} could not be found")]
    NotFound(String),
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidTransition(TaskState, TaskState),
    #[error("Task {0} was already started")]
    AlreadyStarted(String),
    #[error("Storage error: {0}")]
    Storage(#[from] AgentError),
}

/// Errors from the blob store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum BlobstoreError {
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Unsupported digest: {0}")]
    UnsupportedDigest(String),
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from DNS record convergence. None of them advance the recorded
/// version.
#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("Getting {blob_id} dns record from blobstore: {source}")]
    Fetch {
        blob_id: String,
        #[source]
        source: BlobstoreError,
    },
    #[error("Reading {blob_id} from blobstore: {message}")]
    Read { blob_id: String, message: String },
    #[error("Unmarshalling DNS records: {0}")]
    Parse(String),
    #[error("Version from unpacked dns blob ({actual}) does not match version supplied by director ({expected})")]
    VersionMismatch { expected: u64, actual: u64 },
    #[error("Saving DNS records: {0}")]
    Apply(String),
    #[error("Saving sync dns state: {0}")]
    Persist(String),
}
