//! Agent side of the agentwire protocol.
//!
//! Dispatches inbound requests to actions, runs asynchronous work as tracked
//! tasks, journals persistent tasks so they resume after a restart, and
//! converges DNS records from versioned blobs.

pub mod action;
pub mod dispatcher;
pub mod dns;
pub mod error;
pub mod task;
pub mod types;

pub use action::{Action, ActionContext, ActionRegistry, SyncDnsAction};
pub use dispatcher::ActionDispatcher;
pub use dns::{BlobStore, DnsRecords, HostsFileWriter, LocalBlobstore, RecordsWriter};
pub use error::{ActionError, BlobstoreError, DnsError, TaskError};
pub use task::{Task, TaskManager, TaskService};
pub use types::{TaskInfo, TaskSnapshot, TaskState};
