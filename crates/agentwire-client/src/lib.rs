//! Caller side of the agentwire protocol.
//!
//! [`AgentClient`] sends requests through an [`AgentTransport`] and turns the
//! agent's asynchronous task protocol into plain `Result` returning calls.

pub mod client;
pub mod error;
pub mod retry;
pub mod transport;

pub use client::{AgentClient, BlobRef};
pub use error::{ClientError, TransportError};
pub use retry::{Attempt, AttemptRetryStrategy, ErrorTolerance, Retryable, UnlimitedRetryStrategy};
pub use transport::AgentTransport;
