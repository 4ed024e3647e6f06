//! Transport seam between the client and an agent.

use agentwire_core::types::{AgentRequestMessage, Response};
use async_trait::async_trait;

use crate::error::TransportError;

/// Delivers one request and returns the agent's response.
///
/// Implementations own addressing and security; the client only needs
/// request/response semantics.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn send(&self, message: &AgentRequestMessage) -> Result<Response, TransportError>;
}
