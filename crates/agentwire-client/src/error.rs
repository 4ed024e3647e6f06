//! Error types for the caller side of the protocol.

/// Failure to deliver a request or receive its response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by [`crate::AgentClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a response. `context` names the operation,
    /// e.g. "Sending 'get_task' to the agent".
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: TransportError,
    },
    /// The agent answered with an exception. Never retried.
    #[error("{0}")]
    TaskFailed(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn transport(method: &str, source: TransportError) -> Self {
        ClientError::Transport {
            context: format!("Sending '{}' to the agent", method),
            source,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }
}
