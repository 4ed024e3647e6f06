//! Wire envelope shared by the agent and its callers.
//!
//! Requests are `{method, arguments, reply_to, protocol}`; responses are
//! either `{"value": ...}` or `{"exception": {"message": "..."}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::AgentError;

/// Method used by callers to poll an asynchronous task.
pub const GET_TASK_METHOD: &str = "get_task";

/// State reported for a task that has not finished yet.
pub const RUNNING_STATE: &str = "running";

// =============================================================================
// Protocol version
// =============================================================================

/// Envelope protocol version announced by the caller.
///
/// Older callers omit the field, which decodes as version 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(pub u32);

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Request message as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequestMessage {
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default)]
    pub reply_to: String,
    #[serde(default)]
    pub protocol: ProtocolVersion,
}

impl AgentRequestMessage {
    pub fn new(method: impl Into<String>, arguments: Vec<Value>, reply_to: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments,
            reply_to: reply_to.into(),
            protocol: ProtocolVersion::default(),
        }
    }
}

/// Inbound request as seen by the dispatcher.
///
/// `payload` holds the raw envelope bytes; persistent tasks store it verbatim
/// so they can be resumed with the same arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub reply_to: String,
    pub method: String,
    pub payload: Vec<u8>,
}

impl Request {
    /// Decode raw envelope bytes into a request.
    pub fn decode(payload: Vec<u8>) -> Result<Self, AgentError> {
        let message: AgentRequestMessage = serde_json::from_slice(&payload)?;
        Ok(Self {
            reply_to: message.reply_to,
            method: message.method,
            payload,
        })
    }

    /// Build a request from an already decoded envelope.
    pub fn from_message(message: &AgentRequestMessage) -> Result<Self, AgentError> {
        Ok(Self {
            reply_to: message.reply_to.clone(),
            method: message.method.clone(),
            payload: serde_json::to_vec(message)?,
        })
    }

    /// Parse the payload back into the full envelope.
    pub fn message(&self) -> Result<AgentRequestMessage, AgentError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Remote-visible failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    pub message: String,
}

/// Response to any request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Value(Value),
    Exception(Exception),
}

impl Response {
    pub fn value(value: impl Into<Value>) -> Self {
        Response::Value(value.into())
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Response::Exception(Exception {
            message: message.into(),
        })
    }

    /// If this response describes an asynchronous task, its state value.
    pub fn task_value(&self) -> Option<TaskStateValue> {
        match self {
            Response::Value(value) => TaskStateValue::from_value(value),
            Response::Exception(_) => None,
        }
    }
}

/// Value returned while an asynchronous task is tracked by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStateValue {
    pub agent_task_id: String,
    pub state: String,
}

impl TaskStateValue {
    pub fn running(agent_task_id: impl Into<String>) -> Self {
        Self {
            agent_task_id: agent_task_id.into(),
            state: RUNNING_STATE.to_string(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == RUNNING_STATE
    }

    /// Recognize the `{agent_task_id, state}` shape inside an arbitrary value.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let agent_task_id = object.get("agent_task_id")?.as_str()?;
        let state = object.get("state")?.as_str()?;
        Some(Self {
            agent_task_id: agent_task_id.to_string(),
            state: state.to_string(),
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "agent_task_id": self.agent_task_id,
            "state": self.state,
        })
    }
}
