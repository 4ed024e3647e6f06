//! Liveness check.

use agentwire_core::types::ProtocolVersion;
use async_trait::async_trait;
use serde_json::Value;

use crate::action::Action;
use crate::error::ActionError;

/// Answers `"pong"` synchronously.
pub struct PingAction;

#[async_trait]
impl Action for PingAction {
    fn is_asynchronous(&self, _version: ProtocolVersion) -> bool {
        false
    }

    fn is_persistent(&self) -> bool {
        false
    }

    async fn run(&self, _args: &[Value]) -> Result<Value, ActionError> {
        Ok(Value::from("pong"))
    }
}
