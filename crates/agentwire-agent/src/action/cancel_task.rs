//! Cancellation endpoint for asynchronous tasks.

use std::sync::Arc;

use agentwire_core::types::ProtocolVersion;
use async_trait::async_trait;
use serde_json::Value;

use crate::action::{argument, Action};
use crate::error::{ActionError, TaskError};
use crate::task::TaskService;

/// Forwards a cancel request to the task's action.
pub struct CancelTaskAction {
    task_service: Arc<TaskService>,
}

impl CancelTaskAction {
    pub fn new(task_service: Arc<TaskService>) -> Self {
        Self { task_service }
    }
}

#[async_trait]
impl Action for CancelTaskAction {
    fn is_asynchronous(&self, _version: ProtocolVersion) -> bool {
        false
    }

    fn is_persistent(&self) -> bool {
        false
    }

    async fn run(&self, args: &[Value]) -> Result<Value, ActionError> {
        let task_id: String = argument(args, 0, "task_id")?;
        let task = self
            .task_service
            .find_task(&task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.clone()))?;

        task.cancel().await?;
        tracing::info!(task_id = %task_id, "Task cancel requested");
        Ok(Value::from("canceled"))
    }
}
