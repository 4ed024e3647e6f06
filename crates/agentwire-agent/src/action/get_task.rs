//! Polling endpoint for asynchronous tasks.

use std::sync::Arc;

use agentwire_core::types::{ProtocolVersion, TaskStateValue};
use async_trait::async_trait;
use serde_json::Value;

use crate::action::{argument, Action};
use crate::error::{ActionError, TaskError};
use crate::task::TaskService;
use crate::types::TaskState;

/// Reports `{agent_task_id, state: "running"}` until the task finishes, then
/// its value or its error.
pub struct GetTaskAction {
    task_service: Arc<TaskService>,
}

impl GetTaskAction {
    pub fn new(task_service: Arc<TaskService>) -> Self {
        Self { task_service }
    }
}

#[async_trait]
impl Action for GetTaskAction {
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

        let snapshot = task.snapshot();
        match snapshot.state {
            TaskState::Created | TaskState::Running => {
                Ok(TaskStateValue::running(task_id).to_value())
            }
            TaskState::Done => Ok(snapshot.value.unwrap_or(Value::Null)),
            TaskState::Failed => Err(ActionError::Failed(format!(
                "Task {} result: {}",
                task_id,
                snapshot.error.unwrap_or_default()
            ))),
            TaskState::Cancelled => Err(ActionError::Failed(format!(
                "Task {} was cancelled",
                task_id
            ))),
        }
    }
}
