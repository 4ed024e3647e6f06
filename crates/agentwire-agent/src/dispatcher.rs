//! Inbound request dispatch.
//!
//! Resolves the requested method to an [`Action`], runs synchronous actions
//! inline and hands asynchronous ones to the [`TaskService`]. Persistent
//! actions are journaled in the [`TaskManager`] before they start, so a crash
//! at any later point leaves a record that [`ActionDispatcher::resume_previously_dispatched_tasks`]
//! picks up on the next start.

use std::sync::Arc;

use agentwire_core::types::{AgentRequestMessage, Request, Response, TaskStateValue};
use serde_json::Value;
use uuid::Uuid;

use crate::action::{Action, ActionRegistry};
use crate::error::{ActionError, TaskError};
use crate::task::{cancel_fn, end_fn, execute_fn, EndFn, TaskManager, TaskService};
use crate::types::TaskInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invocation {
    Run,
    Resume,
}

pub struct ActionDispatcher {
    registry: ActionRegistry,
    task_service: Arc<TaskService>,
    task_manager: Arc<TaskManager>,
}

impl ActionDispatcher {
    pub fn new(
        registry: ActionRegistry,
        task_service: Arc<TaskService>,
        task_manager: Arc<TaskManager>,
    ) -> Self {
        Self {
            registry,
            task_service,
            task_manager,
        }
    }

    /// Handle one request. Every failure is flattened into an exception
    /// response; asynchronous actions answer before they complete.
    pub async fn dispatch(&self, request: Request) -> Response {
        let action = match self.registry.create(&request.method) {
            Ok(action) => action,
            Err(e) => {
                tracing::error!(method = %request.method, reply_to = %request.reply_to, "Unknown method");
                return Response::exception(e.to_string());
            }
        };

        let message = match request.message() {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(method = %request.method, error = %e, "Malformed request payload");
                return Response::exception(format!("Unmarshalling request: {}", e));
            }
        };

        if action.is_loggable() {
            tracing::info!(
                method = %request.method,
                reply_to = %request.reply_to,
                arguments = ?message.arguments,
                "Dispatching action"
            );
        } else {
            tracing::info!(method = %request.method, reply_to = %request.reply_to, "Dispatching action");
        }

        if !action.is_asynchronous(message.protocol) {
            return match action.run(&message.arguments).await {
                Ok(value) => Response::Value(value),
                Err(e) => {
                    tracing::error!(method = %request.method, error = %e, "Action failed");
                    Response::exception(format!("Action Failed {}: {}", request.method, e))
                }
            };
        }

        self.dispatch_async(request, message, action)
    }

    fn dispatch_async(
        &self,
        request: Request,
        message: AgentRequestMessage,
        action: Arc<dyn Action>,
    ) -> Response {
        let task_id = Uuid::new_v4().to_string();
        let persistent = action.is_persistent();

        if persistent {
            let info = TaskInfo {
                task_id: task_id.clone(),
                method: request.method.clone(),
                payload: request.payload,
            };
            if let Err(source) = self.task_manager.add_info(info) {
                let err = ActionError::Registration {
                    method: request.method,
                    source,
                };
                tracing::error!(error = %err, "Refusing to start unjournaled persistent action");
                return Response::exception(err.to_string());
            }
        }

        match self.start_task(
            task_id.clone(),
            action,
            message.arguments,
            Invocation::Run,
            persistent,
        ) {
            Ok(()) => Response::Value(TaskStateValue::running(task_id).to_value()),
            Err(e) => {
                if persistent {
                    self.forget(&task_id);
                }
                Response::exception(e.to_string())
            }
        }
    }

    /// Restart every journaled task through [`Action::resume`].
    ///
    /// Entries whose method can no longer be created, or whose payload no
    /// longer decodes, are removed without starting anything. A failure to
    /// remove or start one entry is logged and never blocks the others; only
    /// an unreadable journal fails the call. Returns the number of tasks
    /// resumed.
    pub fn resume_previously_dispatched_tasks(&self) -> Result<usize, TaskError> {
        let infos = self.task_manager.get_infos()?;
        let mut resumed = 0;

        for info in infos {
            let action = match self.registry.create(&info.method) {
                Ok(action) => action,
                Err(e) => {
                    tracing::warn!(task_id = %info.task_id, error = %e, "Removing task info for unknown method");
                    self.forget(&info.task_id);
                    continue;
                }
            };

            let arguments = match serde_json::from_slice::<AgentRequestMessage>(&info.payload) {
                Ok(message) => message.arguments,
                Err(e) => {
                    tracing::warn!(task_id = %info.task_id, error = %e, "Removing undecodable task info");
                    self.forget(&info.task_id);
                    continue;
                }
            };

            tracing::info!(task_id = %info.task_id, method = %info.method, "Resuming task");
            let task_id = info.task_id.clone();
            if let Err(e) = self.start_task(info.task_id, action, arguments, Invocation::Resume, true) {
                tracing::error!(task_id = %task_id, error = %e, "Failed to resume task");
                continue;
            }
            resumed += 1;
        }

        Ok(resumed)
    }

    fn start_task(
        &self,
        task_id: String,
        action: Arc<dyn Action>,
        arguments: Vec<Value>,
        invocation: Invocation,
        journaled: bool,
    ) -> Result<(), TaskError> {
        let exec_action = Arc::clone(&action);
        let execute = execute_fn(move || async move {
            match invocation {
                Invocation::Run => exec_action.run(&arguments).await,
                Invocation::Resume => exec_action.resume(&arguments).await,
            }
        });

        let cancel = cancel_fn(move || {
            let action = Arc::clone(&action);
            async move { action.cancel().await }
        });

        let task = self
            .task_service
            .create_task_with_id(task_id, execute, cancel, self.on_end(journaled));
        self.task_service.start_task(&task)
    }

    fn on_end(&self, journaled: bool) -> EndFn {
        let manager = Arc::clone(&self.task_manager);
        end_fn(move |snapshot| {
            match &snapshot.error {
                Some(error) => {
                    tracing::warn!(task_id = %snapshot.id, state = %snapshot.state, error = %error, "Task ended")
                }
                None => tracing::info!(task_id = %snapshot.id, state = %snapshot.state, "Task ended"),
            }
            if journaled {
                if let Err(e) = manager.remove_info(&snapshot.id) {
                    tracing::error!(task_id = %snapshot.id, error = %e, "Failed to remove task info");
                }
            }
        })
    }

    fn forget(&self, task_id: &str) {
        if let Err(e) = self.task_manager.remove_info(task_id) {
            tracing::error!(task_id = %task_id, error = %e, "Failed to remove task info");
        }
    }
}
