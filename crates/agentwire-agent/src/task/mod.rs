//! Runtime handles for asynchronous action invocations.
//!
//! A [`Task`] owns the execute, cancel and end hooks of one invocation.
//! [`TaskService`] starts tasks on the tokio runtime and keeps them
//! addressable by id for `get_task` and `cancel_task`.

pub mod manager;
pub mod state_machine;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{ActionError, TaskError};
use crate::task::state_machine::validate_transition;
use crate::types::{TaskSnapshot, TaskState};

pub use manager::TaskManager;

pub type TaskFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
pub type ExecuteFn = Box<dyn FnOnce() -> TaskFuture<Result<Value, ActionError>> + Send>;
pub type CancelFn = Box<dyn Fn() -> TaskFuture<Result<(), ActionError>> + Send + Sync>;
pub type EndFn = Box<dyn FnOnce(&TaskSnapshot) + Send>;

/// Box an async closure as a task's execute hook.
pub fn execute_fn<F, Fut>(f: F) -> ExecuteFn
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    Box::new(move || -> TaskFuture<Result<Value, ActionError>> { Box::pin(f()) })
}

/// Box an async closure as a task's cancel hook.
pub fn cancel_fn<F, Fut>(f: F) -> CancelFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    Box::new(move || -> TaskFuture<Result<(), ActionError>> { Box::pin(f()) })
}

/// Box a closure as a task's end hook.
pub fn end_fn<F>(f: F) -> EndFn
where
    F: FnOnce(&TaskSnapshot) + Send + 'static,
{
    Box::new(f)
}

struct TaskInner {
    state: TaskState,
    value: Option<Value>,
    error: Option<String>,
    cancel_requested: bool,
    finished_at: Option<DateTime<Utc>>,
    execute: Option<ExecuteFn>,
    on_end: Option<EndFn>,
}

/// One in-flight asynchronous invocation.
pub struct Task {
    id: String,
    created_at: DateTime<Utc>,
    inner: Mutex<TaskInner>,
    cancel_fn: CancelFn,
    state_tx: watch::Sender<TaskState>,
}

impl Task {
    fn new(id: String, execute: ExecuteFn, cancel_fn: CancelFn, on_end: EndFn) -> Self {
        let (state_tx, _) = watch::channel(TaskState::Created);
        Self {
            id,
            created_at: Utc::now(),
            inner: Mutex::new(TaskInner {
                state: TaskState::Created,
                value: None,
                error: None,
                cancel_requested: false,
                finished_at: None,
                execute: Some(execute),
                on_end: Some(on_end),
            }),
            cancel_fn,
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let inner = self.lock();
        self.snapshot_locked(&inner)
    }

    fn snapshot_locked(&self, inner: &TaskInner) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            state: inner.state,
            value: inner.value.clone(),
            error: inner.error.clone(),
            created_at: self.created_at,
            finished_at: inner.finished_at,
        }
    }

    /// Ask the underlying action to stop.
    ///
    /// Non-cancelable actions answer with `ActionError::NotSupported`. A task
    /// whose execution fails after a successful cancel ends as `Cancelled`.
    pub async fn cancel(&self) -> Result<(), ActionError> {
        {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return Err(TaskError::InvalidTransition(inner.state, TaskState::Cancelled).into());
            }
            inner.cancel_requested = true;
        }

        let result = (self.cancel_fn)().await;
        if result.is_err() {
            self.lock().cancel_requested = false;
        }
        result
    }

    /// Wait until the task reaches a terminal state.
    pub async fn wait(&self) -> TaskSnapshot {
        let mut rx = self.state_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| state.is_terminal()).await;
        self.snapshot()
    }

    fn begin(&self) -> Result<(ExecuteFn, EndFn), TaskError> {
        let mut inner = self.lock();
        validate_transition(inner.state, TaskState::Running)?;
        let (Some(execute), Some(on_end)) = (inner.execute.take(), inner.on_end.take()) else {
            return Err(TaskError::AlreadyStarted(self.id.clone()));
        };
        inner.state = TaskState::Running;
        drop(inner);
        self.state_tx.send_replace(TaskState::Running);
        Ok((execute, on_end))
    }

    fn finish(&self, result: Result<Value, ActionError>, on_end: EndFn) {
        let snapshot = {
            let mut inner = self.lock();
            let next = match &result {
                Ok(_) => TaskState::Done,
                Err(_) if inner.cancel_requested => TaskState::Cancelled,
                Err(_) => TaskState::Failed,
            };
            if let Err(e) = validate_transition(inner.state, next) {
                tracing::error!(task_id = %self.id, error = %e, "Task finished from an unexpected state");
            }
            inner.state = next;
            match result {
                Ok(value) => inner.value = Some(value),
                Err(e) => inner.error = Some(e.to_string()),
            }
            inner.finished_at = Some(Utc::now());
            self.snapshot_locked(&inner)
        };

        tracing::debug!(task_id = %self.id, state = %snapshot.state, "Task finished");
        on_end(&snapshot);
        self.state_tx.send_replace(snapshot.state);
    }
}

/// How long a finished task stays answerable to `get_task` by default.
pub const DEFAULT_FINISHED_TASK_RETENTION: Duration = Duration::from_secs(3600);

/// Creates, starts and tracks tasks.
///
/// Finished tasks remain addressable for `retention` after they end and are
/// pruned the next time a task starts.
pub struct TaskService {
    tasks: Mutex<HashMap<String, Arc<Task>>>,
    retention: Duration,
}

impl Default for TaskService {
    fn default() -> Self {
        Self::with_retention(DEFAULT_FINISHED_TASK_RETENTION)
    }
}

impl TaskService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Create a task with a freshly generated id.
    pub fn create_task(&self, execute: ExecuteFn, cancel: CancelFn, on_end: EndFn) -> Arc<Task> {
        self.create_task_with_id(Uuid::new_v4().to_string(), execute, cancel, on_end)
    }

    /// Create a task under a known id, used when resuming journaled work.
    pub fn create_task_with_id(
        &self,
        id: String,
        execute: ExecuteFn,
        cancel: CancelFn,
        on_end: EndFn,
    ) -> Arc<Task> {
        Arc::new(Task::new(id, execute, cancel, on_end))
    }

    /// Register the task and run it on its own tokio task.
    ///
    /// The end callback fires exactly once, even if the execute future panics.
    pub fn start_task(&self, task: &Arc<Task>) -> Result<(), TaskError> {
        let (execute, on_end) = task.begin()?;
        {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            self.prune_finished(&mut tasks);
            tasks.insert(task.id.clone(), Arc::clone(task));
        }

        let task = Arc::clone(task);
        tokio::spawn(async move {
            let result = match tokio::spawn(execute()).await {
                Ok(result) => result,
                Err(e) => Err(ActionError::Failed(format!("Task panicked: {}", e))),
            };
            task.finish(result, on_end);
        });
        Ok(())
    }

    fn prune_finished(&self, tasks: &mut HashMap<String, Arc<Task>>) {
        let now = Utc::now();
        let before = tasks.len();
        tasks.retain(|_, task| match task.snapshot().finished_at {
            Some(finished_at) => now
                .signed_duration_since(finished_at)
                .to_std()
                .map_or(true, |age| age < self.retention),
            None => true,
        });
        let pruned = before - tasks.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned finished tasks");
        }
    }

    pub fn find_task(&self, id: &str) -> Option<Arc<Task>> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Ids of tasks that have not reached a terminal state.
    pub fn running_task_ids(&self) -> Vec<String> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = tasks
            .values()
            .filter(|t| !t.state().is_terminal())
            .map(|t| t.id.clone())
            .collect();
        ids.sort();
        ids
    }
}
