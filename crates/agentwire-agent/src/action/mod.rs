//! Action trait and registry.
//!
//! Every agent method is an [`Action`]. The [`ActionRegistry`] maps method
//! names to factory closures and is built explicitly by the composition root,
//! then handed to the dispatcher by value.

pub mod cancel_task;
pub mod command;
pub mod get_task;
pub mod ping;
pub mod run_script;
pub mod stop;
pub mod sync_dns;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use agentwire_core::config::CommandActionConfig;
use agentwire_core::types::ProtocolVersion;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ActionError;
use crate::task::TaskService;

pub use cancel_task::CancelTaskAction;
pub use command::CommandAction;
pub use get_task::GetTaskAction;
pub use ping::PingAction;
pub use run_script::RunScriptAction;
pub use stop::{CommandSupervisor, JobSupervisor, StopAction};
pub use sync_dns::SyncDnsAction;

/// A unit of work bound to one agent method.
#[async_trait]
pub trait Action: Send + Sync {
    /// Whether the dispatcher should run this action as a background task
    /// for a caller speaking `version`.
    fn is_asynchronous(&self, version: ProtocolVersion) -> bool;

    /// Whether in-flight invocations must be journaled and resumed after a
    /// restart. Only meaningful for asynchronous actions.
    fn is_persistent(&self) -> bool;

    /// Whether arguments may be written to the log.
    fn is_loggable(&self) -> bool {
        true
    }

    async fn run(&self, args: &[Value]) -> Result<Value, ActionError>;

    /// Continue an invocation interrupted by a restart, given the journaled
    /// arguments.
    async fn resume(&self, args: &[Value]) -> Result<Value, ActionError> {
        let _ = args;
        Err(ActionError::NotSupported("resume"))
    }

    async fn cancel(&self) -> Result<(), ActionError> {
        Err(ActionError::NotSupported("cancel"))
    }
}

/// Produces a fresh (or shared) action for each request.
pub type ActionFactory = Box<dyn Fn() -> Arc<dyn Action> + Send + Sync>;

/// Collaborators needed by the built-in actions.
pub struct ActionContext {
    pub task_service: Arc<TaskService>,
    pub supervisor: Arc<dyn JobSupervisor>,
    pub scripts_dir: PathBuf,
    pub sync_dns: Arc<SyncDnsAction>,
}

/// Method name to factory map.
#[derive(Default)]
pub struct ActionRegistry {
    factories: HashMap<String, ActionFactory>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `method`.
    pub fn register<F>(&mut self, method: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Action> + Send + Sync + 'static,
    {
        if self.factories.insert(method.to_string(), Box::new(factory)).is_some() {
            tracing::warn!(method, "Replacing previously registered action");
        }
    }

    /// Register the built-in agent methods.
    pub fn register_defaults(&mut self, ctx: ActionContext) {
        self.register("ping", || Arc::new(PingAction));

        let tasks = Arc::clone(&ctx.task_service);
        self.register("get_task", move || Arc::new(GetTaskAction::new(Arc::clone(&tasks))));

        let tasks = Arc::clone(&ctx.task_service);
        self.register("cancel_task", move || {
            Arc::new(CancelTaskAction::new(Arc::clone(&tasks)))
        });

        let supervisor = Arc::clone(&ctx.supervisor);
        self.register("stop", move || Arc::new(StopAction::new(Arc::clone(&supervisor))));

        let scripts_dir = ctx.scripts_dir.clone();
        self.register("run_script", move || {
            Arc::new(RunScriptAction::new(scripts_dir.clone()))
        });

        let sync_dns = Arc::clone(&ctx.sync_dns);
        self.register("sync_dns", move || {
            let action: Arc<dyn Action> = sync_dns.clone();
            action
        });
    }

    /// Expose an external program as an agent method.
    pub fn register_command(&mut self, config: CommandActionConfig) {
        let method = config.method.clone();
        self.register(&method, move || Arc::new(CommandAction::new(config.clone())));
    }

    /// Build the action for `method`.
    pub fn create(&self, method: &str) -> Result<Arc<dyn Action>, ActionError> {
        self.factories
            .get(method)
            .map(|factory| factory())
            .ok_or_else(|| ActionError::UnknownMethod(method.to_string()))
    }

    pub fn contains(&self, method: &str) -> bool {
        self.factories.contains_key(method)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.factories.keys().cloned().collect();
        methods.sort();
        methods
    }
}

/// Decode the positional argument at `index`.
pub(crate) fn argument<T: DeserializeOwned>(
    args: &[Value],
    index: usize,
    name: &str,
) -> Result<T, ActionError> {
    let value = args
        .get(index)
        .ok_or_else(|| ActionError::InvalidArguments(format!("missing argument '{}'", name)))?;
    serde_json::from_value(value.clone())
        .map_err(|e| ActionError::InvalidArguments(format!("argument '{}': {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_method() {
        let registry = ActionRegistry::new();
        let err = registry.create("compile_package").err().unwrap();
        assert!(matches!(err, ActionError::UnknownMethod(ref m) if m == "compile_package"));
        assert_eq!(err.to_string(), "unknown message compile_package");
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = ActionRegistry::new();
        registry.register("ping", || Arc::new(PingAction));

        assert!(registry.contains("ping"));
        let action = registry.create("ping").unwrap();
        assert!(!action.is_asynchronous(ProtocolVersion::default()));
    }

    #[test]
    fn test_register_command() {
        let mut registry = ActionRegistry::new();
        registry.register_command(CommandActionConfig {
            method: "compile_package".to_string(),
            program: "/bin/true".to_string(),
            args: vec![],
            asynchronous: true,
            persistent: true,
            cancelable: false,
            loggable: false,
        });

        let action = registry.create("compile_package").unwrap();
        assert!(action.is_persistent());
        assert!(!action.is_loggable());
        assert_eq!(registry.methods(), vec!["compile_package".to_string()]);
    }

    #[test]
    fn test_argument_decoding() {
        let args = vec![json!("blob-1"), json!(7)];
        let blob: String = argument(&args, 0, "blob_id").unwrap();
        let version: u64 = argument(&args, 1, "version").unwrap();
        assert_eq!(blob, "blob-1");
        assert_eq!(version, 7);

        let missing = argument::<String>(&args, 2, "digest").unwrap_err();
        assert_eq!(missing.to_string(), "Invalid arguments: missing argument 'digest'");

        let wrong = argument::<u64>(&args, 0, "version").unwrap_err();
        assert!(matches!(wrong, ActionError::InvalidArguments(_)));
    }
}
