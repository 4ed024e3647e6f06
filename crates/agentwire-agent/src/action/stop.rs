//! Stop the supervised workload.

use std::sync::Arc;

use agentwire_core::types::ProtocolVersion;
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::action::Action;
use crate::error::ActionError;

/// Process supervisor the agent drives. Its internals are outside the agent.
#[async_trait]
pub trait JobSupervisor: Send + Sync {
    async fn stop(&self) -> Result<(), String>;
}

/// Supervisor that shells out to a configured command line.
///
/// An empty command line means there is nothing to stop.
pub struct CommandSupervisor {
    stop_command: Vec<String>,
}

impl CommandSupervisor {
    pub fn new(stop_command: Vec<String>) -> Self {
        Self { stop_command }
    }
}

#[async_trait]
impl JobSupervisor for CommandSupervisor {
    async fn stop(&self) -> Result<(), String> {
        let Some((program, args)) = self.stop_command.split_first() else {
            tracing::debug!("No stop command configured");
            return Ok(());
        };

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("spawning {}: {}", program, e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

/// Asynchronous, non-persistent, not cancelable.
pub struct StopAction {
    supervisor: Arc<dyn JobSupervisor>,
}

impl StopAction {
    pub fn new(supervisor: Arc<dyn JobSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Action for StopAction {
    fn is_asynchronous(&self, _version: ProtocolVersion) -> bool {
        true
    }

    fn is_persistent(&self) -> bool {
        false
    }

    async fn run(&self, _args: &[Value]) -> Result<Value, ActionError> {
        self.supervisor
            .stop()
            .await
            .map_err(|e| ActionError::Failed(format!("Stopping services: {}", e)))?;
        tracing::info!("Services stopped");
        Ok(Value::from("stopped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSupervisor;

    #[async_trait]
    impl JobSupervisor for FailingSupervisor {
        async fn stop(&self) -> Result<(), String> {
            Err("monit unreachable".to_string())
        }
    }

    #[tokio::test]
    async fn test_stop_without_command() {
        let action = StopAction::new(Arc::new(CommandSupervisor::new(vec![])));
        assert_eq!(action.run(&[]).await.unwrap(), Value::from("stopped"));
    }

    #[tokio::test]
    async fn test_stop_failure_is_wrapped() {
        let action = StopAction::new(Arc::new(FailingSupervisor));
        let err = action.run(&[]).await.unwrap_err();
        assert_eq!(err.to_string(), "Stopping services: monit unreachable");
    }

    #[tokio::test]
    async fn test_stop_capabilities() {
        let action = StopAction::new(Arc::new(CommandSupervisor::new(vec![])));
        assert!(action.is_asynchronous(ProtocolVersion::default()));
        assert!(!action.is_persistent());
        assert!(action.cancel().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_supervisor_runs_command() {
        let ok = CommandSupervisor::new(vec!["true".to_string()]);
        assert!(ok.stop().await.is_ok());

        let failing = CommandSupervisor::new(vec!["false".to_string()]);
        let err = failing.stop().await.unwrap_err();
        assert!(err.starts_with("false exited with"));
    }
}
