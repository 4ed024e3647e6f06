//! External programs exposed as agent methods.
//!
//! The program receives the configured arguments followed by the call
//! arguments (strings verbatim, anything else as JSON). Its trimmed stdout is
//! the result: parsed as JSON when possible, otherwise returned as a string.

use std::sync::Arc;

use agentwire_core::config::CommandActionConfig;
use agentwire_core::types::ProtocolVersion;
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Notify;

use crate::action::Action;
use crate::error::ActionError;

pub struct CommandAction {
    config: CommandActionConfig,
    cancel: Arc<Notify>,
}

impl CommandAction {
    pub fn new(config: CommandActionConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(Notify::new()),
        }
    }

    async fn execute(&self, args: &[Value]) -> Result<Value, ActionError> {
        let mut command = Command::new(&self.config.program);
        command.args(&self.config.args);
        for arg in args {
            match arg {
                Value::String(s) => command.arg(s),
                other => command.arg(other.to_string()),
            };
        }
        // Dropping the output future on cancel kills the child.
        command.kill_on_drop(true);

        let output = tokio::select! {
            output = command.output() => output.map_err(|e| {
                ActionError::Failed(format!("Running {}: {}", self.config.program, e))
            })?,
            _ = self.cancel.notified(), if self.config.cancelable => {
                tracing::info!(method = %self.config.method, "Command cancelled");
                return Err(ActionError::Cancelled);
            }
        };

        if !output.status.success() {
            return Err(ActionError::Failed(format!(
                "Running {}: exited with {}: {}",
                self.config.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(serde_json::from_str(&stdout).unwrap_or(Value::String(stdout)))
    }
}

#[async_trait]
impl Action for CommandAction {
    fn is_asynchronous(&self, _version: ProtocolVersion) -> bool {
        self.config.asynchronous
    }

    fn is_persistent(&self) -> bool {
        self.config.persistent
    }

    fn is_loggable(&self) -> bool {
        self.config.loggable
    }

    async fn run(&self, args: &[Value]) -> Result<Value, ActionError> {
        self.execute(args).await
    }

    /// Configured programs are required to be idempotent, so resuming runs
    /// them again with the journaled arguments.
    async fn resume(&self, args: &[Value]) -> Result<Value, ActionError> {
        tracing::info!(method = %self.config.method, "Resuming command");
        self.execute(args).await
    }

    async fn cancel(&self) -> Result<(), ActionError> {
        if !self.config.cancelable {
            return Err(ActionError::NotSupported("cancel"));
        }
        self.cancel.notify_one();
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(program: &str, args: &[&str], cancelable: bool) -> CommandActionConfig {
        CommandActionConfig {
            method: "compile_package".to_string(),
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            asynchronous: true,
            persistent: true,
            cancelable,
            loggable: true,
        }
    }

    #[tokio::test]
    async fn test_stdout_becomes_value() {
        let action = CommandAction::new(config("echo", &[], false));
        let value = action.run(&[json!("compiled")]).await.unwrap();
        assert_eq!(value, json!("compiled"));

        let value = action.run(&[json!({"sha1": "abc"})]).await.unwrap();
        assert_eq!(value, json!({"sha1": "abc"}));
    }

    #[tokio::test]
    async fn test_resume_reruns_program() {
        let action = CommandAction::new(config("echo", &["resumed"], false));
        assert_eq!(action.resume(&[]).await.unwrap(), json!("resumed"));
    }

    #[tokio::test]
    async fn test_failure_exit_code() {
        let action = CommandAction::new(config("false", &[], false));
        let err = action.run(&[]).await.unwrap_err();
        assert!(err.to_string().starts_with("Running false: exited with"));
    }

    #[tokio::test]
    async fn test_non_cancelable_refuses_cancel() {
        let action = CommandAction::new(config("true", &[], false));
        assert!(matches!(
            action.cancel().await,
            Err(ActionError::NotSupported("cancel"))
        ));
    }

    #[tokio::test]
    async fn test_cancel_kills_running_command() {
        let action = Arc::new(CommandAction::new(config("sleep", &["30"], true)));
        let running = Arc::clone(&action);
        let handle = tokio::spawn(async move { running.run(&[]).await });

        action.cancel().await.unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("cancelled command should return promptly")
            .unwrap();
        assert!(matches!(result, Err(ActionError::Cancelled)));
    }
}
