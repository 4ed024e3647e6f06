//! Run a named lifecycle script from the scripts directory.

use std::path::PathBuf;

use agentwire_core::types::ProtocolVersion;
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::action::{argument, Action};
use crate::error::ActionError;

/// Runs `<scripts_dir>/<name>`. A missing script is skipped, not an error.
pub struct RunScriptAction {
    scripts_dir: PathBuf,
}

impl RunScriptAction {
    pub fn new(scripts_dir: PathBuf) -> Self {
        Self { scripts_dir }
    }
}

#[async_trait]
impl Action for RunScriptAction {
    fn is_asynchronous(&self, _version: ProtocolVersion) -> bool {
        true
    }

    fn is_persistent(&self) -> bool {
        false
    }

    async fn run(&self, args: &[Value]) -> Result<Value, ActionError> {
        let name: String = argument(args, 0, "script_name")?;
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(ActionError::InvalidArguments(format!(
                "invalid script name '{}'",
                name
            )));
        }

        let path = self.scripts_dir.join(&name);
        if !path.is_file() {
            tracing::info!(script = %name, "Script not present, skipping");
            return Ok(Value::from("skipped"));
        }

        let output = Command::new(&path)
            .output()
            .await
            .map_err(|e| ActionError::Failed(format!("Running script {}: {}", name, e)))?;

        if !output.status.success() {
            return Err(ActionError::Failed(format!(
                "Running script {}: exited with {}",
                name, output.status
            )));
        }

        tracing::info!(script = %name, "Script executed");
        Ok(Value::from("executed"))
    }
}
