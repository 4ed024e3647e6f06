use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AgentError, Result};

/// Top-level configuration for the agent process and its client.
///
/// Loaded from `~/.agentwire/config.toml` by default. Every section falls
/// back to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub agent: DispatchConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AgentError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Path of the persistent task registry.
    pub fn task_file_path(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join(&self.agent.task_file)
    }

    /// Path of the last-applied DNS blob.
    pub fn dns_state_path(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join(&self.dns.state_file)
    }
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the task registry and DNS state.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.agentwire/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Dispatcher and built-in action settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// File name (inside `data_dir`) of the persistent task registry.
    pub task_file: String,
    /// Directory searched by `run_script`.
    pub scripts_dir: String,
    /// Command executed by the `stop` action. Empty means nothing to stop.
    pub stop_command: Vec<String>,
    /// Seconds a finished task stays answerable to `get_task`.
    pub finished_task_retention_secs: u64,
    /// External programs exposed as agent methods.
    pub commands: Vec<CommandActionConfig>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            task_file: "tasks.json".to_string(),
            scripts_dir: "~/.agentwire/scripts".to_string(),
            stop_command: Vec::new(),
            finished_task_retention_secs: 3600,
            commands: Vec::new(),
        }
    }
}

/// An external program bound to an agent method name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandActionConfig {
    pub method: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_true")]
    pub asynchronous: bool,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub cancelable: bool,
    #[serde(default = "default_true")]
    pub loggable: bool,
}

fn default_true() -> bool {
    true
}

/// DNS record sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Directory of the local content-addressed blob store.
    pub blobstore_dir: String,
    /// Scratch directory for fetched blobs.
    pub tmp_dir: String,
    /// Hosts file the records are rendered into.
    pub hosts_path: String,
    /// File name (inside `data_dir`) of the last-applied blob.
    pub state_file: String,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            blobstore_dir: "~/.agentwire/blobs".to_string(),
            tmp_dir: std::env::temp_dir().to_string_lossy().to_string(),
            hosts_path: "/etc/hosts".to_string(),
            state_file: "records.json".to_string(),
        }
    }
}

/// Caller-side polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Interval between `get_task` polls in milliseconds.
    pub get_task_delay_ms: u64,
    /// Consecutive transport failures tolerated while polling.
    pub tolerated_error_count: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            get_task_delay_ms: 1000,
            tolerated_error_count: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.general.data_dir, "~/.agentwire/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.agent.task_file, "tasks.json");
        assert_eq!(config.agent.finished_task_retention_secs, 3600);
        assert!(config.agent.commands.is_empty());
        assert_eq!(config.dns.state_file, "records.json");
        assert_eq!(config.client.get_task_delay_ms, 1000);
        assert_eq!(config.client.tolerated_error_count, 24);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/var/lib/agentwire"
log_level = "debug"

[agent]
stop_command = ["systemctl", "stop", "workload"]
finished_task_retention_secs = 600

[[agent.commands]]
method = "compile_package"
program = "/usr/local/bin/compile"
args = ["--fast"]
persistent = true

[dns]
hosts_path = "/tmp/hosts"

[client]
get_task_delay_ms = 250
tolerated_error_count = 3
"#;
        let file = create_temp_config(content);
        let config = AgentConfig::load(file.path()).unwrap();

        assert_eq!(config.general.data_dir, "/var/lib/agentwire");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.agent.stop_command, vec!["systemctl", "stop", "workload"]);
        assert_eq!(config.agent.finished_task_retention_secs, 600);
        assert_eq!(config.agent.commands.len(), 1);

        let command = &config.agent.commands[0];
        assert_eq!(command.method, "compile_package");
        assert!(command.asynchronous);
        assert!(command.persistent);
        assert!(!command.cancelable);
        assert!(command.loggable);

        assert_eq!(config.dns.hosts_path, "/tmp/hosts");
        assert_eq!(config.dns.state_file, "records.json");
        assert_eq!(config.client.get_task_delay_ms, 250);
        assert_eq!(config.client.tolerated_error_count, 3);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.agent.task_file, "tasks.json");
        assert_eq!(config.client.tolerated_error_count, 24);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[general\nlog_level = ");
        let err = AgentConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AgentConfig::load_or_default(Path::new("/nonexistent/agentwire.toml"));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AgentConfig::default();
        config.general.data_dir = "/srv/agent".to_string();
        config.agent.commands.push(CommandActionConfig {
            method: "mount_disk".to_string(),
            program: "/bin/mount-disk".to_string(),
            args: vec![],
            asynchronous: true,
            persistent: true,
            cancelable: false,
            loggable: true,
        });
        config.save(&path).unwrap();

        let reloaded = AgentConfig::load(&path).unwrap();
        assert_eq!(reloaded.general.data_dir, "/srv/agent");
        assert_eq!(reloaded.agent.commands, config.agent.commands);
    }

    #[test]
    fn test_derived_paths() {
        let mut config = AgentConfig::default();
        config.general.data_dir = "/var/lib/agentwire".to_string();
        assert_eq!(
            config.task_file_path(),
            PathBuf::from("/var/lib/agentwire/tasks.json")
        );
        assert_eq!(
            config.dns_state_path(),
            PathBuf::from("/var/lib/agentwire/records.json")
        );
    }
}
