//! Durable registry of in-flight persistent tasks.
//!
//! The registry is a single JSON object keyed by task id. Every mutation is
//! a read-modify-write of the whole file under one mutex.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use agentwire_core::error::AgentError;
use agentwire_core::fs::FileSystem;

use crate::error::TaskError;
use crate::types::TaskInfo;

type Registry = BTreeMap<String, TaskInfo>;

pub struct TaskManager {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    lock: Mutex<()>,
}

impl TaskManager {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// All journaled tasks, ordered by id.
    pub fn get_infos(&self) -> Result<Vec<TaskInfo>, TaskError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.into_values().collect())
    }

    pub fn add_info(&self, info: TaskInfo) -> Result<(), TaskError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut registry = self.read()?;
        tracing::debug!(task_id = %info.task_id, method = %info.method, "Journaling persistent task");
        registry.insert(info.task_id.clone(), info);
        self.write(&registry)
    }

    /// Remove a journaled task. Removing an unknown id is a no-op.
    pub fn remove_info(&self, task_id: &str) -> Result<(), TaskError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut registry = self.read()?;
        if registry.remove(task_id).is_none() {
            return Ok(());
        }
        tracing::debug!(task_id = %task_id, "Removing persistent task from journal");
        self.write(&registry)
    }

    fn read(&self) -> Result<Registry, TaskError> {
        if !self.fs.exists(&self.path) {
            return Ok(Registry::new());
        }
        let bytes = self.fs.read_file(&self.path).map_err(|e| {
            AgentError::Durability(format!(
                "Reading task infos from {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            TaskError::Storage(AgentError::Durability(format!(
                "Unmarshalling task infos from {}: {}",
                self.path.display(),
                e
            )))
        })
    }

    fn write(&self, registry: &Registry) -> Result<(), TaskError> {
        let bytes = serde_json::to_vec(registry).map_err(AgentError::from)?;
        self.fs.write_file(&self.path, &bytes).map_err(|e| {
            TaskError::Storage(AgentError::Durability(format!(
                "Writing task infos to {}: {}",
                self.path.display(),
                e
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwire_core::fs::{MemoryFileSystem, OsFileSystem};
    use std::path::Path;

    fn info(id: &str) -> TaskInfo {
        TaskInfo {
            task_id: id.to_string(),
            method: "mount_disk".to_string(),
            payload: format!(r#"{{"method":"mount_disk","arguments":["{id}"]}}"#).into_bytes(),
        }
    }

    #[test]
    fn test_empty_registry_when_file_missing() {
        let manager = TaskManager::new(Arc::new(MemoryFileSystem::new()), "/data/tasks.json");
        assert!(manager.get_infos().unwrap().is_empty());
    }

    #[test]
    fn test_add_and_remove() {
        let manager = TaskManager::new(Arc::new(MemoryFileSystem::new()), "/data/tasks.json");
        manager.add_info(info("b")).unwrap();
        manager.add_info(info("a")).unwrap();

        let infos = manager.get_infos().unwrap();
        assert_eq!(infos, vec![info("a"), info("b")]);

        manager.remove_info("a").unwrap();
        assert_eq!(manager.get_infos().unwrap(), vec![info("b")]);

        // Unknown ids are ignored.
        manager.remove_info("a").unwrap();
        assert_eq!(manager.get_infos().unwrap().len(), 1);
    }

    #[test]
    fn test_registry_survives_new_manager() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        let manager = TaskManager::new(Arc::new(OsFileSystem), &path);
        manager.add_info(info("persisted")).unwrap();
        drop(manager);

        let reopened = TaskManager::new(Arc::new(OsFileSystem), &path);
        assert_eq!(reopened.get_infos().unwrap(), vec![info("persisted")]);
    }

    #[test]
    fn test_write_failure_is_surfaced() {
        let fs = Arc::new(MemoryFileSystem::new());
        let manager = TaskManager::new(fs.clone(), "/data/tasks.json");
        fs.fail_writes("disk full");

        let err = manager.add_info(info("x")).unwrap_err();
        assert!(matches!(err, TaskError::Storage(AgentError::Durability(_))));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_corrupt_registry_is_an_error() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.write_file(Path::new("/data/tasks.json"), b"{broken").unwrap();
        let manager = TaskManager::new(fs, "/data/tasks.json");

        let err = manager.get_infos().unwrap_err();
        assert!(err.to_string().contains("Unmarshalling task infos"));
    }

    #[test]
    fn test_concurrent_registration_is_serialized() {
        let manager = Arc::new(TaskManager::new(
            Arc::new(MemoryFileSystem::new()),
            "/data/tasks.json",
        ));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.add_info(info(&format!("task-{i:02}"))))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(manager.get_infos().unwrap().len(), 16);
    }
}
