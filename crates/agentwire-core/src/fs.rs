//! Durable file system seam.
//!
//! Everything that must survive a restart (the task registry, the DNS state
//! file) goes through [`FileSystem`], so tests can substitute an in-memory
//! implementation and inject write failures.

use std::io;
use std::path::{Path, PathBuf};

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryFileSystem;

/// Minimal durable file operations. Errors are always surfaced.
pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn remove_all(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

/// File system backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    /// Writes go to a sibling temp file first and are renamed into place, so
    /// a crash never leaves a half-written record behind.
    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
            Ok(_) => std::fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory [`FileSystem`] with injectable failures. Compiled for this
/// crate's tests and behind the `test-util` feature for downstream tests.
#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::HashMap;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, PoisonError};

    use super::FileSystem;

    #[derive(Debug, Default)]
    pub struct MemoryFileSystem {
        files: Mutex<HashMap<PathBuf, Vec<u8>>>,
        fail_writes: Mutex<Option<String>>,
        fail_removes: Mutex<Option<String>>,
    }

    impl MemoryFileSystem {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent write fail with `message`.
        pub fn fail_writes(&self, message: &str) {
            *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
        }

        /// Make every subsequent removal fail with `message`.
        pub fn fail_removes(&self, message: &str) {
            *self.fail_removes.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
        }

        pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(path)
                .cloned()
        }
    }

    impl FileSystem for MemoryFileSystem {
        fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.contents(path).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                )
            })
        }

        fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            if let Some(message) = self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner).clone() {
                return Err(io::Error::other(message));
            }
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path.to_path_buf(), contents.to_vec());
            Ok(())
        }

        fn remove_all(&self, path: &Path) -> io::Result<()> {
            if let Some(message) = self.fail_removes.lock().unwrap_or_else(PoisonError::into_inner).clone() {
                return Err(io::Error::other(message));
            }
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|p, _| !p.starts_with(path));
            Ok(())
        }

        fn exists(&self, path: &Path) -> bool {
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(path)
        }
    }
}
