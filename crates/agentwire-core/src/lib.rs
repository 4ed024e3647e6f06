pub mod config;
pub mod error;
pub mod fs;
pub mod types;

pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use fs::{FileSystem, OsFileSystem};
pub use types::*;
