//! Applying DNS records to the local resolver.

use std::path::PathBuf;
use std::sync::Arc;

use agentwire_core::fs::FileSystem;

use crate::dns::DnsRecords;

/// Makes a record set visible to the local resolver.
pub trait RecordsWriter: Send + Sync {
    fn save_records(&self, records: &DnsRecords) -> Result<(), String>;
}

/// Renders records into a hosts file.
pub struct HostsFileWriter {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl HostsFileWriter {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn render(records: &DnsRecords) -> String {
        let mut out = String::from("127.0.0.1 localhost\n");
        for (ip, name) in &records.records {
            out.push_str(ip);
            out.push(' ');
            out.push_str(name);
            out.push('\n');
        }
        out
    }
}

impl RecordsWriter for HostsFileWriter {
    fn save_records(&self, records: &DnsRecords) -> Result<(), String> {
        self.fs
            .write_file(&self.path, Self::render(records).as_bytes())
            .map_err(|e| format!("writing {}: {}", self.path.display(), e))
    }
}
