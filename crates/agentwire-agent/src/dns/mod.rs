//! DNS record distribution: blob store access, record rendering, and the
//! versioned record set format.

pub mod blobstore;
pub mod records;

use serde::{Deserialize, Serialize};

pub use blobstore::{BlobStore, LocalBlobstore};
pub use records::{HostsFileWriter, RecordsWriter};

/// Full-replacement record set as distributed in a blob.
///
/// Unknown fields are tolerated so newer producers can add data; the state
/// file keeps the verbatim blob, not this re-serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecords {
    pub version: u64,
    #[serde(default)]
    pub records: Vec<(String, String)>,
}

/// Just enough of the state file to read the applied version.
#[derive(Debug, Deserialize)]
pub(crate) struct RecordedVersion {
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records_blob() {
        let blob = r#"{"version":4,"records":[["10.0.0.1","web-0.example"],["10.0.0.2","web-1.example"]],"record_keys":["id"]}"#;
        let records: DnsRecords = serde_json::from_str(blob).unwrap();
        assert_eq!(records.version, 4);
        assert_eq!(
            records.records,
            vec![
                ("10.0.0.1".to_string(), "web-0.example".to_string()),
                ("10.0.0.2".to_string(), "web-1.example".to_string()),
            ]
        );
    }

    #[test]
    fn test_records_default_to_empty() {
        let records: DnsRecords = serde_json::from_str(r#"{"version":1}"#).unwrap();
        assert!(records.records.is_empty());
    }

    #[test]
    fn test_version_is_required() {
        assert!(serde_json::from_str::<DnsRecords>(r#"{"records":[]}"#).is_err());
    }
}
