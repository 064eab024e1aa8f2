//! Normalized file records
//!
//! A [`FileRecord`] is the snapshot handed to callers for every visible entry
//! of a listing. Records are never mutated; each query refresh replaces them
//! wholesale.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// DownloadStatus
// ============================================================================

/// Local materialization state of a cloud item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadStatus {
    /// Only a placeholder exists locally
    NotDownloaded,
    /// The sync daemon is fetching the content
    Downloading,
    /// The local copy matches the latest cloud version
    Current,
}

impl Display for DownloadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::NotDownloaded => write!(f, "notDownloaded"),
            DownloadStatus::Downloading => write!(f, "downloading"),
            DownloadStatus::Current => write!(f, "current"),
        }
    }
}

// ============================================================================
// FileRecord
// ============================================================================

/// Read-only snapshot of one indexed entry
///
/// Attributes the index did not report stay `None`; in particular an unknown
/// size is never reported as `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Path relative to the container root
    pub relative_path: String,
    /// Absolute path on the local filesystem
    pub absolute_path: PathBuf,
    pub is_directory: bool,
    pub display_name: Option<String>,
    pub file_system_name: Option<String>,
    pub size_in_bytes: Option<u64>,
    #[serde(with = "epoch_seconds", default)]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(with = "epoch_seconds", default)]
    pub content_change_date: Option<DateTime<Utc>>,
    pub has_unresolved_conflicts: Option<bool>,
    pub download_status: Option<DownloadStatus>,
    pub is_downloading: Option<bool>,
    pub is_uploaded: Option<bool>,
    pub is_uploading: Option<bool>,
}

/// Timestamps travel as fractional seconds since the Unix epoch.
mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => {
                let secs = dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9;
                serializer.serialize_some(&secs)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<f64> = Option::deserialize(deserializer)?;
        Ok(secs.and_then(|s| {
            let whole = s.floor();
            let nanos = ((s - whole) * 1e9).round() as u32;
            DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileRecord {
        FileRecord {
            relative_path: "Documents/a.txt".into(),
            absolute_path: PathBuf::from("/c/Documents/a.txt"),
            is_directory: false,
            display_name: Some("a".into()),
            file_system_name: Some("a.txt".into()),
            size_in_bytes: None,
            creation_date: DateTime::from_timestamp(1_700_000_000, 500_000_000),
            content_change_date: None,
            has_unresolved_conflicts: Some(false),
            download_status: Some(DownloadStatus::Current),
            is_downloading: Some(false),
            is_uploaded: Some(true),
            is_uploading: None,
        }
    }

    #[test]
    fn test_download_status_display() {
        assert_eq!(DownloadStatus::NotDownloaded.to_string(), "notDownloaded");
        assert_eq!(DownloadStatus::Downloading.to_string(), "downloading");
        assert_eq!(DownloadStatus::Current.to_string(), "current");
    }

    #[test]
    fn test_record_serializes_camel_case_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["relativePath"], "Documents/a.txt");
        assert_eq!(value["fileSystemName"], "a.txt");
        assert_eq!(value["downloadStatus"], "current");
        assert_eq!(value["creationDate"], 1_700_000_000.5);
    }

    #[test]
    fn test_unknown_size_stays_null() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value["sizeInBytes"].is_null());
        assert!(value["contentChangeDate"].is_null());
    }

    #[test]
    fn test_record_deserializes_dates() {
        let json = serde_json::to_string(&sample()).unwrap();
        let back: FileRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.creation_date, sample().creation_date);
    }
}
