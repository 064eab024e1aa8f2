//! Raw indexed entries
//!
//! A [`RawEntry`] is what a metadata index reports for one item: the path
//! plus whatever attributes the index happened to know at that moment.
//! Every attribute other than the path is optional; adapters must leave a
//! field `None` rather than invent a value.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::file_record::DownloadStatus;

/// One result item of a metadata query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    /// Absolute path of the item
    pub path: PathBuf,
    /// Whether the item is hidden (dot-file or hidden flag)
    pub is_hidden: bool,
    /// Whether the item is a directory
    pub is_directory: bool,
    /// User-facing name
    pub display_name: Option<String>,
    /// Name on the filesystem
    pub fs_name: Option<String>,
    /// Size in bytes
    pub fs_size: Option<u64>,
    /// Creation time
    pub creation_date: Option<DateTime<Utc>>,
    /// Last content change time
    pub content_change_date: Option<DateTime<Utc>>,
    /// Whether conflicting versions are waiting to be resolved
    pub has_unresolved_conflicts: Option<bool>,
    /// Local materialization state
    pub download_status: Option<DownloadStatus>,
    /// Whether the sync daemon is fetching the item right now
    pub is_downloading: Option<bool>,
    /// Whether the item's content has reached the cloud
    pub is_uploaded: Option<bool>,
    /// Whether the sync daemon is sending the item right now
    pub is_uploading: Option<bool>,
    /// Upload progress, 0-100
    pub percent_uploaded: Option<f64>,
    /// Download progress, 0-100
    pub percent_downloaded: Option<f64>,
    /// Last upload failure reported by the sync daemon
    pub uploading_error: Option<String>,
    /// Last download failure reported by the sync daemon
    pub downloading_error: Option<String>,
}

impl RawEntry {
    /// Create an entry that only knows its path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}
