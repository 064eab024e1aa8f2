//! File entry mapping
//!
//! Converts raw index entries into [`FileRecord`] values relative to a
//! container root. Hidden entries and entries outside the root are dropped;
//! missing attributes stay missing.

use tracing::trace;
use ubiq_core::domain::{ContainerRoot, FileRecord, RawEntry};

/// Maps one raw entry, or returns `None` if it must be skipped
///
/// The relative path is the absolute path with the root prefix removed byte
/// for byte, so `root.prefix() + relative_path` always reproduces the
/// absolute path.
#[must_use]
pub fn map_entry(entry: &RawEntry, root: &ContainerRoot) -> Option<FileRecord> {
    if entry.is_hidden {
        trace!(path = %entry.path.display(), "Skipping hidden entry");
        return None;
    }

    let Some(relative_path) = root.relative_of(&entry.path) else {
        trace!(path = %entry.path.display(), root = %root, "Entry outside container root");
        return None;
    };

    Some(FileRecord {
        relative_path,
        absolute_path: entry.path.clone(),
        is_directory: entry.is_directory,
        display_name: entry.display_name.clone(),
        file_system_name: entry.fs_name.clone(),
        size_in_bytes: entry.fs_size,
        creation_date: entry.creation_date,
        content_change_date: entry.content_change_date,
        has_unresolved_conflicts: entry.has_unresolved_conflicts,
        download_status: entry.download_status,
        is_downloading: entry.is_downloading,
        is_uploaded: entry.is_uploaded,
        is_uploading: entry.is_uploading,
    })
}

/// Maps a whole snapshot, preserving order
#[must_use]
pub fn map_entries(entries: &[RawEntry], root: &ContainerRoot) -> Vec<FileRecord> {
    entries.iter().filter_map(|e| map_entry(e, root)).collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{DateTime, Utc};
    use ubiq_core::domain::DownloadStatus;

    use super::*;

    fn root() -> ContainerRoot {
        ContainerRoot::new("/c/app").unwrap()
    }

    #[test]
    fn test_hidden_entries_never_mapped() {
        let entries: Vec<RawEntry> = (0..10)
            .map(|i| RawEntry {
                is_hidden: i % 3 == 0,
                ..RawEntry::new(format!("/c/app/f{i}"))
            })
            .collect();

        let records = map_entries(&entries, &root());
        assert_eq!(records.len(), 6);
        for record in &records {
            let source = entries
                .iter()
                .find(|e| e.path == record.absolute_path)
                .unwrap();
            assert!(!source.is_hidden);
        }
    }

    #[test]
    fn test_relative_path_reconstructs_absolute() {
        let root = root();
        for path in ["/c/app/a.txt", "/c/app/Documents/x/y.md", "/c/app/.git-keep/z"] {
            let record = map_entry(&RawEntry::new(path), &root).unwrap();
            assert_eq!(
                format!("{}{}", root.prefix(), record.relative_path),
                record.absolute_path.to_string_lossy()
            );
        }
    }

    #[test]
    fn test_entries_outside_root_skipped() {
        assert!(map_entry(&RawEntry::new("/c/application/a"), &root()).is_none());
        assert!(map_entry(&RawEntry::new("/other/a"), &root()).is_none());
    }

    #[test]
    fn test_missing_attributes_stay_absent() {
        let record = map_entry(&RawEntry::new("/c/app/a.bin"), &root()).unwrap();
        assert_eq!(record.size_in_bytes, None);
        assert_eq!(record.creation_date, None);
        assert_eq!(record.download_status, None);
        assert_eq!(record.is_uploaded, None);
        assert_eq!(record.display_name, None);
    }

    #[test]
    fn test_attributes_copied() {
        let created: DateTime<Utc> = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let entry = RawEntry {
            is_directory: true,
            display_name: Some("Docs".into()),
            fs_name: Some("Docs".into()),
            fs_size: Some(0),
            creation_date: Some(created),
            download_status: Some(DownloadStatus::Current),
            has_unresolved_conflicts: Some(true),
            ..RawEntry::new("/c/app/Docs")
        };
        let record = map_entry(&entry, &root()).unwrap();
        assert_eq!(record.relative_path, "Docs");
        assert_eq!(record.absolute_path, PathBuf::from("/c/app/Docs"));
        assert!(record.is_directory);
        assert_eq!(record.size_in_bytes, Some(0));
        assert_eq!(record.creation_date, Some(created));
        assert_eq!(record.download_status, Some(DownloadStatus::Current));
        assert_eq!(record.has_unresolved_conflicts, Some(true));
    }
}
