//! Pieces shared by the two on-disk backends: the summary file and format probing.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info};

use crate::error_handling::types::StorageError;
use crate::storage::backend::StorageBackend;
use crate::storage::multipage_storage::{MultipageStorage, STACK_EXTENSION};
use crate::storage::single_plane_storage::{SinglePlaneStorage, PLANE_EXTENSION};
use crate::storage::types::SummaryMetadata;

/// File holding the summary metadata of a disk acquisition.
pub const SUMMARY_FILE: &str = "summary.json";

pub(crate) fn write_summary(dir: &Path, summary: &SummaryMetadata) -> Result<(), StorageError> {
    let path = dir.join(SUMMARY_FILE);
    let tmp = dir.join(format!("{}.tmp", SUMMARY_FILE));
    let bytes = serde_json::to_vec_pretty(summary).map_err(|e| {
        error!("Failed to encode summary metadata for {}: {}", dir.display(), e);
        StorageError::WriteFailed(e.to_string())
    })?;
    fs::write(&tmp, bytes).map_err(|e| {
        error!("Failed to write {}: {}", tmp.display(), e);
        StorageError::WriteFailed(format!("{}: {}", tmp.display(), e))
    })?;
    fs::rename(&tmp, &path).map_err(|e| {
        error!("Failed to move {} into place: {}", path.display(), e);
        StorageError::WriteFailed(format!("{}: {}", path.display(), e))
    })?;
    debug!("Wrote summary metadata to {}", path.display());
    Ok(())
}

pub(crate) fn read_summary(dir: &Path) -> Result<Option<SummaryMetadata>, StorageError> {
    let path = dir.join(SUMMARY_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path).map_err(|e| {
        error!("Failed to read {}: {}", path.display(), e);
        StorageError::ReadFailed(format!("{}: {}", path.display(), e))
    })?;
    let summary = serde_json::from_slice(&bytes).map_err(|e| {
        error!("Invalid summary metadata in {}: {}", path.display(), e);
        StorageError::Corrupted(format!("{}: {}", path.display(), e))
    })?;
    Ok(Some(summary))
}

pub(crate) fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, StorageError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        error!("Failed to read directory {}: {}", dir.display(), e);
        StorageError::ReadFailed(format!("{}: {}", dir.display(), e))
    })?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some(extension) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// On-disk layouts an existing acquisition directory can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFormat {
    MultiPage,
    SinglePlaneSeries,
}

impl DiskFormat {
    /// Inspects `dir` to find which layout it was written in.
    pub fn probe(dir: &Path) -> Result<DiskFormat, StorageError> {
        if !dir.is_dir() {
            return Err(StorageError::FormatNotRecognized(dir.to_path_buf()));
        }
        if !files_with_extension(dir, STACK_EXTENSION)?.is_empty() {
            return Ok(DiskFormat::MultiPage);
        }
        if dir.join(SUMMARY_FILE).exists() || !files_with_extension(dir, PLANE_EXTENSION)?.is_empty() {
            return Ok(DiskFormat::SinglePlaneSeries);
        }
        Err(StorageError::FormatNotRecognized(dir.to_path_buf()))
    }
}

/// Opens the acquisition stored in `dir` with the reader matching its layout.
///
/// The returned backend is frozen.
pub fn open_existing(dir: &Path) -> Result<StorageBackend, StorageError> {
    let format = DiskFormat::probe(dir)?;
    info!("Opening {} as {:?}", dir.display(), format);
    match format {
        DiskFormat::MultiPage => Ok(StorageBackend::MultiPage(MultipageStorage::open(dir)?.into())),
        DiskFormat::SinglePlaneSeries => Ok(StorageBackend::SinglePlaneSeries(
            SinglePlaneStorage::open(dir)?.into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::StorageKind;
    use tempfile::TempDir;

    #[test]
    fn summary_roundtrip() {
        let dir = TempDir::new().unwrap();
        assert!(read_summary(dir.path()).unwrap().is_none());

        let summary = SummaryMetadata {
            prefix: Some("Acq_4".into()),
            frames: Some(10),
            ..Default::default()
        };
        write_summary(dir.path(), &summary).unwrap();
        assert_eq!(read_summary(dir.path()).unwrap(), Some(summary));
        assert!(!dir.path().join("summary.json.tmp").exists());
    }

    #[test]
    fn probe_detects_each_layout() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DiskFormat::probe(dir.path()),
            Err(StorageError::FormatNotRecognized(_))
        ));
        assert!(DiskFormat::probe(&dir.path().join("missing")).is_err());

        let single = dir.path().join("single");
        fs::create_dir(&single).unwrap();
        write_summary(&single, &SummaryMetadata::default()).unwrap();
        assert_eq!(DiskFormat::probe(&single).unwrap(), DiskFormat::SinglePlaneSeries);

        let multi = dir.path().join("multi");
        MultipageStorage::create(&multi).unwrap();
        assert_eq!(DiskFormat::probe(&multi).unwrap(), DiskFormat::MultiPage);

        let backend = open_existing(&multi).unwrap();
        assert_eq!(backend.kind(), StorageKind::MultiPage);
        assert!(backend.storage().is_frozen());
    }

    #[test]
    fn corrupted_summary_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SUMMARY_FILE), b"{not json").unwrap();
        assert!(matches!(read_summary(dir.path()), Err(StorageError::Corrupted(_))));
    }
}
