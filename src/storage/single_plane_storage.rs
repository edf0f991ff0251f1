//! Single-plane series backend: one pixel file plus one tag sidecar per plane.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::file_storage::{files_with_extension, read_summary, write_summary};
use crate::storage::storage_trait::FrameStorage;
use crate::storage::types::{Coords, FrameTags, StorageId, StorageKind, SummaryMetadata, TaggedFrame};

pub const PLANE_EXTENSION: &str = "plane";
const TAGS_EXTENSION: &str = "json";
const PLANE_PREFIX: &str = "img_";

/// File stem of the plane at `coords`, e.g. `img_channel000_position000_time000000003_z002`.
pub fn plane_stem(coords: &Coords) -> String {
    format!(
        "{}channel{:03}_position{:03}_time{:09}_z{:03}",
        PLANE_PREFIX, coords.channel, coords.position, coords.frame, coords.slice
    )
}

struct SinglePlaneInner {
    index: BTreeMap<Coords, (FrameTags, u64)>,
    summary: Option<SummaryMetadata>,
    frozen: bool,
    data_size: u64,
}

pub struct SinglePlaneStorage {
    id: StorageId,
    dir: PathBuf,
    inner: Mutex<SinglePlaneInner>,
}

impl SinglePlaneStorage {
    /// Creates a writable series in `dir`, creating the directory as needed.
    pub fn create(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create acquisition dir {}: {}", dir.display(), e);
            StorageError::WriteFailed(format!("{}: {}", dir.display(), e))
        })?;
        let storage = Self {
            id: Uuid::new_v4(),
            dir: dir.to_path_buf(),
            inner: Mutex::new(SinglePlaneInner {
                index: BTreeMap::new(),
                summary: None,
                frozen: false,
                data_size: 0,
            }),
        };
        info!("[{}] SinglePlaneStorage created at {}", storage.id, dir.display());
        Ok(storage)
    }

    /// Opens the series in `dir` read-only. The backend starts frozen.
    ///
    /// Sidecars whose pixel file is missing are skipped with a warning.
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        let mut index = BTreeMap::new();
        let mut data_size = 0u64;
        for sidecar in files_with_extension(dir, TAGS_EXTENSION)? {
            let is_plane = sidecar
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.starts_with(PLANE_PREFIX))
                .unwrap_or(false);
            if !is_plane {
                continue;
            }
            let plane = sidecar.with_extension(PLANE_EXTENSION);
            let len = match fs::metadata(&plane) {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!("Skipping {}: no pixel data ({})", sidecar.display(), e);
                    continue;
                }
            };
            let bytes = fs::read(&sidecar).map_err(|e| {
                error!("Failed to read {}: {}", sidecar.display(), e);
                StorageError::ReadFailed(format!("{}: {}", sidecar.display(), e))
            })?;
            let tags: FrameTags = serde_json::from_slice(&bytes).map_err(|e| {
                error!("Invalid frame tags in {}: {}", sidecar.display(), e);
                StorageError::Corrupted(format!("{}: {}", sidecar.display(), e))
            })?;
            data_size += len;
            index.insert(tags.coords(), (tags, len));
        }
        let summary = read_summary(dir)?;

        let storage = Self {
            id: Uuid::new_v4(),
            dir: dir.to_path_buf(),
            inner: Mutex::new(SinglePlaneInner {
                index,
                summary,
                frozen: true,
                data_size,
            }),
        };
        info!(
            "[{}] SinglePlaneStorage opened {} with {} plane(s)",
            storage.id,
            dir.display(),
            storage.lock().index.len()
        );
        Ok(storage)
    }

    fn lock(&self) -> MutexGuard<'_, SinglePlaneInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameStorage for SinglePlaneStorage {
    fn id(&self) -> StorageId {
        self.id
    }

    fn kind(&self) -> StorageKind {
        StorageKind::SinglePlaneSeries
    }

    fn accept_frame(&self, frame: TaggedFrame) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.frozen {
            return Err(StorageError::Frozen);
        }
        let coords = frame.coords();
        let stem = plane_stem(&coords);
        let plane = self.dir.join(format!("{}.{}", stem, PLANE_EXTENSION));
        let sidecar = self.dir.join(format!("{}.{}", stem, TAGS_EXTENSION));

        // pixels first: a sidecar on disk always has its pixel file
        fs::write(&plane, &frame.pixels).map_err(|e| {
            error!("Failed to write {}: {}", plane.display(), e);
            StorageError::WriteFailed(format!("{}: {}", plane.display(), e))
        })?;
        let tags = serde_json::to_vec_pretty(&frame.tags)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        fs::write(&sidecar, tags).map_err(|e| {
            error!("Failed to write {}: {}", sidecar.display(), e);
            StorageError::WriteFailed(format!("{}: {}", sidecar.display(), e))
        })?;

        let len = frame.pixels.len() as u64;
        if let Some((_, old)) = inner.index.insert(coords, (frame.tags, len)) {
            inner.data_size -= old;
        }
        inner.data_size += len;
        debug!("[{}] Wrote plane {}", self.id, plane.display());
        Ok(())
    }

    fn set_summary_metadata(&self, summary: SummaryMetadata) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.frozen || inner.summary.is_some() {
            return Err(StorageError::Frozen);
        }
        write_summary(&self.dir, &summary)?;
        inner.summary = Some(summary);
        Ok(())
    }

    fn summary_metadata(&self) -> Option<SummaryMetadata> {
        self.lock().summary.clone()
    }

    fn coords(&self) -> Vec<Coords> {
        self.lock().index.keys().copied().collect()
    }

    fn frame(&self, coords: &Coords) -> Result<Option<TaggedFrame>, StorageError> {
        let tags = match self.lock().index.get(coords) {
            Some((tags, _)) => tags.clone(),
            None => return Ok(None),
        };
        let plane = self
            .dir
            .join(format!("{}.{}", plane_stem(coords), PLANE_EXTENSION));
        let pixels = fs::read(&plane).map_err(|e| {
            error!("Failed to read {}: {}", plane.display(), e);
            StorageError::ReadFailed(format!("{}: {}", plane.display(), e))
        })?;
        Ok(Some(TaggedFrame { pixels, tags }))
    }

    fn freeze(&self) {
        self.lock().frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.lock().frozen
    }

    fn save_path(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }

    fn data_size_bytes(&self) -> u64 {
        self.lock().data_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{Axis, PixelType};
    use tempfile::TempDir;

    fn frame_at(c: Coords) -> TaggedFrame {
        let mut tags = FrameTags::new(2, 2, PixelType::Gray8);
        tags.set_coords(c);
        TaggedFrame::new(vec![c.slice as u8; 4], tags)
    }

    #[test]
    fn plane_names_follow_series_convention() {
        assert_eq!(
            plane_stem(&Coords::new(3, 1, 2, 0)),
            "img_channel001_position000_time000000003_z002"
        );
    }

    #[test]
    fn planes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let storage = SinglePlaneStorage::create(dir.path()).unwrap();
        for z in 0..3 {
            storage.accept_frame(frame_at(Coords::new(0, 0, z, 0))).unwrap();
        }
        storage
            .set_summary_metadata(SummaryMetadata {
                slices: Some(3),
                ..Default::default()
            })
            .unwrap();
        drop(storage);

        let reopened = SinglePlaneStorage::open(dir.path()).unwrap();
        assert!(reopened.is_frozen());
        assert_eq!(reopened.axis_length(Axis::Slice), 3);
        assert_eq!(reopened.data_size_bytes(), 12);
        assert_eq!(reopened.summary_metadata().unwrap().slices, Some(3));
        assert_eq!(
            reopened.frame(&Coords::new(0, 0, 2, 0)).unwrap().unwrap().pixels,
            vec![2; 4]
        );
        assert!(reopened.frame(&Coords::new(5, 0, 0, 0)).unwrap().is_none());
    }

    #[test]
    fn orphan_sidecar_is_skipped() {
        let dir = TempDir::new().unwrap();
        let storage = SinglePlaneStorage::create(dir.path()).unwrap();
        storage.accept_frame(frame_at(Coords::new(0, 0, 0, 0))).unwrap();
        storage.accept_frame(frame_at(Coords::new(1, 0, 0, 0))).unwrap();
        drop(storage);

        let stem = plane_stem(&Coords::new(1, 0, 0, 0));
        fs::remove_file(dir.path().join(format!("{}.plane", stem))).unwrap();

        let reopened = SinglePlaneStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.coords(), vec![Coords::new(0, 0, 0, 0)]);
    }
}
