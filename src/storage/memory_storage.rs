use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::FrameStorage;
use crate::storage::types::{Coords, StorageId, StorageKind, SummaryMetadata, TaggedFrame};

#[derive(Default)]
struct MemoryInner {
    frames: BTreeMap<Coords, TaggedFrame>,
    summary: Option<SummaryMetadata>,
    frozen: bool,
    data_size: u64,
}

/// Memory-resident backend. Frames live in a coordinate-ordered map.
pub struct MemoryStorage {
    id: StorageId,
    save_path: Option<PathBuf>,
    inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let storage = Self {
            id: Uuid::new_v4(),
            save_path: None,
            inner: Mutex::new(MemoryInner::default()),
        };
        debug!("[{}] MemoryStorage created", storage.id);
        storage
    }

    /// Builds a memory copy of `source`: summary metadata and every frame.
    ///
    /// `save_path` records where the data came from; the copy never writes there.
    pub fn copy_from(
        source: &dyn FrameStorage,
        save_path: Option<PathBuf>,
    ) -> Result<Self, StorageError> {
        let storage = Self {
            id: Uuid::new_v4(),
            save_path,
            inner: Mutex::new(MemoryInner::default()),
        };
        if let Some(summary) = source.summary_metadata() {
            storage.set_summary_metadata(summary)?;
        }
        let coords = source.coords();
        for c in &coords {
            match source.frame(c)? {
                Some(frame) => storage.accept_frame(frame)?,
                None => {
                    return Err(StorageError::ReadFailed(format!(
                        "frame at {} listed but not readable",
                        c
                    )))
                }
            }
        }
        info!(
            "[{}] Copied {} frame(s) from {} storage {}",
            storage.id,
            coords.len(),
            source.kind(),
            source.id()
        );
        Ok(storage)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStorage for MemoryStorage {
    fn id(&self) -> StorageId {
        self.id
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Memory
    }

    fn accept_frame(&self, frame: TaggedFrame) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.frozen {
            return Err(StorageError::Frozen);
        }
        let coords = frame.coords();
        let len = frame.pixels.len() as u64;
        if let Some(old) = inner.frames.insert(coords, frame) {
            inner.data_size -= old.pixels.len() as u64;
        }
        inner.data_size += len;
        debug!("[{}] Stored frame at {}", self.id, coords);
        Ok(())
    }

    fn set_summary_metadata(&self, summary: SummaryMetadata) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.frozen || inner.summary.is_some() {
            return Err(StorageError::Frozen);
        }
        inner.summary = Some(summary);
        Ok(())
    }

    fn summary_metadata(&self) -> Option<SummaryMetadata> {
        self.lock().summary.clone()
    }

    fn coords(&self) -> Vec<Coords> {
        self.lock().frames.keys().copied().collect()
    }

    fn frame(&self, coords: &Coords) -> Result<Option<TaggedFrame>, StorageError> {
        Ok(self.lock().frames.get(coords).cloned())
    }

    fn freeze(&self) {
        self.lock().frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.lock().frozen
    }

    fn save_path(&self) -> Option<PathBuf> {
        self.save_path.clone()
    }

    fn data_size_bytes(&self) -> u64 {
        self.lock().data_size
    }
}
