use std::sync::Arc;

use crate::storage::memory_storage::MemoryStorage;
use crate::storage::multipage_storage::MultipageStorage;
use crate::storage::single_plane_storage::SinglePlaneStorage;
use crate::storage::storage_trait::FrameStorage;
use crate::storage::types::StorageKind;

/// The backend bound to an acquisition: exactly one of the three variants.
#[derive(Clone)]
pub enum StorageBackend {
    Memory(Arc<MemoryStorage>),
    MultiPage(Arc<MultipageStorage>),
    SinglePlaneSeries(Arc<SinglePlaneStorage>),
}

impl StorageBackend {
    pub fn kind(&self) -> StorageKind {
        match self {
            StorageBackend::Memory(_) => StorageKind::Memory,
            StorageBackend::MultiPage(_) => StorageKind::MultiPage,
            StorageBackend::SinglePlaneSeries(_) => StorageKind::SinglePlaneSeries,
        }
    }

    /// The backend behind the uniform storage capability.
    pub fn storage(&self) -> Arc<dyn FrameStorage> {
        match self {
            StorageBackend::Memory(s) => s.clone(),
            StorageBackend::MultiPage(s) => s.clone(),
            StorageBackend::SinglePlaneSeries(s) => s.clone(),
        }
    }

    pub fn is_disk_backed(&self) -> bool {
        !matches!(self, StorageBackend::Memory(_))
    }
}

impl std::fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage();
        f.debug_struct("StorageBackend")
            .field("kind", &self.kind())
            .field("id", &storage.id())
            .field("save_path", &storage.save_path())
            .finish()
    }
}
