use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::display::controls::AcquisitionControls;
use crate::storage::storage_trait::FrameStorage;
use crate::storage::types::{Coords, StorageId};

/// A viewer bound to one storage backend.
///
/// Every method is called from the UI dispatch thread, except `is_closed`
/// which may be polled from anywhere.
pub trait Display: Send + Sync {
    fn id(&self) -> Uuid;

    /// Backend this display renders.
    fn storage_id(&self) -> StorageId;

    fn show_frame(&self, coords: Coords);

    /// Asks the display to close. Returns `false` when it refuses, e.g. the
    /// user kept unsaved changes open.
    fn request_close(&self) -> bool;

    fn is_closed(&self) -> bool;
}

/// Creates displays and keeps track of the ones that are open.
pub trait DisplayProvider: Send + Sync {
    /// Creates a display bound to `storage`, with acquisition controls when given.
    fn create_display(
        &self,
        storage: Arc<dyn FrameStorage>,
        controls: Option<AcquisitionControls>,
    ) -> Arc<dyn Display>;

    /// Rebuilds the displays saved with the acquisition in `dir`.
    ///
    /// Returns an empty list when the directory holds no saved layout.
    fn load_display_settings(&self, storage: Arc<dyn FrameStorage>, dir: &Path) -> Vec<Arc<dyn Display>>;

    /// Open displays bound to the backend `storage_id`.
    fn displays_for(&self, storage_id: StorageId) -> Vec<Arc<dyn Display>>;
}
