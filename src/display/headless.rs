//! Display implementation without a window, used by the CLI and in tests.
//!
//! A headless display records the coordinates it was asked to show and can
//! be flagged as holding unsaved changes, in which case it refuses to close.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::display::controls::AcquisitionControls;
use crate::display::display_trait::{Display, DisplayProvider};
use crate::storage::storage_trait::FrameStorage;
use crate::storage::types::{Coords, StorageId};

/// File, inside an acquisition directory, holding the saved display layout.
pub const DISPLAY_SETTINGS_FILE: &str = "display_settings.json";

/// Saved state of one display window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub position: Coords,
    pub zoom: f64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            position: Coords::default(),
            zoom: 1.0,
        }
    }
}

pub struct HeadlessDisplay {
    id: Uuid,
    storage_id: StorageId,
    controls: Option<AcquisitionControls>,
    settings: Mutex<DisplaySettings>,
    shown: Mutex<Vec<Coords>>,
    unsaved_changes: AtomicBool,
    closed: AtomicBool,
}

impl HeadlessDisplay {
    fn new(storage_id: StorageId, controls: Option<AcquisitionControls>, settings: DisplaySettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            storage_id,
            controls,
            settings: Mutex::new(settings),
            shown: Mutex::new(Vec::new()),
            unsaved_changes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn controls(&self) -> Option<&AcquisitionControls> {
        self.controls.as_ref()
    }

    pub fn settings(&self) -> DisplaySettings {
        lock(&self.settings).clone()
    }

    /// Coordinates shown so far, oldest first.
    pub fn shown_frames(&self) -> Vec<Coords> {
        lock(&self.shown).clone()
    }

    /// Marks the display as holding changes the user did not save.
    pub fn set_unsaved_changes(&self, unsaved: bool) {
        self.unsaved_changes.store(unsaved, Ordering::SeqCst);
    }

    /// Closes the display without asking, as a user closing the window would.
    pub fn close_out_of_band(&self) {
        debug!("[{}] Display closed by user", self.id);
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Display for HeadlessDisplay {
    fn id(&self) -> Uuid {
        self.id
    }

    fn storage_id(&self) -> StorageId {
        self.storage_id
    }

    fn show_frame(&self, coords: Coords) {
        if self.is_closed() {
            debug!("[{}] Ignoring frame {} on closed display", self.id, coords);
            return;
        }
        lock(&self.settings).position = coords;
        lock(&self.shown).push(coords);
    }

    fn request_close(&self) -> bool {
        if self.is_closed() {
            return true;
        }
        if self.unsaved_changes.load(Ordering::SeqCst) {
            warn!("[{}] Display has unsaved changes, refusing to close", self.id);
            return false;
        }
        self.closed.store(true, Ordering::SeqCst);
        debug!("[{}] Display closed", self.id);
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct HeadlessDisplayProvider {
    displays: Mutex<Vec<Arc<HeadlessDisplay>>>,
}

impl HeadlessDisplayProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every display created so far, closed ones included.
    pub fn headless_displays(&self) -> Vec<Arc<HeadlessDisplay>> {
        lock(&self.displays).clone()
    }

    /// Writes the layout of the open displays bound to `storage_id` into `dir`.
    pub fn save_display_settings(&self, storage_id: StorageId, dir: &Path) -> std::io::Result<()> {
        let layouts: Vec<DisplaySettings> = lock(&self.displays)
            .iter()
            .filter(|d| d.storage_id == storage_id && !d.is_closed())
            .map(|d| d.settings())
            .collect();
        let json = serde_json::to_vec_pretty(&layouts)?;
        fs::write(dir.join(DISPLAY_SETTINGS_FILE), json)?;
        info!("Saved {} display layout(s) to {}", layouts.len(), dir.display());
        Ok(())
    }

    fn register(&self, display: HeadlessDisplay) -> Arc<HeadlessDisplay> {
        let display = Arc::new(display);
        lock(&self.displays).push(display.clone());
        display
    }
}

impl DisplayProvider for HeadlessDisplayProvider {
    fn create_display(
        &self,
        storage: Arc<dyn FrameStorage>,
        controls: Option<AcquisitionControls>,
    ) -> Arc<dyn Display> {
        let display = self.register(HeadlessDisplay::new(
            storage.id(),
            controls,
            DisplaySettings::default(),
        ));
        debug!("[{}] Display created for storage {}", display.id, storage.id());
        display
    }

    fn load_display_settings(&self, storage: Arc<dyn FrameStorage>, dir: &Path) -> Vec<Arc<dyn Display>> {
        let path = dir.join(DISPLAY_SETTINGS_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!("No saved display layout in {}", dir.display());
                return Vec::new();
            }
        };
        let layouts: Vec<DisplaySettings> = match serde_json::from_slice(&bytes) {
            Ok(layouts) => layouts,
            Err(e) => {
                warn!("Ignoring unreadable display layout {}: {}", path.display(), e);
                return Vec::new();
            }
        };
        info!("Restoring {} display(s) from {}", layouts.len(), path.display());
        layouts
            .into_iter()
            .map(|settings| {
                let display: Arc<dyn Display> =
                    self.register(HeadlessDisplay::new(storage.id(), None, settings));
                display
            })
            .collect()
    }

    fn displays_for(&self, storage_id: StorageId) -> Vec<Arc<dyn Display>> {
        lock(&self.displays)
            .iter()
            .filter(|d| d.storage_id == storage_id && !d.is_closed())
            .map(|d| {
                let display: Arc<dyn Display> = d.clone();
                display
            })
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
