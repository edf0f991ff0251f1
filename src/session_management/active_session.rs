use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};

use crate::display::Display;
use crate::error_handling::types::AcquisitionError;
use crate::session_management::context::AcquisitionContext;
use crate::session_management::session::{
    default_display, request_display_close, show_on_display, Acquisition, AcquisitionExtent, ImageDimensions,
    InsertOutcome, PendingAcquisition,
};
use crate::session_management::{AcquisitionMode, SessionState};
use crate::storage::types::{Coords, StorageKind, SummaryMetadata, TaggedFrame};
use crate::storage::FrameStorage;

/// Shared handle to one acquisition held by a registry.
///
/// Configuration, `initialize` and `close` take the write lock; frame
/// insertion takes the read lock so several producers can insert at once.
/// No lock is held while waiting on the UI thread.
#[derive(Clone)]
pub struct AcquisitionHandle {
    name: String,
    mode: AcquisitionMode,
    state: Arc<RwLock<SessionState>>,
    context: Arc<AcquisitionContext>,
    /// Set when a vetoed display sweep closed this display; keeps the acquisition live.
    retained: Arc<AtomicBool>,
}

impl fmt::Debug for AcquisitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionHandle")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish()
    }
}

impl AcquisitionHandle {
    pub(crate) fn pending(pending: PendingAcquisition, context: Arc<AcquisitionContext>) -> Self {
        Self {
            name: pending.name().to_string(),
            mode: pending.mode(),
            state: Arc::new(RwLock::new(SessionState::Uninitialized(pending))),
            context,
            retained: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn initialized(acquisition: Acquisition, context: Arc<AcquisitionContext>) -> Self {
        Self {
            name: acquisition.name().to_string(),
            mode: acquisition.mode(),
            state: Arc::new(RwLock::new(SessionState::Initialized(acquisition))),
            context,
            retained: Arc::new(AtomicBool::new(false)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn configure<F>(&self, apply: F) -> Result<(), AcquisitionError>
    where
        F: FnOnce(&mut PendingAcquisition),
    {
        match &mut *self.write() {
            SessionState::Uninitialized(pending) => {
                apply(pending);
                Ok(())
            }
            SessionState::Initialized(_) => Err(AcquisitionError::AlreadyInitialized),
        }
    }

    fn with_acquisition<T, F>(&self, read: F) -> Result<T, AcquisitionError>
    where
        F: FnOnce(&Acquisition) -> T,
    {
        match &*self.read() {
            SessionState::Initialized(acquisition) => Ok(read(acquisition)),
            SessionState::Uninitialized(_) => Err(AcquisitionError::NotInitialized),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn is_initialized(&self) -> bool {
        matches!(&*self.read(), SessionState::Initialized(_))
    }

    pub fn set_dimensions(&self, frames: u32, channels: u32, slices: u32, positions: u32) -> Result<(), AcquisitionError> {
        self.configure(|p| p.set_dimensions(frames, channels, slices, positions))
    }

    pub fn set_stack_dimensions(&self, frames: u32, channels: u32, slices: u32) -> Result<(), AcquisitionError> {
        self.configure(|p| p.set_stack_dimensions(frames, channels, slices))
    }

    pub fn set_physical_dimensions(
        &self,
        width: u32,
        height: u32,
        byte_depth: u32,
        bit_depth: u32,
        channels_per_camera: u32,
    ) -> Result<(), AcquisitionError> {
        self.configure(|p| p.set_physical_dimensions(width, height, byte_depth, bit_depth, channels_per_camera))
    }

    pub fn set_root_directory(&self, root: impl Into<PathBuf>) -> Result<(), AcquisitionError> {
        let root = root.into();
        self.configure(|p| p.set_root_directory(root))
    }

    /// Binds the backend, then the display when the acquisition is shown.
    pub fn initialize(&self) -> Result<(), AcquisitionError> {
        {
            let mut state = self.write();
            let acquisition = match &*state {
                SessionState::Uninitialized(pending) => pending.bind(&self.context)?,
                SessionState::Initialized(_) => return Err(AcquisitionError::AlreadyInitialized),
            };
            *state = SessionState::Initialized(acquisition);
        }
        if self.mode.show {
            // built outside the lock: the UI thread may be waiting on it
            let storage = self.with_acquisition(Acquisition::storage)?;
            let display = default_display(&self.context, &self.name, self.mode, storage);
            self.attach_display(display);
        }
        info!("[{}] Acquisition ready", self.name);
        Ok(())
    }

    pub(crate) fn attach_display(&self, display: Option<Arc<dyn Display>>) {
        if let SessionState::Initialized(acquisition) = &mut *self.write() {
            if acquisition.display().is_none() {
                acquisition.set_display(display);
            }
        }
    }

    pub fn dimensions(&self) -> ImageDimensions {
        match &*self.read() {
            SessionState::Uninitialized(p) => p.dimensions(),
            SessionState::Initialized(a) => a.dimensions(),
        }
    }

    pub fn extent(&self) -> AcquisitionExtent {
        match &*self.read() {
            SessionState::Uninitialized(p) => p.extent(),
            SessionState::Initialized(a) => a.extent(),
        }
    }

    pub fn display(&self) -> Option<Arc<dyn Display>> {
        match &*self.read() {
            SessionState::Initialized(a) => a.display(),
            SessionState::Uninitialized(_) => None,
        }
    }

    pub fn storage(&self) -> Option<Arc<dyn FrameStorage>> {
        self.with_acquisition(Acquisition::storage).ok()
    }

    pub fn storage_kind(&self) -> Option<StorageKind> {
        self.with_acquisition(Acquisition::storage_kind).ok()
    }

    pub fn save_path(&self) -> Option<PathBuf> {
        self.with_acquisition(Acquisition::save_path).ok().flatten()
    }

    pub fn summary_metadata(&self) -> Option<SummaryMetadata> {
        self.with_acquisition(Acquisition::summary_metadata).ok().flatten()
    }

    pub fn last_acquired_frame(&self) -> Result<u32, AcquisitionError> {
        self.with_acquisition(Acquisition::last_acquired_frame)
    }

    /// Live unless it is shown and its display was closed outside a vetoed sweep.
    pub fn is_live(&self) -> bool {
        if !self.mode.show || self.retained.load(Ordering::SeqCst) {
            return true;
        }
        match self.display() {
            Some(display) => !display.is_closed(),
            None => true,
        }
    }

    pub fn insert_frame(
        &self,
        frame: TaggedFrame,
        coords: Coords,
        update_display: bool,
        wait_for_display: bool,
    ) -> Result<InsertOutcome, AcquisitionError> {
        let (outcome, display) = {
            let state = self.read();
            match &*state {
                SessionState::Initialized(a) => (a.commit_frame(frame, coords)?, a.display()),
                SessionState::Uninitialized(_) => return Err(AcquisitionError::NotInitialized),
            }
        };
        if update_display && outcome != InsertOutcome::Dropped {
            if let Some(display) = display {
                show_on_display(&self.context.ui, &self.name, display, coords, wait_for_display);
            }
        }
        Ok(outcome)
    }

    pub(crate) fn set_retained(&self, retained: bool) {
        self.retained.store(retained, Ordering::SeqCst);
    }

    /// Inserts at `coords`, updating the display when the acquisition is shown.
    pub fn insert(&self, frame: TaggedFrame, coords: Coords) -> Result<InsertOutcome, AcquisitionError> {
        self.insert_frame(frame, coords, self.mode.show, true)
    }

    /// Inserts at position 0.
    pub fn insert_plane(
        &self,
        frame: TaggedFrame,
        frame_index: u32,
        channel: u32,
        slice: u32,
    ) -> Result<InsertOutcome, AcquisitionError> {
        self.insert(frame, Coords::new(frame_index, channel, slice, 0))
    }

    /// Asks the display to close. Closing twice, or closing an acquisition
    /// that never initialized, does nothing.
    pub fn close(&self) -> Result<(), AcquisitionError> {
        debug!("[{}] Closing acquisition", self.name);
        request_display_close(&self.context.ui, &self.name, self.display())
    }
}
