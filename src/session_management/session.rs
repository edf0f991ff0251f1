//! The two states of an acquisition.
//!
//! A [`PendingAcquisition`] holds the configuration and is the only type with
//! setters. [`PendingAcquisition::initialize`] consumes that configuration
//! into an [`Acquisition`], which owns the bound backend and accepts frames.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::display::{AcquisitionControls, AcquisitionEngine, Display, UiDispatcher};
use crate::error_handling::types::{AcquisitionError, StorageError};
use crate::session_management::backend_selection::BackendPlan;
use crate::session_management::context::AcquisitionContext;
use crate::session_management::naming::reserve_directory;
use crate::session_management::summary::{default_summary, TIME_FORMAT};
use crate::session_management::AcquisitionMode;
use crate::storage::file_storage::open_existing;
use crate::storage::memory_storage::MemoryStorage;
use crate::storage::multipage_storage::MultipageStorage;
use crate::storage::types::{Axis, Coords, PixelType, StorageKind, SummaryMetadata, TaggedFrame};
use crate::storage::{FrameStorage, StorageBackend};

/// Share of the memory budget a reopened acquisition may fill.
const MEMORY_HEADROOM: f64 = 0.9;

/// Geometry of every plane in an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
    pub byte_depth: u32,
    pub bit_depth: u32,
    pub channels_per_camera: u32,
}

impl Default for ImageDimensions {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            byte_depth: 1,
            bit_depth: 8,
            channels_per_camera: 1,
        }
    }
}

/// Planned number of indices along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AcquisitionExtent {
    pub frames: u32,
    pub channels: u32,
    pub slices: u32,
    pub positions: u32,
}

impl Default for AcquisitionExtent {
    fn default() -> Self {
        Self {
            frames: 1,
            channels: 1,
            slices: 1,
            positions: 0,
        }
    }
}

/// What happened to an inserted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored as this many planes (more than one for multi-component frames).
    Committed(usize),
    /// The backend refused the frame; it was logged and discarded.
    Dropped,
}

#[derive(Debug)]
pub struct PendingAcquisition {
    name: String,
    mode: AcquisitionMode,
    root_directory: Option<PathBuf>,
    dimensions: ImageDimensions,
    extent: AcquisitionExtent,
}

impl PendingAcquisition {
    pub fn new(name: impl Into<String>, mode: AcquisitionMode) -> Self {
        Self {
            name: name.into(),
            mode,
            root_directory: None,
            dimensions: ImageDimensions::default(),
            extent: AcquisitionExtent::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn root_directory(&self) -> Option<&Path> {
        self.root_directory.as_deref()
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    pub fn extent(&self) -> AcquisitionExtent {
        self.extent
    }

    pub fn set_dimensions(&mut self, frames: u32, channels: u32, slices: u32, positions: u32) {
        self.extent = AcquisitionExtent {
            frames,
            channels,
            slices,
            positions,
        };
    }

    /// Same as [`set_dimensions`](Self::set_dimensions) for single-position acquisitions.
    pub fn set_stack_dimensions(&mut self, frames: u32, channels: u32, slices: u32) {
        self.set_dimensions(frames, channels, slices, 0);
    }

    pub fn set_physical_dimensions(
        &mut self,
        width: u32,
        height: u32,
        byte_depth: u32,
        bit_depth: u32,
        channels_per_camera: u32,
    ) {
        self.dimensions = ImageDimensions {
            width,
            height,
            byte_depth,
            bit_depth,
            channels_per_camera,
        };
    }

    pub fn set_root_directory(&mut self, root: impl Into<PathBuf>) {
        self.root_directory = Some(root.into());
    }

    /// Binds a backend and, when the acquisition is shown, a display.
    ///
    /// Consumes the configuration. On error nothing is bound and the
    /// configuration is handed back with the error so it can be fixed and retried.
    pub fn initialize(self, ctx: &AcquisitionContext) -> Result<Acquisition, (PendingAcquisition, AcquisitionError)> {
        let mut acquisition = match self.bind(ctx) {
            Ok(acquisition) => acquisition,
            Err(e) => return Err((self, e)),
        };
        if self.mode.show {
            let display = default_display(ctx, &self.name, self.mode, acquisition.storage());
            acquisition.set_display(display);
        }
        Ok(acquisition)
    }

    /// Binds the backend chosen by the mode flags and commits default summary
    /// metadata when the backend has none. Does not touch the UI thread.
    pub(crate) fn bind(&self, ctx: &AcquisitionContext) -> Result<Acquisition, AcquisitionError> {
        let plan = BackendPlan::select(self.mode.disk_cached, self.mode.existing);
        info!("[{}] Initializing acquisition ({:?})", self.name, plan);

        let mut prefix = self.name.clone();
        let mut directory = None;
        let backend = match plan {
            BackendPlan::OpenOnDisk => {
                let dir = self.resolve_root(ctx)?.join(&self.name);
                open_for_reading(&dir)?
            }
            BackendPlan::CreateOnDisk => {
                let root = self.resolve_root(ctx)?;
                let mut dir = root.join(&self.name);
                if dir.exists() {
                    let (fresh, path) = reserve_directory(&root, &self.name)?;
                    info!("[{}] {} already exists, saving to {}", self.name, dir.display(), fresh);
                    prefix = fresh;
                    dir = path;
                }
                let storage = MultipageStorage::create(&dir).map_err(|e| {
                    AcquisitionError::DirectoryResolutionFailed(format!("{}: {}", dir.display(), e))
                })?;
                directory = Some(root);
                StorageBackend::MultiPage(Arc::new(storage))
            }
            BackendPlan::InMemory => StorageBackend::Memory(Arc::new(MemoryStorage::new())),
            BackendPlan::CopyIntoMemory => {
                let dir = self.resolve_root(ctx)?.join(&self.name);
                let reader = open_for_reading(&dir)?.storage();
                let required = reader.data_size_bytes();
                let available = ctx.settings.memory_budget_bytes();
                if required as f64 > MEMORY_HEADROOM * available as f64 {
                    error!(
                        "[{}] {} bytes do not fit in the {} byte memory budget",
                        self.name, required, available
                    );
                    return Err(AcquisitionError::InsufficientMemory { required, available });
                }
                let copy = MemoryStorage::copy_from(reader.as_ref(), Some(dir))?;
                StorageBackend::Memory(Arc::new(copy))
            }
        };
        let storage = backend.storage();

        let mut dimensions = self.dimensions;
        let mut extent = self.extent;
        if plan.reads_existing() {
            match storage.summary_metadata() {
                Some(summary) => adopt_summary(&summary, &mut dimensions, &mut extent),
                None => warn!("[{}] Existing acquisition has no summary metadata", self.name),
            }
        }

        let start_time = Utc::now();
        if storage.summary_metadata().is_none() {
            let summary = default_summary(
                &prefix,
                directory.as_deref(),
                &dimensions,
                &extent,
                ctx.instrument.as_ref(),
                start_time,
            );
            commit_summary(&self.name, storage.as_ref(), summary)?;
        }

        info!(
            "[{}] Initialized with {} storage{}",
            self.name,
            backend.kind(),
            storage
                .save_path()
                .map(|p| format!(" at {}", p.display()))
                .unwrap_or_default()
        );
        Ok(Acquisition {
            name: self.name.clone(),
            mode: self.mode,
            dimensions,
            extent,
            backend,
            display: None,
            start_time,
            ui: ctx.ui.clone(),
        })
    }

    fn resolve_root(&self, ctx: &AcquisitionContext) -> Result<PathBuf, AcquisitionError> {
        self.root_directory
            .clone()
            .or_else(|| ctx.settings.root_directory.clone())
            .ok_or_else(|| {
                error!("[{}] No root directory configured", self.name);
                AcquisitionError::DirectoryResolutionFailed(format!(
                    "no root directory for {}",
                    self.name
                ))
            })
    }
}

pub struct Acquisition {
    name: String,
    mode: AcquisitionMode,
    dimensions: ImageDimensions,
    extent: AcquisitionExtent,
    backend: StorageBackend,
    display: Option<Arc<dyn Display>>,
    start_time: DateTime<Utc>,
    ui: UiDispatcher,
}

impl Acquisition {
    /// Builds an initialized acquisition from summary metadata supplied by an
    /// acquisition engine.
    ///
    /// A non-empty `Directory` in the summary selects a fresh `Prefix_N` directory
    /// under it and a multi-page backend; otherwise frames stay in memory. When
    /// the directory cannot be prepared the engine is stopped. The display is
    /// left to the caller.
    pub(crate) fn from_summary(
        name: &str,
        mut summary: SummaryMetadata,
        disk_cached: bool,
        show: bool,
        engine: Option<&Arc<dyn AcquisitionEngine>>,
        ctx: &AcquisitionContext,
    ) -> Result<Acquisition, AcquisitionError> {
        let directory = summary.directory.clone().filter(|d| !d.is_empty());
        let backend = match directory {
            Some(root) => {
                let root = PathBuf::from(root);
                let prefix = summary
                    .prefix
                    .clone()
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| name.to_string());
                let created = reserve_directory(&root, &prefix).and_then(|(fresh, dir)| {
                    MultipageStorage::create(&dir)
                        .map(|storage| (fresh, storage))
                        .map_err(|e| {
                            AcquisitionError::DirectoryResolutionFailed(format!("{}: {}", dir.display(), e))
                        })
                });
                match created {
                    Ok((fresh, storage)) => {
                        summary.prefix = Some(fresh);
                        StorageBackend::MultiPage(Arc::new(storage))
                    }
                    Err(e) => {
                        error!("[{}] Unable to prepare saving under {}: {}", name, root.display(), e);
                        if let Some(engine) = engine {
                            engine.stop(true);
                        }
                        return Err(e);
                    }
                }
            }
            None => {
                if disk_cached {
                    warn!("[{}] No save directory in summary metadata, keeping frames in memory", name);
                }
                StorageBackend::Memory(Arc::new(MemoryStorage::new()))
            }
        };

        let mut dimensions = ImageDimensions {
            byte_depth: ctx.instrument.bytes_per_pixel(),
            ..ImageDimensions::default()
        };
        let mut extent = AcquisitionExtent::default();
        adopt_summary(&summary, &mut dimensions, &mut extent);

        commit_summary(name, backend.storage().as_ref(), summary)?;
        info!("[{}] Created from summary metadata with {} storage", name, backend.kind());

        Ok(Acquisition {
            name: name.to_string(),
            mode: AcquisitionMode {
                disk_cached: backend.is_disk_backed(),
                existing: false,
                show,
            },
            dimensions,
            extent,
            backend,
            display: None,
            start_time: Utc::now(),
            ui: ctx.ui.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    pub fn extent(&self) -> AcquisitionExtent {
        self.extent
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    pub fn storage(&self) -> Arc<dyn FrameStorage> {
        self.backend.storage()
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.backend.kind()
    }

    pub fn save_path(&self) -> Option<PathBuf> {
        self.backend.storage().save_path()
    }

    pub fn summary_metadata(&self) -> Option<SummaryMetadata> {
        self.backend.storage().summary_metadata()
    }

    /// Length of the "frame" axis in the backend.
    pub fn last_acquired_frame(&self) -> u32 {
        self.backend.storage().axis_length(Axis::Frame)
    }

    pub fn display(&self) -> Option<Arc<dyn Display>> {
        self.display.clone()
    }

    pub(crate) fn set_display(&mut self, display: Option<Arc<dyn Display>>) {
        self.display = display;
    }

    /// Validates `frame` against the acquisition geometry, stamps it and hands
    /// it to the backend. The display is not updated.
    pub fn commit_frame(&self, mut frame: TaggedFrame, coords: Coords) -> Result<InsertOutcome, AcquisitionError> {
        frame.tags.set_coords(coords);
        self.validate(&frame)?;

        let now = Utc::now();
        frame.tags.elapsed_time_ms = Some((now - self.start_time).num_milliseconds());
        frame.tags.time = Some(now.with_timezone(&Local).format(TIME_FORMAT).to_string());

        match self.backend.storage().put_frame(frame) {
            Ok(planes) => {
                debug!("[{}] Committed frame {} ({} plane(s))", self.name, coords, planes);
                Ok(InsertOutcome::Committed(planes))
            }
            Err(StorageError::Frozen) => {
                error!("[{}] Datastore is frozen, dropping frame {}", self.name, coords);
                Ok(InsertOutcome::Dropped)
            }
            Err(e) => {
                error!("[{}] Failed to store frame {}: {}", self.name, coords, e);
                Ok(InsertOutcome::Dropped)
            }
        }
    }

    /// Commits `frame` at `coords` and, when asked, shows it on the display.
    pub fn insert_frame(
        &self,
        frame: TaggedFrame,
        coords: Coords,
        update_display: bool,
        wait_for_display: bool,
    ) -> Result<InsertOutcome, AcquisitionError> {
        let outcome = self.commit_frame(frame, coords)?;
        if update_display && outcome != InsertOutcome::Dropped {
            if let Some(display) = self.display() {
                show_on_display(&self.ui, &self.name, display, coords, wait_for_display);
            }
        }
        Ok(outcome)
    }

    /// Asks the display to close, if there is one still open. The backend is left as is.
    pub fn close(&self) -> Result<(), AcquisitionError> {
        request_display_close(&self.ui, &self.name, self.display())
    }

    fn validate(&self, frame: &TaggedFrame) -> Result<(), AcquisitionError> {
        let tags = &frame.tags;
        let expected = (self.dimensions.width, self.dimensions.height);
        if (tags.width, tags.height) != expected {
            return Err(AcquisitionError::DimensionMismatch {
                expected,
                found: (tags.width, tags.height),
            });
        }
        let pixel_type = PixelType::from_byte_depth(self.dimensions.byte_depth);
        if pixel_type != Some(tags.pixel_type) {
            return Err(AcquisitionError::PixelTypeMismatch {
                expected: pixel_type.map(|p| p.to_string()),
                found: tags.pixel_type.to_string(),
            });
        }
        if frame.pixels.len() != tags.expected_len() {
            return Err(AcquisitionError::PixelDataLength {
                expected: tags.expected_len(),
                found: frame.pixels.len(),
            });
        }
        Ok(())
    }
}

/// Takes extent and geometry from `summary`, keeping the current value for each missing field.
fn adopt_summary(summary: &SummaryMetadata, dimensions: &mut ImageDimensions, extent: &mut AcquisitionExtent) {
    dimensions.width = summary.width.unwrap_or(dimensions.width);
    dimensions.height = summary.height.unwrap_or(dimensions.height);
    dimensions.bit_depth = summary.bit_depth.unwrap_or(dimensions.bit_depth);
    if let Some(pixel_type) = summary.pixel_type {
        dimensions.byte_depth = pixel_type.bytes_per_pixel() as u32;
    }
    extent.frames = summary.frames.unwrap_or(extent.frames);
    extent.channels = summary.channels.unwrap_or(extent.channels);
    extent.slices = summary.slices.unwrap_or(extent.slices);
    extent.positions = summary.positions.unwrap_or(extent.positions);
}

/// A frozen backend keeps whatever summary it has; that is logged, not returned.
fn commit_summary(name: &str, storage: &dyn FrameStorage, summary: SummaryMetadata) -> Result<(), AcquisitionError> {
    match storage.set_summary_metadata(summary) {
        Ok(()) => {
            debug!("[{}] Summary metadata committed", name);
            Ok(())
        }
        Err(StorageError::Frozen) => {
            error!("[{}] Unable to set summary metadata: datastore is frozen", name);
            Ok(())
        }
        Err(e) => {
            error!("[{}] Unable to set summary metadata: {}", name, e);
            Err(e.into())
        }
    }
}

fn open_for_reading(dir: &Path) -> Result<StorageBackend, AcquisitionError> {
    open_existing(dir).map_err(|e| {
        error!("Failed to open {}: {}", dir.display(), e);
        AcquisitionError::BackendProbeFailed(format!("{}: {}", dir.display(), e))
    })
}

/// Display for a freshly initialized acquisition: the saved layout of an
/// existing one, otherwise a new display with acquisition controls.
pub(crate) fn default_display(
    ctx: &AcquisitionContext,
    name: &str,
    mode: AcquisitionMode,
    storage: Arc<dyn FrameStorage>,
) -> Option<Arc<dyn Display>> {
    if mode.existing {
        let restore_from = storage.save_path();
        open_display(ctx, name, storage, restore_from, None)
    } else {
        let controls = ctx.engine.clone().map(AcquisitionControls::new);
        open_display(ctx, name, storage, None, controls)
    }
}

/// Creates a display on the UI thread. Saved layouts in `restore_from` take
/// precedence over a new default display.
pub(crate) fn open_display(
    ctx: &AcquisitionContext,
    name: &str,
    storage: Arc<dyn FrameStorage>,
    restore_from: Option<PathBuf>,
    controls: Option<AcquisitionControls>,
) -> Option<Arc<dyn Display>> {
    let displays = ctx.displays.clone();
    let created = ctx.ui.invoke_and_wait(move || {
        if let Some(dir) = restore_from {
            if let Some(restored) = displays.load_display_settings(storage.clone(), &dir).into_iter().next() {
                return restored;
            }
        }
        displays.create_display(storage, controls)
    });
    match created {
        Ok(display) => Some(display),
        Err(e) => {
            warn!("[{}] Unable to open a display: {}", name, e);
            None
        }
    }
}

pub(crate) fn show_on_display(
    ui: &UiDispatcher,
    name: &str,
    display: Arc<dyn Display>,
    coords: Coords,
    wait: bool,
) {
    let shown = if wait {
        ui.invoke_and_wait(move || display.show_frame(coords))
    } else {
        ui.invoke_later(move || display.show_frame(coords))
    };
    if let Err(e) = shown {
        warn!("[{}] Unable to show frame {}: {}", name, coords, e);
    }
}

pub(crate) fn request_display_close(
    ui: &UiDispatcher,
    name: &str,
    display: Option<Arc<dyn Display>>,
) -> Result<(), AcquisitionError> {
    let Some(display) = display else {
        return Ok(());
    };
    if display.is_closed() {
        return Ok(());
    }
    if ui.invoke_and_wait(move || display.request_close())? {
        debug!("[{}] Display closed", name);
    } else {
        warn!("[{}] Display refused to close", name);
    }
    Ok(())
}
