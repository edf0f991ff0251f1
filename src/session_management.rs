//! Session management core module.
//!
//! This module provides the acquisition lifecycle: configuration, backend
//! binding on `initialize`, frame insertion and the registry of live
//! acquisitions keyed by name.

use serde::Serialize;

/// Submodule for the shared acquisition handle.
pub mod active_session;
/// Submodule choosing a backend from the mode flags.
pub mod backend_selection;
/// Submodule for the collaborators every acquisition needs.
pub mod context;
/// Submodule for directory and registry name generation.
pub mod naming;
/// Submodule for the configured and initialized acquisition types.
pub mod session;
/// Submodule for the acquisition registry.
pub mod session_manager;
/// Submodule for default summary metadata.
pub mod summary;

#[cfg(test)]
pub mod tests;

pub use active_session::AcquisitionHandle;
pub use context::AcquisitionContext;
pub use session::{Acquisition, AcquisitionExtent, ImageDimensions, InsertOutcome, PendingAcquisition};
pub use session_manager::AcquisitionRegistry;

/// Flags fixed when an acquisition is opened.
///
/// - `disk_cached`: frames go to (or come from) disk rather than memory.
/// - `existing`: the acquisition was recorded before and is being reopened.
/// - `show`: a display is bound to the acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AcquisitionMode {
    pub disk_cached: bool,
    pub existing: bool,
    pub show: bool,
}

/// Lifecycle of an acquisition behind a handle. Moves from
/// `Uninitialized` to `Initialized` once and never back.
pub enum SessionState {
    Uninitialized(PendingAcquisition),
    Initialized(Acquisition),
}
