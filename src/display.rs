//! Display subsystem.
//!
//! Displays render the frames of one storage backend. They are owned by a
//! single UI thread; other threads reach them through [`UiDispatcher`].
//!
//! Re-exports:
//! - [`Display`], [`DisplayProvider`]: the capabilities a session binds to.
//! - [`AcquisitionEngine`], [`AcquisitionControls`]: abort/pause wiring.
//! - [`HeadlessDisplayProvider`]: window-less implementation.

pub mod controls;
pub mod dispatcher;
pub mod display_trait;
pub mod headless;

pub use controls::{AcquisitionControls, AcquisitionEngine};
pub use dispatcher::UiDispatcher;
pub use display_trait::{Display, DisplayProvider};
pub use headless::{HeadlessDisplay, HeadlessDisplayProvider};
