//! Storage subsystem
//!
//! This module provides the backends an acquisition commits its frames to.
//!
//! Components:
//! - `storage_trait`: the `FrameStorage` trait defining a uniform API.
//! - `types`: coordinates, frames, tags and summary metadata shared by backends.
//! - `backend`: the tagged union over the three backend variants.
//! - `memory_storage`: memory-resident backend.
//! - `multipage_storage`: all planes appended to one stack file.
//! - `single_plane_storage`: one file per plane.
//! - `file_storage`: summary file handling and on-disk format probing.

pub mod backend;
pub mod file_storage;
pub mod memory_storage;
pub mod multipage_storage;
pub mod single_plane_storage;
pub mod storage_trait;
pub mod types;

pub use backend::StorageBackend;
pub use storage_trait::FrameStorage;
