//! Storage Trait
//!
//! This module defines the `FrameStorage` trait, the capability every acquisition
//! backend offers to the session that owns it.
//!
//! Implementors are responsible for:
//! - Accepting frames keyed by their full coordinate tuple, possibly out of order
//!   and from several producer threads at once
//! - Holding the acquisition's summary metadata, written once
//! - Refusing every write once frozen
//!
//! All fallible methods return a `Result` carrying a [`StorageError`].

use std::path::PathBuf;

use crate::error_handling::types::StorageError;
use crate::storage::types::{Axis, Coords, StorageId, StorageKind, SummaryMetadata, TaggedFrame};

pub trait FrameStorage: Send + Sync {
    /// Identifier displays use to find the backend they are bound to.
    fn id(&self) -> StorageId;

    fn kind(&self) -> StorageKind;

    /// Commits one single-component frame at the coordinates stamped on its tags.
    ///
    /// A frame at coordinates that already hold one replaces it.
    /// Fails with [`StorageError::Frozen`] once the backend is frozen.
    fn accept_frame(&self, frame: TaggedFrame) -> Result<(), StorageError>;

    /// Stores the summary metadata. Only the first call succeeds; later calls and
    /// calls on a frozen backend fail with [`StorageError::Frozen`].
    fn set_summary_metadata(&self, summary: SummaryMetadata) -> Result<(), StorageError>;

    fn summary_metadata(&self) -> Option<SummaryMetadata>;

    /// One past the highest index stored along `axis`, 0 when empty.
    fn axis_length(&self, axis: Axis) -> u32 {
        self.coords()
            .iter()
            .map(|c| c.index(axis) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Coordinates of every stored frame, sorted.
    fn coords(&self) -> Vec<Coords>;

    fn frame(&self, coords: &Coords) -> Result<Option<TaggedFrame>, StorageError>;

    fn freeze(&self);

    fn is_frozen(&self) -> bool;

    fn save_path(&self) -> Option<PathBuf>;

    /// Total pixel bytes held, used to size in-memory copies.
    fn data_size_bytes(&self) -> u64;

    /// Splits a multi-component frame and commits every resulting plane.
    ///
    /// Returns the number of planes committed. Stops at the first plane the
    /// backend refuses.
    fn put_frame(&self, frame: TaggedFrame) -> Result<usize, StorageError> {
        let planes = frame.split_components();
        let count = planes.len();
        for plane in planes {
            self.accept_frame(plane)?;
        }
        Ok(count)
    }
}
