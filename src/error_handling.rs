//! Error types shared by every subsystem.

pub mod types;

pub use types::{AcquisitionError, ConfigError, DispatchError, StorageError};
