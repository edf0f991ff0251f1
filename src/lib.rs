pub mod configuration;
pub use configuration::Config;

pub mod error_handling;
pub use error_handling::{AcquisitionError, ConfigError, DispatchError, StorageError};

pub mod storage;
pub use storage::{FrameStorage, StorageBackend};

pub mod display;

pub mod hardware;

pub mod session_management;
pub use session_management::{AcquisitionContext, AcquisitionHandle, AcquisitionRegistry, InsertOutcome};
