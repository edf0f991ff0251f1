use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    /// The backend no longer accepts frames or summary metadata.
    Frozen,
    WriteFailed(String),
    ReadFailed(String),
    FormatNotRecognized(PathBuf),
    Corrupted(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Frozen => write!(f, "Storage is frozen"),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
            StorageError::FormatNotRecognized(p) => {
                write!(f, "No known acquisition format in {}", p.display())
            }
            StorageError::Corrupted(e) => write!(f, "Storage data corrupted: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum DispatchError {
    /// The UI thread has exited and no longer takes jobs.
    Disconnected,
    /// The job was accepted but never reported back (it panicked).
    JobFailed,
    SpawnFailed(std::io::Error),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Disconnected => write!(f, "UI dispatch thread is not running"),
            DispatchError::JobFailed => write!(f, "UI job did not complete"),
            DispatchError::SpawnFailed(e) => write!(f, "Unable to start UI thread: {}", e),
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Debug)]
pub enum AcquisitionError {
    AlreadyInitialized,
    NotInitialized,
    NameInUse(String),
    UnknownAcquisition(String),
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
    PixelTypeMismatch {
        expected: Option<String>,
        found: String,
    },
    PixelDataLength {
        expected: usize,
        found: usize,
    },
    DatastoreFrozen,
    DirectoryResolutionFailed(String),
    BackendProbeFailed(String),
    InsufficientMemory {
        required: u64,
        available: u64,
    },
    Storage(StorageError),
    Dispatch(DispatchError),
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionError::AlreadyInitialized => write!(f, "Acquisition is already initialized"),
            AcquisitionError::NotInitialized => write!(f, "Acquisition was not initialized"),
            AcquisitionError::NameInUse(n) => write!(f, "The name is in use: {}", n),
            AcquisitionError::UnknownAcquisition(n) => {
                write!(f, "The acquisition named \"{}\" does not exist", n)
            }
            AcquisitionError::DimensionMismatch { expected, found } => write!(
                f,
                "Image dimensions {}x{} do not match acquisition dimensions {}x{}",
                found.0, found.1, expected.0, expected.1
            ),
            AcquisitionError::PixelTypeMismatch { expected, found } => write!(
                f,
                "Pixel type {} does not match acquisition pixel type {}",
                found,
                expected.as_deref().unwrap_or("<none>")
            ),
            AcquisitionError::PixelDataLength { expected, found } => write!(
                f,
                "Pixel buffer holds {} bytes, expected {}",
                found, expected
            ),
            AcquisitionError::DatastoreFrozen => write!(f, "Datastore is frozen"),
            AcquisitionError::DirectoryResolutionFailed(e) => {
                write!(f, "Failed to figure out acquisition saving path: {}", e)
            }
            AcquisitionError::BackendProbeFailed(e) => write!(f, "Failed to open file: {}", e),
            AcquisitionError::InsufficientMemory { required, available } => write!(
                f,
                "Not enough room in memory for this data set ({} bytes needed, {} bytes budgeted); try opening it as a virtual data set",
                required, available
            ),
            AcquisitionError::Storage(e) => write!(f, "Storage error: {}", e),
            AcquisitionError::Dispatch(e) => write!(f, "Dispatch error: {}", e),
        }
    }
}

impl std::error::Error for AcquisitionError {}

impl From<StorageError> for AcquisitionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Frozen => AcquisitionError::DatastoreFrozen,
            other => AcquisitionError::Storage(other),
        }
    }
}

impl From<DispatchError> for AcquisitionError {
    fn from(err: DispatchError) -> Self {
        AcquisitionError::Dispatch(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_storage_maps_to_datastore_frozen() {
        let err: AcquisitionError = StorageError::Frozen.into();
        assert!(matches!(err, AcquisitionError::DatastoreFrozen));

        let err: AcquisitionError = StorageError::ReadFailed("x".into()).into();
        assert!(matches!(err, AcquisitionError::Storage(StorageError::ReadFailed(_))));
    }

    #[test]
    fn display_mentions_the_name() {
        let msg = AcquisitionError::UnknownAcquisition("Acq_3".into()).to_string();
        assert!(msg.contains("Acq_3"));
    }
}
