use super::types::*;
use crate::error_handling::types::ConfigError;
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding `acquisition.root_directory`.
pub const ROOT_DIRECTORY_ENV: &str = "ACQMAN_ROOT_DIRECTORY";

/// Application configuration, read from a TOML file.
///
/// Every table and field is optional; missing values take their defaults.
///
/// # Example
///
/// ```toml
/// [acquisition]
/// root_directory = "/data/acquisitions"
/// memory_budget_mb = 2048
///
/// [instrument]
/// bytes_per_pixel = 2
/// pixel_size_um = 0.65
/// number_of_components = 1
/// channel_group = "Channel"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub acquisition: AcquisitionSettings,
    pub instrument: InstrumentSettings,
}

impl Config {
    /// Reads, parses and validates the file at `path`, then applies environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses and validates a TOML document without looking at the environment.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a configuration file.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(ROOT_DIRECTORY_ENV) {
            if !dir.is_empty() {
                info!("Using root directory from {}: {}", ROOT_DIRECTORY_ENV, dir);
                self.acquisition.root_directory = Some(PathBuf::from(dir));
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let instrument = &self.instrument;
        if !matches!(instrument.bytes_per_pixel, 1 | 2 | 4 | 8) {
            return Err(ConfigError::NotInRange(format!(
                "instrument.bytes_per_pixel must be 1, 2, 4 or 8 (got {})",
                instrument.bytes_per_pixel
            )));
        }
        if !matches!(instrument.number_of_components, 1 | 3 | 4) {
            return Err(ConfigError::NotInRange(format!(
                "instrument.number_of_components must be 1, 3 or 4 (got {})",
                instrument.number_of_components
            )));
        }
        if instrument.pixel_size_um.is_nan() || instrument.pixel_size_um <= 0.0 {
            return Err(ConfigError::NotInRange(format!(
                "instrument.pixel_size_um must be positive (got {})",
                instrument.pixel_size_um
            )));
        }
        if self.acquisition.memory_budget_mb == 0 {
            return Err(ConfigError::NotInRange(
                "acquisition.memory_budget_mb must be greater than 0".to_string(),
            ));
        }
        debug!("Configuration validated: {:?}", self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_document_takes_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.acquisition.memory_budget_bytes(), 4096 * 1024 * 1024);
    }

    #[test]
    fn parses_all_tables() {
        let config = Config::parse(
            r#"
            [acquisition]
            root_directory = "/data/acq"
            memory_budget_mb = 16
            show_displays = true

            [instrument]
            bytes_per_pixel = 1
            pixel_size_um = 0.65
            number_of_components = 4
            channel_group = "Filter"
            "#,
        )
        .unwrap();

        assert_eq!(config.acquisition.root_directory, Some(PathBuf::from("/data/acq")));
        assert!(config.acquisition.show_displays);
        assert_eq!(config.instrument.bytes_per_pixel, 1);
        assert_eq!(config.instrument.number_of_components, 4);
        assert_eq!(config.instrument.channel_group.as_deref(), Some("Filter"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = Config::parse("[instrument]\nbytes_per_pixel = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotInRange(_)));

        let err = Config::parse("[instrument]\npixel_size_um = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotInRange(_)));

        let err = Config::parse("[acquisition]\nmemory_budget_mb = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotInRange(_)));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = Config::parse("[acquisition\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    #[serial]
    fn env_overrides_root_directory() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[acquisition]\nroot_directory = \"/from/file\"").unwrap();

        std::env::set_var(ROOT_DIRECTORY_ENV, "/from/env");
        let config = Config::from_file(file.path()).unwrap();
        std::env::remove_var(ROOT_DIRECTORY_ENV);

        assert_eq!(config.acquisition.root_directory, Some(PathBuf::from("/from/env")));
    }

    #[test]
    #[serial]
    fn missing_file_is_an_io_error() {
        std::env::remove_var(ROOT_DIRECTORY_ENV);
        let err = Config::from_file(Path::new("/nonexistent/acqman.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
        assert_eq!(Config::from_env().acquisition.root_directory, None);
    }
}
