use serde::Deserialize;
use std::path::PathBuf;

/// Settings that shape how acquisitions are created and stored.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Fallback root directory for disk-backed acquisitions that did not set their own
    pub root_directory: Option<PathBuf>,
    /// Upper bound on the data a reopened acquisition may load into memory
    pub memory_budget_mb: u64,
    /// Whether the CLI binds a display to the acquisitions it opens
    pub show_displays: bool,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            root_directory: None,
            memory_budget_mb: 4096,
            show_displays: false,
        }
    }
}

impl AcquisitionSettings {
    pub fn memory_budget_bytes(&self) -> u64 {
        self.memory_budget_mb.saturating_mul(1024 * 1024)
    }
}

/// Static description of the instrument the acquisitions are recorded on.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct InstrumentSettings {
    pub bytes_per_pixel: u32,
    pub pixel_size_um: f64,
    pub number_of_components: u32,
    pub channel_group: Option<String>,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            bytes_per_pixel: 2,
            pixel_size_um: 1.0,
            number_of_components: 1,
            channel_group: Some(String::from("Channel")),
        }
    }
}
