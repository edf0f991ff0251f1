//! Read-only queries against the instrument producing the frames.

use crate::configuration::types::InstrumentSettings;

/// What an acquisition needs to know about the camera to describe its data.
pub trait Instrument: Send + Sync {
    fn bytes_per_pixel(&self) -> u32;
    fn pixel_size_um(&self) -> f64;
    fn number_of_components(&self) -> u32;
    /// Name of the configuration group that selects channels, if any.
    fn channel_group(&self) -> Option<String>;
}

/// An instrument whose properties never change, typically loaded from configuration.
#[derive(Debug, Clone)]
pub struct StaticInstrument {
    settings: InstrumentSettings,
}

impl StaticInstrument {
    pub fn new(settings: InstrumentSettings) -> Self {
        Self { settings }
    }
}

impl Default for StaticInstrument {
    fn default() -> Self {
        Self::new(InstrumentSettings::default())
    }
}

impl Instrument for StaticInstrument {
    fn bytes_per_pixel(&self) -> u32 {
        self.settings.bytes_per_pixel
    }

    fn pixel_size_um(&self) -> f64 {
        self.settings.pixel_size_um
    }

    fn number_of_components(&self) -> u32 {
        self.settings.number_of_components
    }

    fn channel_group(&self) -> Option<String> {
        self.settings.channel_group.clone()
    }
}
