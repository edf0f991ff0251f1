use std::sync::Arc;

use crate::configuration::types::AcquisitionSettings;
use crate::configuration::Config;
use crate::display::{AcquisitionEngine, DisplayProvider, HeadlessDisplayProvider, UiDispatcher};
use crate::error_handling::types::DispatchError;
use crate::hardware::{Instrument, StaticInstrument};

/// Collaborators shared by every acquisition of a registry.
#[derive(Clone)]
pub struct AcquisitionContext {
    pub settings: AcquisitionSettings,
    pub instrument: Arc<dyn Instrument>,
    pub displays: Arc<dyn DisplayProvider>,
    pub ui: UiDispatcher,
    /// Engine bound to the controls of displays created for new acquisitions.
    pub engine: Option<Arc<dyn AcquisitionEngine>>,
}

impl AcquisitionContext {
    pub fn new(
        settings: AcquisitionSettings,
        instrument: Arc<dyn Instrument>,
        displays: Arc<dyn DisplayProvider>,
        ui: UiDispatcher,
    ) -> Self {
        Self {
            settings,
            instrument,
            displays,
            ui,
            engine: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn AcquisitionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Context with a static instrument and headless displays, built from `config`.
    pub fn headless(config: &Config) -> Result<Self, DispatchError> {
        Ok(Self::new(
            config.acquisition.clone(),
            Arc::new(StaticInstrument::new(config.instrument.clone())),
            Arc::new(HeadlessDisplayProvider::new()),
            UiDispatcher::spawn()?,
        ))
    }
}
