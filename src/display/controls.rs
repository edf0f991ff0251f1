use std::sync::Arc;

use log::info;

/// The running acquisition engine, as far as a display or the registry can drive it.
pub trait AcquisitionEngine: Send + Sync {
    fn abort_request(&self);
    fn set_pause(&self, paused: bool);
    fn is_paused(&self) -> bool;
    /// Stops the engine; `interrupted` is true when it did not run to completion.
    fn stop(&self, interrupted: bool);
}

/// Abort and pause buttons a display exposes for a running acquisition.
#[derive(Clone)]
pub struct AcquisitionControls {
    engine: Arc<dyn AcquisitionEngine>,
}

impl AcquisitionControls {
    pub fn new(engine: Arc<dyn AcquisitionEngine>) -> Self {
        Self { engine }
    }

    pub fn abort(&self) {
        info!("Abort requested from display");
        self.engine.abort_request();
    }

    /// Flips the engine's pause state and returns the new one.
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.engine.is_paused();
        self.engine.set_pause(paused);
        info!("Acquisition {}", if paused { "paused" } else { "resumed" });
        paused
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Engine double recording the calls it received.
    #[derive(Default)]
    pub(crate) struct RecordingEngine {
        pub aborts: AtomicUsize,
        pub paused: AtomicBool,
        pub stopped: AtomicBool,
        pub interrupted: AtomicBool,
    }

    impl AcquisitionEngine for RecordingEngine {
        fn abort_request(&self) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }

        fn set_pause(&self, paused: bool) {
            self.paused.store(paused, Ordering::SeqCst);
        }

        fn is_paused(&self) -> bool {
            self.paused.load(Ordering::SeqCst)
        }

        fn stop(&self, interrupted: bool) {
            self.stopped.store(true, Ordering::SeqCst);
            self.interrupted.store(interrupted, Ordering::SeqCst);
        }
    }

    #[test]
    fn controls_drive_engine() {
        let engine = Arc::new(RecordingEngine::default());
        let controls = AcquisitionControls::new(engine.clone());

        assert!(controls.toggle_pause());
        assert!(engine.is_paused());
        assert!(!controls.toggle_pause());

        controls.abort();
        controls.abort();
        assert_eq!(engine.aborts.load(Ordering::SeqCst), 2);
    }
}
