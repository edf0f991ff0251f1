use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::display::{AcquisitionControls, AcquisitionEngine};
use crate::error_handling::types::AcquisitionError;
use crate::session_management::active_session::AcquisitionHandle;
use crate::session_management::context::AcquisitionContext;
use crate::session_management::naming::unique_name;
use crate::session_management::session::{open_display, Acquisition, PendingAcquisition};
use crate::session_management::AcquisitionMode;
use crate::storage::types::SummaryMetadata;

type AcquisitionMap = HashMap<String, AcquisitionHandle>;

/// Base of the names handed out by `create_with_generated_name`.
pub const GENERATED_NAME_BASE: &str = "Acq";

/// The structure related to acquisition management
///
/// Keeps the live acquisitions of one application keyed by unique name.
///
/// # Fields Overview
///
/// - `acquisitions`: the name to handle map, guarded by a single mutex
/// - `context`: instrument, display provider and UI thread shared by every acquisition
///
/// An acquisition whose display was closed by the user stops being live; it
/// is closed and dropped from the map the next time its name is looked up.
/// `close`, `close_all` and `close_all_displays` run on the UI thread.
pub struct AcquisitionRegistry {
    acquisitions: Arc<Mutex<AcquisitionMap>>,
    context: Arc<AcquisitionContext>,
}

impl AcquisitionRegistry {
    pub fn new(context: AcquisitionContext) -> Self {
        Self {
            acquisitions: Arc::new(Mutex::new(HashMap::new())),
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &AcquisitionContext {
        &self.context
    }

    fn lock(&self) -> MutexGuard<'_, AcquisitionMap> {
        lock_map(&self.acquisitions)
    }

    /// Registers a new, uninitialized acquisition under `name`.
    pub fn open(
        &self,
        name: &str,
        root_directory: Option<PathBuf>,
        show: bool,
        disk_cached: bool,
        existing: bool,
    ) -> Result<AcquisitionHandle, AcquisitionError> {
        let mut acquisitions = self.lock();
        if live_entry(&mut acquisitions, name).is_some() {
            warn!("[{}] Acquisition name is already in use", name);
            return Err(AcquisitionError::NameInUse(name.to_string()));
        }

        let mut pending = PendingAcquisition::new(
            name,
            AcquisitionMode {
                disk_cached,
                existing,
                show,
            },
        );
        if let Some(root) = root_directory {
            pending.set_root_directory(root);
        }
        let handle = AcquisitionHandle::pending(pending, self.context.clone());
        acquisitions.insert(name.to_string(), handle.clone());
        info!("[{}] Acquisition opened", name);
        Ok(handle)
    }

    /// Registers an initialized acquisition described by `summary` under a
    /// generated name and returns that name.
    pub fn create_with_generated_name(
        &self,
        summary: SummaryMetadata,
        disk_cached: bool,
        engine: Option<Arc<dyn AcquisitionEngine>>,
        display_off: bool,
    ) -> Result<String, AcquisitionError> {
        let show = !display_off;
        let handle = {
            let mut acquisitions = self.lock();
            let name = unique_locked(&mut acquisitions, GENERATED_NAME_BASE);
            let acquisition =
                Acquisition::from_summary(&name, summary, disk_cached, show, engine.as_ref(), &self.context)?;
            let handle = AcquisitionHandle::initialized(acquisition, self.context.clone());
            acquisitions.insert(name, handle.clone());
            handle
        };

        if show {
            if let Some(storage) = handle.storage() {
                let controls = engine.map(AcquisitionControls::new);
                let display = open_display(&self.context, handle.name(), storage, None, controls);
                handle.attach_display(display);
            }
        }
        info!("[{}] Acquisition created from summary metadata", handle.name());
        Ok(handle.name().to_string())
    }

    pub fn get(&self, name: &str) -> Result<AcquisitionHandle, AcquisitionError> {
        live_entry(&mut self.lock(), name).ok_or_else(|| AcquisitionError::UnknownAcquisition(name.to_string()))
    }

    /// Closes the acquisition and removes it from the registry.
    pub fn close(&self, name: &str) -> Result<(), AcquisitionError> {
        let acquisitions = self.acquisitions.clone();
        let name = name.to_string();
        self.context.ui.invoke_and_wait(move || {
            let removed = lock_map(&acquisitions).remove(&name);
            match removed {
                Some(handle) => {
                    info!("[{}] Closing acquisition", name);
                    handle.close()
                }
                None => Err(AcquisitionError::UnknownAcquisition(name)),
            }
        })?
    }

    /// Closes every acquisition, ignoring individual failures, and empties the registry.
    pub fn close_all(&self) -> Result<(), AcquisitionError> {
        let acquisitions = self.acquisitions.clone();
        self.context.ui.invoke_and_wait(move || {
            let drained: Vec<AcquisitionHandle> = lock_map(&acquisitions).drain().map(|(_, h)| h).collect();
            info!("Closing {} acquisition(s)", drained.len());
            for handle in drained {
                if let Err(e) = handle.close() {
                    warn!("[{}] Failed to close: {}", handle.name(), e);
                }
            }
        })?;
        Ok(())
    }

    /// Asks every display bound to a registered backend to close, in name order.
    ///
    /// Returns `false` at the first display that refuses; displays after it are
    /// left alone. Acquisitions stay registered either way. When the sweep is
    /// vetoed, the acquisitions whose displays it already closed are kept live
    /// until they are closed explicitly.
    pub fn close_all_displays(&self) -> bool {
        let acquisitions = self.acquisitions.clone();
        let displays = self.context.displays.clone();
        let swept = self.context.ui.invoke_and_wait(move || {
            let mut handles: Vec<AcquisitionHandle> = lock_map(&acquisitions).values().cloned().collect();
            handles.sort_by(|a, b| a.name().cmp(b.name()));
            let mut closed: Vec<&AcquisitionHandle> = Vec::new();
            for handle in &handles {
                let Some(storage) = handle.storage() else {
                    continue;
                };
                let open = displays.displays_for(storage.id());
                for display in &open {
                    if !display.request_close() {
                        info!("[{}] Display {} refused to close", handle.name(), display.id());
                        closed.push(handle);
                        for kept in &closed {
                            debug!("[{}] Keeping acquisition after vetoed display sweep", kept.name());
                            kept.set_retained(true);
                        }
                        return false;
                    }
                }
                if !open.is_empty() {
                    closed.push(handle);
                }
            }
            for handle in &handles {
                handle.set_retained(false);
            }
            true
        });
        match swept {
            Ok(closed) => closed,
            Err(e) => {
                error!("Unable to close displays: {}", e);
                false
            }
        }
    }

    pub fn acquisition_exists(&self, name: &str) -> bool {
        live_entry(&mut self.lock(), name).is_some()
    }

    /// Derives a name from `name` that no live acquisition holds.
    pub fn unique_acquisition_name(&self, name: &str) -> String {
        unique_locked(&mut self.lock(), name)
    }

    /// Names of the live acquisitions, sorted.
    pub fn acquisition_names(&self) -> Vec<String> {
        let mut acquisitions = self.lock();
        let keys: Vec<String> = acquisitions.keys().cloned().collect();
        let mut names: Vec<String> = keys
            .into_iter()
            .filter(|name| live_entry(&mut acquisitions, name).is_some())
            .collect();
        names.sort();
        names
    }
}

fn lock_map(acquisitions: &Mutex<AcquisitionMap>) -> MutexGuard<'_, AcquisitionMap> {
    acquisitions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle registered under `name` if it is still live. A handle that is no
/// longer live is closed and evicted.
fn live_entry(acquisitions: &mut AcquisitionMap, name: &str) -> Option<AcquisitionHandle> {
    let handle = acquisitions.get(name)?;
    if handle.is_live() {
        return Some(handle.clone());
    }
    if let Some(stale) = acquisitions.remove(name) {
        debug!("[{}] Display was closed, evicting acquisition", name);
        if let Err(e) = stale.close() {
            warn!("[{}] Failed to close evicted acquisition: {}", name, e);
        }
    }
    None
}

fn unique_locked(acquisitions: &mut AcquisitionMap, candidate: &str) -> String {
    unique_name(candidate, |name| live_entry(&mut *acquisitions, name).is_some())
}
