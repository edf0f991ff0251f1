#[cfg(test)]
mod tests {
    use crate::configuration::types::{AcquisitionSettings, InstrumentSettings};
    use crate::display::controls::tests::RecordingEngine;
    use crate::display::{Display, DisplayProvider, HeadlessDisplayProvider, UiDispatcher};
    use crate::error_handling::types::AcquisitionError;
    use crate::hardware::StaticInstrument;
    use crate::session_management::{AcquisitionContext, AcquisitionRegistry, InsertOutcome};
    use crate::storage::types::{Axis, Coords, FrameTags, PixelType, StorageKind, SummaryMetadata, TaggedFrame};
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    // Helper to build a registry with headless displays we can inspect
    fn registry(root: Option<&Path>) -> (AcquisitionRegistry, Arc<HeadlessDisplayProvider>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let provider = Arc::new(HeadlessDisplayProvider::new());
        let displays: Arc<dyn DisplayProvider> = provider.clone();
        let context = AcquisitionContext::new(
            AcquisitionSettings {
                root_directory: root.map(Path::to_path_buf),
                ..AcquisitionSettings::default()
            },
            Arc::new(StaticInstrument::new(InstrumentSettings::default())),
            displays,
            UiDispatcher::spawn().unwrap(),
        );
        (AcquisitionRegistry::new(context), provider)
    }

    fn frame(width: u32, height: u32, pixel_type: PixelType) -> TaggedFrame {
        let len = width as usize * height as usize * pixel_type.bytes_per_pixel();
        TaggedFrame::new(vec![7; len], FrameTags::new(width, height, pixel_type))
    }

    #[test]
    fn setters_fail_after_initialize() {
        let (registry, _) = registry(None);
        let handle = registry.open("A", None, false, false, false).unwrap();
        assert_ok!(handle.set_physical_dimensions(8, 8, 1, 8, 1));
        assert_ok!(handle.set_dimensions(2, 1, 1, 1));
        assert_ok!(handle.initialize());

        assert!(matches!(
            handle.set_dimensions(3, 1, 1, 1),
            Err(AcquisitionError::AlreadyInitialized)
        ));
        assert!(matches!(
            handle.set_stack_dimensions(3, 1, 1),
            Err(AcquisitionError::AlreadyInitialized)
        ));
        assert!(matches!(
            handle.set_physical_dimensions(4, 4, 1, 8, 1),
            Err(AcquisitionError::AlreadyInitialized)
        ));
        assert!(matches!(
            handle.set_root_directory("/tmp"),
            Err(AcquisitionError::AlreadyInitialized)
        ));
        assert!(matches!(handle.initialize(), Err(AcquisitionError::AlreadyInitialized)));
        assert_eq!(handle.dimensions().width, 8);
        assert_eq!(handle.extent().frames, 2);
    }

    #[test]
    fn insert_before_initialize_fails() {
        let (registry, _) = registry(None);
        let handle = registry.open("A", None, false, false, false).unwrap();
        let err = assert_err!(handle.insert(frame(1, 1, PixelType::Gray8), Coords::default()));
        assert!(matches!(err, AcquisitionError::NotInitialized));
        assert!(matches!(handle.last_acquired_frame(), Err(AcquisitionError::NotInitialized)));
        assert!(handle.storage().is_none());
    }

    #[test]
    fn frame_axis_grows_with_inserted_frames() {
        let (registry, _) = registry(None);
        let handle = registry.open("Grow", None, false, false, false).unwrap();
        handle.set_physical_dimensions(4, 4, 2, 16, 1).unwrap();
        handle.initialize().unwrap();

        for t in 0..5 {
            let outcome = handle
                .insert_frame(frame(4, 4, PixelType::Gray16), Coords::new(t, 0, 0, 0), false, false)
                .unwrap();
            assert_eq!(outcome, InsertOutcome::Committed(1));
        }
        // same frame index again does not grow the axis
        handle
            .insert_plane(frame(4, 4, PixelType::Gray16), 4, 0, 0)
            .unwrap();
        assert_eq!(handle.last_acquired_frame().unwrap(), 5);
    }

    #[test]
    fn mismatched_frame_leaves_backend_unchanged() {
        let (registry, _) = registry(None);
        let handle = registry.open("Strict", None, false, false, false).unwrap();
        handle.set_physical_dimensions(4, 4, 1, 8, 1).unwrap();
        handle.initialize().unwrap();
        handle.insert(frame(4, 4, PixelType::Gray8), Coords::default()).unwrap();

        let err = assert_err!(handle.insert(frame(5, 4, PixelType::Gray8), Coords::new(1, 0, 0, 0)));
        assert!(matches!(
            err,
            AcquisitionError::DimensionMismatch {
                expected: (4, 4),
                found: (5, 4)
            }
        ));
        let storage = handle.storage().unwrap();
        assert_eq!(storage.coords(), vec![Coords::default()]);
        assert_eq!(storage.data_size_bytes(), 16);
    }

    #[test]
    fn rgb_frames_split_into_channels() {
        let (registry, _) = registry(None);
        let handle = registry.open("Color", None, false, false, false).unwrap();
        handle.set_physical_dimensions(2, 1, 4, 8, 1).unwrap();
        handle.initialize().unwrap();

        let mut rgb = frame(2, 1, PixelType::Rgb32);
        rgb.pixels = vec![1, 2, 3, 0, 4, 5, 6, 0];
        let outcome = handle.insert(rgb, Coords::new(0, 1, 0, 0)).unwrap();
        assert_eq!(outcome, InsertOutcome::Committed(3));

        let storage = handle.storage().unwrap();
        assert_eq!(storage.axis_length(Axis::Channel), 6);
        let green = storage.frame(&Coords::new(0, 4, 0, 0)).unwrap().unwrap();
        assert_eq!(green.pixels, vec![2, 5]);
        assert_eq!(green.tags.pixel_type, PixelType::Gray8);
    }

    #[test]
    fn name_in_use_until_closed() {
        let (registry, _) = registry(None);
        registry.open("X", None, false, false, false).unwrap();
        let err = assert_err!(registry.open("X", None, false, false, false));
        assert!(matches!(err, AcquisitionError::NameInUse(ref n) if n == "X"));

        registry.close("X").unwrap();
        assert!(!registry.acquisition_exists("X"));
        assert_ok!(registry.open("X", None, false, false, false));
    }

    #[test]
    fn unknown_names_are_reported() {
        let (registry, _) = registry(None);
        assert!(matches!(registry.get("nope"), Err(AcquisitionError::UnknownAcquisition(_))));
        assert!(matches!(registry.close("nope"), Err(AcquisitionError::UnknownAcquisition(_))));
    }

    #[test]
    fn unique_name_skips_live_names() {
        let (registry, _) = registry(None);
        registry.open("Acq", None, false, false, false).unwrap();
        registry.open("Acq_1", None, false, false, false).unwrap();
        assert_eq!(registry.unique_acquisition_name("Acq"), "Acq_2");
        assert_eq!(registry.unique_acquisition_name("Other"), "Other");
        assert_eq!(registry.acquisition_names(), vec!["Acq".to_string(), "Acq_1".to_string()]);
    }

    #[test]
    fn closed_display_evicts_acquisition() {
        let (registry, provider) = registry(None);
        let handle = registry.open("Shown", None, true, false, false).unwrap();
        handle.set_physical_dimensions(2, 2, 1, 8, 1).unwrap();
        handle.initialize().unwrap();
        assert!(handle.display().is_some());
        assert!(registry.acquisition_exists("Shown"));

        provider.headless_displays()[0].close_out_of_band();
        assert!(!handle.is_live());
        assert!(matches!(registry.get("Shown"), Err(AcquisitionError::UnknownAcquisition(_))));
        assert!(registry.acquisition_names().is_empty());
        assert_ok!(registry.open("Shown", None, true, false, false));
    }

    #[test]
    fn display_follows_inserted_frames() {
        let (registry, provider) = registry(None);
        let handle = registry.open("Live", None, true, false, false).unwrap();
        handle.set_physical_dimensions(2, 2, 1, 8, 1).unwrap();
        handle.initialize().unwrap();

        handle.insert(frame(2, 2, PixelType::Gray8), Coords::new(0, 0, 0, 0)).unwrap();
        handle
            .insert_frame(frame(2, 2, PixelType::Gray8), Coords::new(1, 0, 0, 0), true, false)
            .unwrap();
        handle
            .insert_frame(frame(2, 2, PixelType::Gray8), Coords::new(2, 0, 0, 0), false, false)
            .unwrap();
        // flush queued UI work
        registry.context().ui.invoke_and_wait(|| ()).unwrap();

        assert_eq!(
            provider.headless_displays()[0].shown_frames(),
            vec![Coords::new(0, 0, 0, 0), Coords::new(1, 0, 0, 0)]
        );
    }

    #[test]
    fn close_all_displays_stops_at_refusal() {
        let (registry, provider) = registry(None);
        for name in ["One", "Two"] {
            let handle = registry.open(name, None, true, false, false).unwrap();
            handle.initialize().unwrap();
        }
        let displays = provider.headless_displays();
        assert_eq!(displays.len(), 2);
        displays[0].set_unsaved_changes(true);
        displays[1].set_unsaved_changes(true);

        assert!(!registry.close_all_displays());
        assert_eq!(registry.acquisition_names().len(), 2);
        assert!(displays.iter().all(|d| !d.is_closed()));

        displays[0].set_unsaved_changes(false);
        displays[1].set_unsaved_changes(false);
        assert!(registry.close_all_displays());
        assert!(displays.iter().all(|d| d.is_closed()));
    }

    #[test]
    fn vetoed_close_all_displays_keeps_every_acquisition() {
        let (registry, provider) = registry(None);
        let mut handles = Vec::new();
        for name in ["Alpha", "Beta", "Gamma"] {
            let handle = registry.open(name, None, true, false, false).unwrap();
            handle.initialize().unwrap();
            handles.push(handle);
        }
        let display_of = |index: usize| {
            let id = handles[index].display().unwrap().id();
            provider.headless_displays().into_iter().find(|d| d.id() == id).unwrap()
        };
        display_of(1).set_unsaved_changes(true);
        // closed by the user beforehand, not by the sweep
        display_of(2).close_out_of_band();

        assert!(!registry.close_all_displays());
        assert!(display_of(0).is_closed());
        assert!(!display_of(1).is_closed());
        assert_eq!(registry.acquisition_names(), vec!["Alpha".to_string(), "Beta".to_string()]);
        assert!(registry.get("Alpha").is_ok());

        display_of(1).set_unsaved_changes(false);
        assert!(registry.close_all_displays());
        assert!(registry.acquisition_names().is_empty());
    }

    #[test]
    fn handles_print_name_and_mode() {
        let (registry, _) = registry(None);
        let handle = registry.open("Printed", None, false, true, false).unwrap();
        let printed = format!("{:?}", handle);
        assert!(printed.contains("Printed"));
        assert!(printed.contains("disk_cached: true"));
    }

    #[test]
    fn close_is_idempotent_and_close_all_empties() {
        let (registry, provider) = registry(None);
        let handle = registry.open("Once", None, true, false, false).unwrap();
        handle.initialize().unwrap();
        registry.open("Never", None, false, false, false).unwrap();

        assert_ok!(handle.close());
        assert_ok!(handle.close());
        assert!(provider.headless_displays()[0].is_closed());

        registry.close_all().unwrap();
        assert!(registry.acquisition_names().is_empty());
        assert!(!registry.acquisition_exists("Never"));
    }

    #[test]
    fn generated_names_start_from_acq() {
        let (registry, provider) = registry(None);
        let first = registry
            .create_with_generated_name(SummaryMetadata::default(), false, None, true)
            .unwrap();
        let second = registry
            .create_with_generated_name(SummaryMetadata::default(), false, None, true)
            .unwrap();
        assert_eq!(first, "Acq");
        assert_eq!(second, "Acq_1");

        let handle = registry.get("Acq_1").unwrap();
        assert!(handle.is_initialized());
        assert_eq!(handle.storage_kind(), Some(StorageKind::Memory));
        assert!(provider.headless_displays().is_empty());
    }

    #[test]
    fn generated_acquisition_on_disk_gets_fresh_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("Scan_4")).unwrap();
        let (registry, provider) = registry(None);
        let engine = Arc::new(RecordingEngine::default());

        let summary = SummaryMetadata {
            prefix: Some("Scan".into()),
            directory: Some(dir.path().display().to_string()),
            width: Some(4),
            height: Some(4),
            pixel_type: Some(PixelType::Gray16),
            ..SummaryMetadata::default()
        };
        let name = registry
            .create_with_generated_name(summary, true, Some(engine.clone()), false)
            .unwrap();
        let handle = registry.get(&name).unwrap();

        assert_eq!(handle.storage_kind(), Some(StorageKind::MultiPage));
        assert_eq!(handle.save_path(), Some(dir.path().join("Scan_5")));
        assert_eq!(handle.summary_metadata().unwrap().prefix.as_deref(), Some("Scan_5"));
        assert_eq!(handle.dimensions().byte_depth, 2);

        let display = provider.headless_displays()[0].clone();
        let controls = display.controls().unwrap();
        controls.toggle_pause();
        assert!(engine.paused.load(Ordering::SeqCst));
        assert!(!engine.stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn unusable_directory_stops_engine() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let (registry, _) = registry(None);
        let engine = Arc::new(RecordingEngine::default());

        let summary = SummaryMetadata {
            directory: Some(blocker.display().to_string()),
            ..SummaryMetadata::default()
        };
        let err = assert_err!(registry.create_with_generated_name(summary, true, Some(engine.clone()), true));
        assert!(matches!(err, AcquisitionError::DirectoryResolutionFailed(_)));
        assert!(engine.stopped.load(Ordering::SeqCst));
        assert!(engine.interrupted.load(Ordering::SeqCst));
        assert!(registry.acquisition_names().is_empty());
    }

    #[test]
    fn new_shown_acquisition_binds_engine_controls() {
        let _ = env_logger::builder().is_test(true).try_init();
        let provider = Arc::new(HeadlessDisplayProvider::new());
        let engine = Arc::new(RecordingEngine::default());
        let context = AcquisitionContext::new(
            AcquisitionSettings::default(),
            Arc::new(StaticInstrument::default()),
            provider.clone(),
            UiDispatcher::spawn().unwrap(),
        )
        .with_engine(engine.clone());
        let registry = AcquisitionRegistry::new(context);

        let handle = registry.open("Ctl", None, true, false, false).unwrap();
        handle.initialize().unwrap();
        let display = provider.headless_displays()[0].clone();
        assert_eq!(display.storage_id(), handle.storage().unwrap().id());
        display.controls().unwrap().abort();
        assert_eq!(engine.aborts.load(Ordering::SeqCst), 1);
    }
}
