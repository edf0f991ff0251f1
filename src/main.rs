use acqman::configuration::config::Config;
use acqman::error_handling::types::AcquisitionError;
use acqman::session_management::naming::next_directory_name;
use acqman::session_management::{
    AcquisitionContext, AcquisitionExtent, AcquisitionRegistry, ImageDimensions, InsertOutcome,
};
use acqman::storage::types::{Axis, Coords, FrameTags, PixelType, StorageKind, SummaryMetadata, TaggedFrame};
use acqman::storage::FrameStorage;
use clap::{Parser, Subcommand};
use log::{error, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "acqman")]
#[command(version = "0.0.2")]
#[command(about = "Acquisition session manager for microscope image data")]
struct Args {
    /// TOML configuration file; defaults and environment are used without one
    #[arg(short, long, env = "ACQMAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a synthetic acquisition
    Record {
        #[arg(long)]
        name: String,
        /// Root directory; falls back to the configured one
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long, default_value_t = 3)]
        frames: u32,
        #[arg(long, default_value_t = 1)]
        channels: u32,
        #[arg(long, default_value_t = 1)]
        slices: u32,
        #[arg(long, default_value_t = 1)]
        positions: u32,
        #[arg(long, default_value_t = 64)]
        width: u32,
        #[arg(long, default_value_t = 64)]
        height: u32,
        #[arg(long, default_value_t = 2)]
        byte_depth: u32,
        #[arg(long, default_value_t = 16)]
        bit_depth: u32,
        /// Keep frames in memory instead of writing them to disk
        #[arg(long)]
        in_memory: bool,
    },
    /// Open a recorded acquisition and print its summary as JSON
    Inspect {
        #[arg(long)]
        name: String,
        #[arg(long)]
        root: Option<PathBuf>,
        /// Copy every frame into memory instead of reading in place
        #[arg(long)]
        load_into_memory: bool,
    },
    /// Print the next free `<prefix>_<N>` directory name under a root
    NextDir {
        #[arg(long)]
        root: PathBuf,
        #[arg(long, default_value = "Acq")]
        prefix: String,
    },
}

#[derive(Serialize)]
struct InspectReport {
    name: String,
    kind: Option<StorageKind>,
    save_path: Option<PathBuf>,
    dimensions: ImageDimensions,
    extent: AcquisitionExtent,
    planes: usize,
    axis_lengths: BTreeMap<&'static str, u32>,
    data_size_bytes: u64,
    summary: Option<SummaryMetadata>,
}

fn main() {
    // https://docs.rs/env_logger/latest/env_logger/
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path).unwrap_or_else(|e| {
            error!("Unable to import configuration from file: {}", e);
            std::process::exit(1);
        }),
        None => Config::from_env(),
    };
    info!("Configuration imported successfully");

    if let Err(e) = run(args.command, config) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(command: Command, config: Config) -> Result<(), AcquisitionError> {
    match command {
        Command::Record {
            name,
            root,
            frames,
            channels,
            slices,
            positions,
            width,
            height,
            byte_depth,
            bit_depth,
            in_memory,
        } => {
            let show = config.acquisition.show_displays;
            let registry = AcquisitionRegistry::new(AcquisitionContext::headless(&config)?);
            let handle = registry.open(&name, root, show, !in_memory, false)?;
            handle.set_physical_dimensions(width, height, byte_depth, bit_depth, 1)?;
            handle.set_dimensions(frames, channels, slices, positions)?;
            handle.initialize()?;

            let pixel_type = PixelType::from_byte_depth(byte_depth).ok_or_else(|| {
                AcquisitionError::PixelTypeMismatch {
                    expected: None,
                    found: format!("{} byte(s) per pixel", byte_depth),
                }
            })?;
            let mut committed = 0;
            for p in 0..positions.max(1) {
                for t in 0..frames {
                    for z in 0..slices {
                        for c in 0..channels {
                            let coords = Coords::new(t, c, z, p);
                            let outcome = handle.insert(synthetic_frame(width, height, pixel_type, coords), coords)?;
                            if outcome != InsertOutcome::Dropped {
                                committed += 1;
                            }
                        }
                    }
                }
            }
            if let Some(storage) = handle.storage() {
                storage.freeze();
            }
            info!(
                "[{}] Recorded {} frame(s){}",
                handle.name(),
                committed,
                handle
                    .save_path()
                    .map(|p| format!(" to {}", p.display()))
                    .unwrap_or_default()
            );
            registry.close_all()
        }
        Command::Inspect {
            name,
            root,
            load_into_memory,
        } => {
            let registry = AcquisitionRegistry::new(AcquisitionContext::headless(&config)?);
            let handle = registry.open(&name, root, false, !load_into_memory, true)?;
            handle.initialize()?;
            let storage = handle.storage();
            let report = InspectReport {
                name: handle.name().to_string(),
                kind: handle.storage_kind(),
                save_path: handle.save_path(),
                dimensions: handle.dimensions(),
                extent: handle.extent(),
                planes: storage.as_ref().map(|s| s.coords().len()).unwrap_or(0),
                axis_lengths: storage.as_ref().map(|s| axis_lengths(s.as_ref())).unwrap_or_default(),
                data_size_bytes: storage.as_ref().map(|s| s.data_size_bytes()).unwrap_or(0),
                summary: handle.summary_metadata(),
            };
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Unable to encode report: {}", e),
            }
            registry.close_all()
        }
        Command::NextDir { root, prefix } => {
            println!("{}", next_directory_name(&root, &prefix)?);
            Ok(())
        }
    }
}

/// Number of indices the backend holds along each named axis.
fn axis_lengths(storage: &dyn FrameStorage) -> BTreeMap<&'static str, u32> {
    Axis::ALL
        .iter()
        .map(|axis| (axis.as_str(), storage.axis_length(*axis)))
        .collect()
}

/// Ramp pattern shifted by the plane coordinates, so planes differ from each other.
fn synthetic_frame(width: u32, height: u32, pixel_type: PixelType, coords: Coords) -> TaggedFrame {
    let len = width as usize * height as usize * pixel_type.bytes_per_pixel();
    let shift = (coords.frame + coords.channel * 7 + coords.slice * 13 + coords.position * 17) as usize;
    let pixels = (0..len).map(|i| ((i + shift) % 251) as u8).collect();
    TaggedFrame::new(pixels, FrameTags::new(width, height, pixel_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use acqman::storage::memory_storage::MemoryStorage;

    #[test]
    fn synthetic_frames_match_declared_geometry() {
        let frame = synthetic_frame(4, 3, PixelType::Gray16, Coords::new(1, 0, 0, 0));
        assert_eq!(frame.pixels.len(), frame.tags.expected_len());
        let other = synthetic_frame(4, 3, PixelType::Gray16, Coords::new(2, 0, 0, 0));
        assert_ne!(frame.pixels, other.pixels);
    }

    #[test]
    fn axis_lengths_are_keyed_by_axis_name() {
        let storage = MemoryStorage::new();
        for coords in [Coords::new(0, 0, 0, 0), Coords::new(2, 1, 0, 0)] {
            let mut frame = synthetic_frame(2, 2, PixelType::Gray8, coords);
            frame.tags.set_coords(coords);
            storage.accept_frame(frame).unwrap();
        }
        let lengths = axis_lengths(&storage);
        assert_eq!(lengths["time"], 3);
        assert_eq!(lengths["channel"], 2);
        assert_eq!(lengths["z"], 1);
        assert_eq!(lengths.len(), 4);
    }

    #[test]
    fn cli_parses_record_defaults() {
        let args = Args::try_parse_from(["acqman", "record", "--name", "Acq"]).unwrap();
        match args.command {
            Command::Record {
                frames, width, in_memory, ..
            } => {
                assert_eq!(frames, 3);
                assert_eq!(width, 64);
                assert!(!in_memory);
            }
            _ => panic!("expected record"),
        }
    }
}
