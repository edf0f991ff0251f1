//! Default summary metadata for acquisitions that did not bring their own.

use std::path::Path;

use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Map;
use uuid::Uuid;

use crate::hardware::Instrument;
use crate::session_management::session::{AcquisitionExtent, ImageDimensions};
use crate::storage::types::{PixelType, SummaryMetadata};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %z";
pub const METADATA_VERSION: u32 = 10;
pub const SOURCE: &str = "acqman";

/// ImageJ type code for the given byte depth and component count, -1 when there is none.
pub fn ij_type(byte_depth: u32, components: u32) -> i32 {
    match (byte_depth, components) {
        (1, _) => 0,
        (2, _) => 1,
        (8, _) => 64,
        (4, 1) => 2,
        (4, 4) => 4,
        _ => -1,
    }
}

/// Summary describing an acquisition named `prefix` with the given geometry,
/// stamped with host, user and the current time.
///
/// Each camera channel counts as a channel of its own.
pub fn default_summary(
    prefix: &str,
    directory: Option<&Path>,
    dimensions: &ImageDimensions,
    extent: &AcquisitionExtent,
    instrument: &dyn Instrument,
    start_time: DateTime<Utc>,
) -> SummaryMetadata {
    let components = instrument.number_of_components();
    let pixel_type = PixelType::from_components(components, dimensions.byte_depth);
    if pixel_type.is_none() {
        warn!(
            "[{}] No pixel type for {} component(s) at {} byte(s) per pixel",
            prefix, components, dimensions.byte_depth
        );
    }
    let computer_name = match whoami::fallible::hostname() {
        Ok(host) => Some(host),
        Err(e) => {
            warn!("Unable to read host name: {}", e);
            None
        }
    };
    let local = start_time.with_timezone(&chrono::Local);

    SummaryMetadata {
        prefix: Some(prefix.to_string()),
        directory: Some(directory.map(|d| d.display().to_string()).unwrap_or_default()),
        comment: Some(String::new()),
        computer_name,
        user_name: Some(whoami::username()),
        date: Some(local.format(DATE_FORMAT).to_string()),
        start_time: Some(local.format(TIME_FORMAT).to_string()),
        time: Some(local.format(TIME_FORMAT).to_string()),
        uuid: Some(Uuid::new_v4()),
        source: Some(SOURCE.to_string()),
        channel_group: instrument.channel_group(),
        bit_depth: Some(dimensions.bit_depth),
        depth: Some(instrument.bytes_per_pixel()),
        width: Some(dimensions.width),
        height: Some(dimensions.height),
        pixel_type,
        ij_type: Some(ij_type(dimensions.byte_depth, components)),
        num_components: Some(1),
        pixel_size_um: Some(instrument.pixel_size_um()),
        pixel_aspect: Some(1.0),
        frames: Some(extent.frames),
        channels: Some(extent.channels.saturating_mul(dimensions.channels_per_camera.max(1))),
        slices: Some(extent.slices),
        positions: Some(extent.positions),
        grid_row: Some(0),
        grid_column: Some(0),
        slices_first: Some(false),
        time_first: Some(true),
        metadata_version: Some(METADATA_VERSION),
        extra: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::InstrumentSettings;
    use crate::hardware::StaticInstrument;

    #[test]
    fn ij_type_table() {
        assert_eq!(ij_type(1, 1), 0);
        assert_eq!(ij_type(2, 3), 1);
        assert_eq!(ij_type(8, 1), 64);
        assert_eq!(ij_type(4, 1), 2);
        assert_eq!(ij_type(4, 4), 4);
        assert_eq!(ij_type(4, 3), -1);
        assert_eq!(ij_type(3, 1), -1);
    }

    #[test]
    fn default_summary_records_geometry_and_instrument() {
        let instrument = StaticInstrument::new(InstrumentSettings {
            bytes_per_pixel: 2,
            pixel_size_um: 0.5,
            number_of_components: 1,
            channel_group: Some("Dye".into()),
        });
        let dimensions = ImageDimensions {
            width: 64,
            height: 32,
            byte_depth: 2,
            bit_depth: 12,
            channels_per_camera: 1,
        };
        let extent = AcquisitionExtent {
            frames: 5,
            channels: 2,
            slices: 3,
            positions: 1,
        };
        let summary = default_summary(
            "Acq_3",
            Some(Path::new("/data")),
            &dimensions,
            &extent,
            &instrument,
            Utc::now(),
        );

        assert_eq!(summary.prefix.as_deref(), Some("Acq_3"));
        assert_eq!(summary.directory.as_deref(), Some("/data"));
        assert_eq!(summary.pixel_type, Some(PixelType::Gray16));
        assert_eq!(summary.ij_type, Some(1));
        assert_eq!(summary.width, Some(64));
        assert_eq!(summary.bit_depth, Some(12));
        assert_eq!(summary.frames, Some(5));
        assert_eq!(summary.slices, Some(3));
        assert_eq!(summary.pixel_size_um, Some(0.5));
        assert_eq!(summary.channel_group.as_deref(), Some("Dye"));
        assert_eq!(summary.metadata_version, Some(10));
        assert_eq!(summary.time_first, Some(true));
        assert!(summary.uuid.is_some());
        assert_eq!(summary.date.as_deref().map(str::len), Some(10));
    }

    #[test]
    fn camera_channels_multiply_channel_count() {
        let dimensions = ImageDimensions {
            channels_per_camera: 2,
            ..ImageDimensions::default()
        };
        let extent = AcquisitionExtent {
            channels: 3,
            ..AcquisitionExtent::default()
        };
        let summary = default_summary("Dual", None, &dimensions, &extent, &StaticInstrument::default(), Utc::now());
        assert_eq!(summary.channels, Some(6));
    }

    #[test]
    fn memory_acquisition_has_empty_directory() {
        let summary = default_summary(
            "Acq",
            None,
            &ImageDimensions::default(),
            &AcquisitionExtent::default(),
            &StaticInstrument::default(),
            Utc::now(),
        );
        assert_eq!(summary.directory.as_deref(), Some(""));
    }
}
