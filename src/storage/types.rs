//! Data types shared by every storage backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Position of one image plane inside an acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coords {
    pub frame: u32,
    pub channel: u32,
    pub slice: u32,
    pub position: u32,
}

impl Coords {
    pub fn new(frame: u32, channel: u32, slice: u32, position: u32) -> Self {
        Self {
            frame,
            channel,
            slice,
            position,
        }
    }

    pub fn index(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Frame => self.frame,
            Axis::Channel => self.channel,
            Axis::Slice => self.slice,
            Axis::Position => self.position,
        }
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame={} channel={} slice={} position={}",
            self.frame, self.channel, self.slice, self.position
        )
    }
}

/// Named acquisition axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Frame,
    Channel,
    Slice,
    Position,
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::Frame, Axis::Channel, Axis::Slice, Axis::Position];

    /// Name of the axis in summary and report output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Frame => "time",
            Axis::Channel => "channel",
            Axis::Slice => "z",
            Axis::Position => "position",
        }
    }
}

/// Pixel layouts an acquisition can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    #[serde(rename = "GRAY8")]
    Gray8,
    #[serde(rename = "GRAY16")]
    Gray16,
    #[serde(rename = "GRAY32")]
    Gray32,
    #[serde(rename = "RGB32")]
    Rgb32,
    #[serde(rename = "RGB64")]
    Rgb64,
}

impl PixelType {
    /// Pixel type an acquisition of the given byte depth expects its frames to carry.
    pub fn from_byte_depth(byte_depth: u32) -> Option<Self> {
        match byte_depth {
            1 => Some(PixelType::Gray8),
            2 => Some(PixelType::Gray16),
            4 => Some(PixelType::Rgb32),
            8 => Some(PixelType::Rgb64),
            _ => None,
        }
    }

    /// Pixel type as named from the camera's component count and the byte depth.
    pub fn from_components(components: u32, byte_depth: u32) -> Option<Self> {
        match (components == 1, byte_depth) {
            (true, 1) => Some(PixelType::Gray8),
            (true, 2) => Some(PixelType::Gray16),
            (true, 4) => Some(PixelType::Gray32),
            (false, 4) => Some(PixelType::Rgb32),
            (false, 8) => Some(PixelType::Rgb64),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelType::Gray8 => 1,
            PixelType::Gray16 => 2,
            PixelType::Gray32 | PixelType::Rgb32 => 4,
            PixelType::Rgb64 => 8,
        }
    }

    /// Number of colour components stored per pixel. RGB layouts carry a padding slot.
    pub fn components(&self) -> usize {
        match self {
            PixelType::Rgb32 | PixelType::Rgb64 => 3,
            _ => 1,
        }
    }

    /// Single-component type each colour component of this type splits into.
    pub fn component_type(&self) -> PixelType {
        match self {
            PixelType::Rgb32 => PixelType::Gray8,
            PixelType::Rgb64 => PixelType::Gray16,
            other => *other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelType::Gray8 => "GRAY8",
            PixelType::Gray16 => "GRAY16",
            PixelType::Gray32 => "GRAY32",
            PixelType::Rgb32 => "RGB32",
            PixelType::Rgb64 => "RGB64",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-frame metadata travelling with the pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FrameTags {
    pub width: u32,
    pub height: u32,
    pub pixel_type: PixelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_index: Option<u32>,
    #[serde(rename = "ElapsedTime-ms", default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Tags this crate does not interpret, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FrameTags {
    pub fn new(width: u32, height: u32, pixel_type: PixelType) -> Self {
        Self {
            width,
            height,
            pixel_type,
            frame_index: None,
            channel_index: None,
            slice_index: None,
            position_index: None,
            elapsed_time_ms: None,
            time: None,
            extra: Map::new(),
        }
    }

    pub fn set_coords(&mut self, coords: Coords) {
        self.frame_index = Some(coords.frame);
        self.channel_index = Some(coords.channel);
        self.slice_index = Some(coords.slice);
        self.position_index = Some(coords.position);
    }

    /// Coordinates stamped on the tags; unset indices read as 0.
    pub fn coords(&self) -> Coords {
        Coords {
            frame: self.frame_index.unwrap_or(0),
            channel: self.channel_index.unwrap_or(0),
            slice: self.slice_index.unwrap_or(0),
            position: self.position_index.unwrap_or(0),
        }
    }

    /// Bytes the pixel buffer must hold for the declared geometry.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_type.bytes_per_pixel()
    }
}

/// One image plane and its tags.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedFrame {
    pub pixels: Vec<u8>,
    pub tags: FrameTags,
}

impl TaggedFrame {
    pub fn new(pixels: Vec<u8>, tags: FrameTags) -> Self {
        Self { pixels, tags }
    }

    pub fn coords(&self) -> Coords {
        self.tags.coords()
    }

    /// Splits a multi-component frame into one single-component frame per component.
    ///
    /// Component `i` of channel `c` lands on channel `c * components + i`. Frames that
    /// already have a single component are returned unchanged.
    pub fn split_components(self) -> Vec<TaggedFrame> {
        let pixel_type = self.tags.pixel_type;
        let components = pixel_type.components();
        if components == 1 {
            return vec![self];
        }

        let stride = pixel_type.bytes_per_pixel();
        let component_type = pixel_type.component_type();
        let width = component_type.bytes_per_pixel();
        let base = self.coords();

        (0..components)
            .map(|i| {
                let offset = i * width;
                let pixels: Vec<u8> = self
                    .pixels
                    .chunks_exact(stride)
                    .flat_map(|px| px[offset..offset + width].iter().copied())
                    .collect();
                let mut tags = self.tags.clone();
                tags.pixel_type = component_type;
                tags.set_coords(Coords {
                    channel: base.channel * components as u32 + i as u32,
                    ..base
                });
                TaggedFrame { pixels, tags }
            })
            .collect()
    }
}

/// Description of a whole acquisition, stored once per backend.
///
/// Keys serialize in the PascalCase form other acquisition tools read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SummaryMetadata {
    pub prefix: Option<String>,
    pub directory: Option<String>,
    pub comment: Option<String>,
    pub computer_name: Option<String>,
    pub user_name: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub time: Option<String>,
    #[serde(rename = "UUID")]
    pub uuid: Option<Uuid>,
    pub source: Option<String>,
    pub channel_group: Option<String>,
    pub bit_depth: Option<u32>,
    /// Bytes per pixel reported by the instrument.
    pub depth: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pixel_type: Option<PixelType>,
    #[serde(rename = "IJType")]
    pub ij_type: Option<i32>,
    pub num_components: Option<u32>,
    #[serde(rename = "PixelSize_um")]
    pub pixel_size_um: Option<f64>,
    pub pixel_aspect: Option<f64>,
    pub frames: Option<u32>,
    pub channels: Option<u32>,
    pub slices: Option<u32>,
    pub positions: Option<u32>,
    pub grid_row: Option<i32>,
    pub grid_column: Option<i32>,
    pub slices_first: Option<bool>,
    pub time_first: Option<bool>,
    pub metadata_version: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Which of the three backend variants holds an acquisition's frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    Memory,
    MultiPage,
    SinglePlaneSeries,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Memory => write!(f, "memory"),
            StorageKind::MultiPage => write!(f, "multi-page"),
            StorageKind::SinglePlaneSeries => write!(f, "single-plane series"),
        }
    }
}

/// Identifier shared by a backend and every display bound to it.
pub type StorageId = Uuid;
