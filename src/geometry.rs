//! Sizes, device rotation and crop rectangles shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Immutable width/height pair in pixels. Both edges are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Creates a resolution. Panics on a zero edge, which is a caller bug.
    pub const fn new(width: u32, height: u32) -> Self {
        assert!(width > 0 && height > 0, "resolution edges must be non-zero");
        Self { width, height }
    }

    /// Creates a resolution from untrusted (device reported) values.
    pub fn try_new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Swaps width and height.
    pub fn transposed(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Exact aspect comparison by cross multiplication.
    pub fn same_aspect(&self, other: &Resolution) -> bool {
        u64::from(self.width) * u64::from(other.height)
            == u64::from(other.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    /// Parses `WIDTHxHEIGHT`, e.g. `1080x1920`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
        let width = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
        let height = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
        Resolution::try_new(width, height).ok_or_else(|| format!("zero-sized resolution {s:?}"))
    }
}

/// Host window rotation, fixed for the lifetime of one camera-open cycle.
///
/// The discriminant is the number of quarter turns, matching 0/90/180/270.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceOrientation {
    #[default]
    Up = 0,
    Left = 1,
    Down = 2,
    Right = 3,
}

impl DeviceOrientation {
    pub const ALL: [DeviceOrientation; 4] = [
        DeviceOrientation::Up,
        DeviceOrientation::Left,
        DeviceOrientation::Down,
        DeviceOrientation::Right,
    ];

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(DeviceOrientation::Up),
            90 => Some(DeviceOrientation::Left),
            180 => Some(DeviceOrientation::Down),
            270 => Some(DeviceOrientation::Right),
            _ => None,
        }
    }

    pub fn quarter_turns(self) -> u32 {
        self as u32
    }

    pub fn degrees(self) -> u32 {
        self.quarter_turns() * 90
    }

    /// True when the device is held upright or upside down. The sensor is
    /// mounted landscape, so the displayed frame has its axes swapped.
    pub fn is_portrait(self) -> bool {
        self.quarter_turns() % 2 == 0
    }

    /// Clockwise rotation the caller applies to the sensor image to show it upright.
    pub fn display_rotation_degrees(self) -> u32 {
        ((4 - self.quarter_turns()) % 4) * 90
    }

    /// Frame size as seen by the user, given the sensor-space stream size.
    pub fn upright(self, frame: Resolution) -> Resolution {
        if self.is_portrait() {
            frame.transposed()
        } else {
            frame
        }
    }
}

/// A caller supplied rectangle in preview-view pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ViewRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }
}

impl FromStr for ViewRect {
    type Err = String;

    /// Parses `left,top,right,bottom`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let edges = s
            .split(',')
            .map(|p| p.trim().parse::<i32>().map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        match edges.as_slice() {
            [l, t, r, b] => Ok(ViewRect::new(*l, *t, *r, *b)),
            _ => Err(format!("expected left,top,right,bottom, got {s:?}")),
        }
    }
}

/// Crop fractions of a sensor frame, already corrected for device rotation.
///
/// Either `left < right && top < bottom`, or the rect is [`NormalizedRect::EMPTY`],
/// which means "decode the whole frame".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl NormalizedRect {
    pub const EMPTY: NormalizedRect = NormalizedRect {
        left: 0.0,
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
    };

    pub const FULL: NormalizedRect = NormalizedRect {
        left: 0.0,
        top: 0.0,
        right: 1.0,
        bottom: 1.0,
    };

    /// Builds a rect, collapsing degenerate edges to [`NormalizedRect::EMPTY`].
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        let rect = Self {
            left: left.clamp(0.0, 1.0),
            top: top.clamp(0.0, 1.0),
            right: right.clamp(0.0, 1.0),
            bottom: bottom.clamp(0.0, 1.0),
        };
        if rect.left >= rect.right || rect.top >= rect.bottom {
            Self::EMPTY
        } else {
            rect
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    /// Pixel crop inside a `width` x `height` frame. Empty rects select the whole frame.
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let full = PixelRect {
            x: 0,
            y: 0,
            width,
            height,
        };
        if self.is_empty() {
            return full;
        }
        let left = ((self.left * width as f32) as u32).min(width);
        let top = ((self.top * height as f32) as u32).min(height);
        let right = ((self.right * width as f32) as u32).min(width);
        let bottom = ((self.bottom * height as f32) as u32).min(height);
        if left >= right || top >= bottom {
            return full;
        }
        PixelRect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }
}

impl Default for NormalizedRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Integer crop window inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
