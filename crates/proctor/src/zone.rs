//! Screen-region classification of a gaze anchor point

use serde::{Deserialize, Serialize};

/// Coarse screen region: four edge bands and the center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoarseZone {
    Left,
    Right,
    Top,
    Bottom,
    Center,
}

/// Detailed screen region: coarse zones plus the four corners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetailedZone {
    #[serde(rename = "TL")]
    TopLeft,
    #[serde(rename = "TR")]
    TopRight,
    #[serde(rename = "BL")]
    BottomLeft,
    #[serde(rename = "BR")]
    BottomRight,
    #[serde(rename = "LEFT")]
    Left,
    #[serde(rename = "RIGHT")]
    Right,
    #[serde(rename = "TOP")]
    Top,
    #[serde(rename = "BOTTOM")]
    Bottom,
    #[serde(rename = "CENTER")]
    Center,
}

/// Which edge bands a point falls into
#[derive(Debug, Clone, Copy, Default)]
struct Bands {
    left: bool,
    right: bool,
    top: bool,
    bottom: bool,
}

/// Maps pixel positions to screen zones
#[derive(Debug, Clone, Copy)]
pub struct ZoneClassifier {
    edge_ratio: f32,
}

impl ZoneClassifier {
    pub fn new(edge_ratio: f32) -> Self {
        Self { edge_ratio }
    }

    fn bands(&self, x: f32, y: f32, width: u32, height: u32) -> Option<Bands> {
        if width == 0 || height == 0 || !x.is_finite() || !y.is_finite() {
            return None;
        }
        let (w, h) = (width as f32, height as f32);
        let r = self.edge_ratio;
        Some(Bands {
            left: x < w * r,
            right: x > w * (1.0 - r),
            top: y < h * r,
            bottom: y > h * (1.0 - r),
        })
    }

    /// Coarse zone; horizontal bands win over vertical ones
    pub fn coarse_zone(&self, x: f32, y: f32, width: u32, height: u32) -> CoarseZone {
        let Some(b) = self.bands(x, y, width, height) else {
            return CoarseZone::Center;
        };
        if b.left {
            CoarseZone::Left
        } else if b.right {
            CoarseZone::Right
        } else if b.top {
            CoarseZone::Top
        } else if b.bottom {
            CoarseZone::Bottom
        } else {
            CoarseZone::Center
        }
    }

    /// Detailed zone; corners take precedence over single edges
    pub fn detailed_zone(&self, x: f32, y: f32, width: u32, height: u32) -> DetailedZone {
        let Some(b) = self.bands(x, y, width, height) else {
            return DetailedZone::Center;
        };
        match (b.left, b.right, b.top, b.bottom) {
            (true, _, true, _) => DetailedZone::TopLeft,
            (true, _, _, true) => DetailedZone::BottomLeft,
            (_, true, true, _) => DetailedZone::TopRight,
            (_, true, _, true) => DetailedZone::BottomRight,
            (true, _, _, _) => DetailedZone::Left,
            (_, true, _, _) => DetailedZone::Right,
            (_, _, true, _) => DetailedZone::Top,
            (_, _, _, true) => DetailedZone::Bottom,
            _ => DetailedZone::Center,
        }
    }
}
