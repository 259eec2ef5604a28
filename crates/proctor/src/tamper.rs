//! Scene tamper detection via background subtraction
//!
//! A running per-pixel Gaussian background model over the grayscale frame
//! yields a foreground mask. The mask is cleaned with two erosions and two
//! dilations (5x5 square kernel), contours are traced, and the bounding boxes
//! of large outer contours are summed. A large foreground area means the
//! camera was covered, moved, or something was pushed in front of it.

use crate::event::{round2, Event, EventKind};
use crate::{DetectorConfig, ProctorError};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use ndarray::{Array2, Zip};
use tracing::debug;
use video_frame::VideoFrame;

/// Frames over which the learning rate settles
pub const DEFAULT_HISTORY: u32 = 500;

/// Squared Mahalanobis distance above which a pixel is foreground
pub const DEFAULT_VAR_THRESHOLD: f32 = 16.0;

/// Contours narrower and shorter than this are noise
pub const MIN_CONTOUR_SIDE: u32 = 40;

const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;

/// Kernel radius for a 5x5 square structuring element
const KERNEL_RADIUS: u8 = 2;

/// Running single-Gaussian background model
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    mean: Array2<f32>,
    var: Array2<f32>,
    frames: u32,
    history: u32,
    var_threshold: f32,
}

impl BackgroundModel {
    pub fn new(history: u32, var_threshold: f32) -> Self {
        Self {
            mean: Array2::zeros((0, 0)),
            var: Array2::zeros((0, 0)),
            frames: 0,
            history: history.max(1),
            var_threshold,
        }
    }

    /// Frames absorbed since the model was (re)initialised
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Classify pixels against the model, then fold the frame into it.
    /// Returns a 0/255 foreground mask.
    pub fn apply(&mut self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        let shape = (height as usize, width as usize);
        let pixels = gray.as_raw();

        if self.frames == 0 || self.mean.dim() != shape {
            debug!("Initialising background model at {}x{}", width, height);
            self.mean = Array2::from_shape_fn(shape, |(y, x)| pixels[y * shape.1 + x] as f32);
            self.var = Array2::from_elem(shape, VAR_INIT);
            self.frames = 1;
            return GrayImage::new(width, height);
        }

        self.frames = self.frames.saturating_add(1);
        let alpha = 1.0 / self.frames.min(self.history) as f32;
        let threshold = self.var_threshold;

        let mut mask = GrayImage::new(width, height);
        Zip::indexed(&mut self.mean)
            .and(&mut self.var)
            .for_each(|(y, x), mean, var| {
                let value = pixels[y * shape.1 + x] as f32;
                let diff = value - *mean;
                let dist2 = diff * diff;
                if dist2 > threshold * *var {
                    mask.put_pixel(x as u32, y as u32, Luma([255]));
                }
                *mean += alpha * diff;
                *var = (*var + alpha * (dist2 - *var)).clamp(VAR_MIN, VAR_MAX);
            });
        mask
    }
}

impl Default for BackgroundModel {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY, DEFAULT_VAR_THRESHOLD)
    }
}

/// Global, face-independent scene change detector
#[derive(Debug, Clone)]
pub struct TamperDetector {
    model: BackgroundModel,
    area_ratio: f64,
}

impl TamperDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            model: BackgroundModel::default(),
            area_ratio: config.tamper_area_ratio,
        }
    }

    /// Update the background model with `frame` and flag large foreground
    pub fn check(
        &mut self,
        frame: &VideoFrame,
        now: f64,
        events: &mut Vec<Event>,
    ) -> Result<(), ProctorError> {
        let gray = frame.to_gray_image()?;
        let mask = self.model.apply(&gray);

        let area = foreground_area(&mask);
        let frame_area = frame.area() as f64;
        if area as f64 >= frame_area * self.area_ratio {
            let ratio = area as f64 / frame_area;
            debug!("Foreground covers {:.2} of the frame", ratio);
            events.push(Event::new(
                now,
                EventKind::TamperDetected {
                    area_ratio: round2(ratio),
                },
            ));
        }
        Ok(())
    }
}

/// Summed bounding-box area of large outer contours in a cleaned mask
pub fn foreground_area(mask: &GrayImage) -> u64 {
    let mut cleaned = erode(mask, Norm::LInf, KERNEL_RADIUS);
    cleaned = erode(&cleaned, Norm::LInf, KERNEL_RADIUS);
    cleaned = dilate(&cleaned, Norm::LInf, KERNEL_RADIUS);
    cleaned = dilate(&cleaned, Norm::LInf, KERNEL_RADIUS);

    find_contours::<i32>(&cleaned)
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer))
        .filter_map(bounding_box)
        .filter(|&(w, h)| w >= MIN_CONTOUR_SIDE || h >= MIN_CONTOUR_SIDE)
        .map(|(w, h)| w as u64 * h as u64)
        .sum()
}

/// Inclusive bounding box size of a contour
fn bounding_box(contour: &Contour<i32>) -> Option<(u32, u32)> {
    let first = contour.points.first()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    Some(((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32))
}
