//! Single-shot box detectors (BlazeFace, palm detection).
//!
//! They run on the whole frame, so they are only used to find a region for
//! the landmark models when nothing is being tracked.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ort::tensor::OrtOwnedTensor;
use ort::{Session, Value};

use crate::detector::onnx::{load_session, nhwc_tensor, sigmoid, Roi};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSpec {
    pub name: &'static str,
    pub input_size: u32,
    /// Stride of each anchor layer. Consecutive layers with the same stride share a grid.
    pub strides: &'static [u32],
    /// Side of the landmark crop relative to the larger side of the box.
    pub expansion: f32,
    /// Vertical shift of the crop center, in box heights.
    pub shift_y: f32,
}

impl DetectorSpec {
    pub const FACE: DetectorSpec = DetectorSpec {
        name: "face detector",
        input_size: 128,
        strides: &[8, 16, 16, 16],
        expansion: 1.5,
        shift_y: 0.0,
    };

    // the palm box leaves out the fingers, which sit above it for an upright hand
    pub const PALM: DetectorSpec = DetectorSpec {
        name: "palm detector",
        input_size: 192,
        strides: &[8, 16, 16, 16],
        expansion: 2.6,
        shift_y: -0.5,
    };
}

/// Axis-aligned box, normalized to the frame it was found in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

/// Anchor centers of an SSD model with fixed size anchors, two per layer and
/// grid cell, in the order the model emits its predictions.
pub fn ssd_anchors(input_size: u32, strides: &[u32]) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    let mut layer = 0;

    while layer < strides.len() {
        let stride = strides[layer];
        let shared = strides[layer..].iter().take_while(|&&s| s == stride).count();
        let per_cell = 2 * shared;
        let cells = (input_size + stride - 1) / stride;

        for y in 0..cells {
            for x in 0..cells {
                let anchor = Anchor {
                    x: (x as f32 + 0.5) / cells as f32,
                    y: (y as f32 + 0.5) / cells as f32,
                };
                anchors.extend(std::iter::repeat(anchor).take(per_cell));
            }
        }

        layer += shared;
    }

    anchors
}

/// Decodes the highest scoring prediction. `scores` are logits, one per
/// anchor; `regressors` hold a row per anchor starting with the box center
/// offset and size in input pixels. The box is normalized to the model input.
pub fn decode_best(
    scores: &[f32],
    regressors: &[f32],
    anchors: &[Anchor],
    input_size: u32,
    threshold: f32,
) -> Result<Option<BoundingBox>> {
    if anchors.is_empty() || scores.len() != anchors.len() || regressors.len() % anchors.len() != 0 {
        return Err(Error::ModelOutput(format!(
            "{} scores and {} box values do not match {} anchors",
            scores.len(),
            regressors.len(),
            anchors.len()
        )));
    }
    let row = regressors.len() / anchors.len();
    if row < 4 {
        return Err(Error::ModelOutput(format!("box rows have {} values, expected at least 4", row)));
    }

    let best = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| score.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1));
    let Some((index, &logit)) = best else {
        return Ok(None);
    };

    let score = sigmoid(logit);
    if score < threshold {
        return Ok(None);
    }

    let size = input_size as f32;
    let anchor = anchors[index];
    let values = &regressors[index * row..index * row + 4];

    let center_x = values[0] / size + anchor.x;
    let center_y = values[1] / size + anchor.y;
    let half_w = values[2] / size / 2.0;
    let half_h = values[3] / size / 2.0;

    Ok(Some(BoundingBox {
        x_min: center_x - half_w,
        y_min: center_y - half_h,
        x_max: center_x + half_w,
        y_max: center_y + half_h,
        score,
    }))
}

/// How a frame is fitted, aspect ratio kept, into the square model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letterbox {
    pub input_size: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
}

impl Letterbox {
    pub fn fit(frame_width: u32, frame_height: u32, input_size: u32) -> Letterbox {
        let scale = input_size as f32 / frame_width.max(frame_height).max(1) as f32;
        let width = ((frame_width as f32 * scale).round() as u32).clamp(1, input_size);
        let height = ((frame_height as f32 * scale).round() as u32).clamp(1, input_size);

        Letterbox {
            input_size,
            offset_x: (input_size - width) / 2,
            offset_y: (input_size - height) / 2,
            width,
            height,
        }
    }

    pub fn apply(&self, image: &DynamicImage) -> RgbImage {
        let scaled = image
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .to_rgb8();
        let mut canvas = RgbImage::new(self.input_size, self.input_size);
        imageops::replace(&mut canvas, &scaled, self.offset_x as i64, self.offset_y as i64);
        canvas
    }

    /// Maps a box normalized to the model input back onto the frame.
    pub fn to_frame(&self, found: &BoundingBox) -> BoundingBox {
        let size = self.input_size as f32;
        let x = |v: f32| (v * size - self.offset_x as f32) / self.width as f32;
        let y = |v: f32| (v * size - self.offset_y as f32) / self.height as f32;

        BoundingBox {
            x_min: x(found.x_min),
            y_min: y(found.y_min),
            x_max: x(found.x_max),
            y_max: y(found.y_max),
            score: found.score,
        }
    }
}

pub struct SsdDetector {
    session: Session,
    spec: DetectorSpec,
    anchors: Vec<Anchor>,
    threshold: f32,
}

impl SsdDetector {
    pub fn new(model_path: &Path, spec: DetectorSpec, threshold: f32, intra_threads: i16) -> Result<SsdDetector> {
        let session = load_session(model_path, spec.name, intra_threads)?;
        log::info!("loaded {} from {}", spec.name, model_path.display());

        Ok(SsdDetector {
            session,
            spec,
            anchors: ssd_anchors(spec.input_size, spec.strides),
            threshold,
        })
    }

    /// Best box in normalized frame coordinates, if one clears the threshold.
    pub fn locate(&self, image: &DynamicImage) -> Result<Option<BoundingBox>> {
        let letterbox = Letterbox::fit(image.width(), image.height(), self.spec.input_size);
        let array = nhwc_tensor(&letterbox.apply(image), true)?;

        let inputs = vec![Value::from_array(self.session.allocator(), &array)?];
        let outputs: Vec<Value> = self.session.run(inputs)?;

        // score tensors end in a single channel, box tensors in the regressor row;
        // models split by anchor layer list the parts in anchor order
        let mut scores = Vec::with_capacity(self.anchors.len());
        let mut regressors = Vec::new();
        for output in outputs.iter() {
            let tensor: OrtOwnedTensor<f32, _> = output.try_extract()?;
            let view = tensor.view();
            if view.shape().last() == Some(&1) {
                scores.extend(view.iter().copied());
            } else {
                regressors.extend(view.iter().copied());
            }
        }

        let found = decode_best(&scores, &regressors, &self.anchors, self.spec.input_size, self.threshold)?;
        Ok(found.map(|found| letterbox.to_frame(&found)))
    }

    /// Landmark crop for the best box, if any.
    pub fn region(&self, image: &DynamicImage) -> Result<Option<Roi>> {
        let Some(found) = self.locate(image)? else {
            log::trace!("{} found nothing", self.spec.name);
            return Ok(None);
        };
        log::debug!("{} found a box with score {:.2}", self.spec.name, found.score);

        Ok(Roi::from_box(
            &found,
            self.spec.expansion,
            self.spec.shift_y,
            image.width(),
            image.height(),
        ))
    }
}
