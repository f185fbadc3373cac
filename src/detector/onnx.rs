use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use nalgebra::Point3;
use ndarray::{Array, CowArray, IxDyn};
use ort::tensor::OrtOwnedTensor;
use ort::{Environment, ExecutionProvider, Session, SessionBuilder, Value};

use crate::camera::Frame;
use crate::config::ModelConfig;
use crate::detector::ssd::{BoundingBox, DetectorSpec, SsdDetector};
use crate::detector::LandmarkDetector;
use crate::error::{Error, Result};
use crate::landmarks::{face, hand, Landmarks};

/// Input and output layout of a MediaPipe style landmark model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSpec {
    pub name: &'static str,
    /// Side of the square NHWC input, in pixels.
    pub input_size: u32,
    pub landmark_count: usize,
    /// The presence output is a raw logit rather than a probability.
    pub flag_is_logit: bool,
    /// Padding added around the previous detection, relative to its size.
    pub padding: f32,
}

impl ModelSpec {
    pub const FACE: ModelSpec = ModelSpec {
        name: "face",
        input_size: 256,
        landmark_count: face::COUNT,
        flag_is_logit: true,
        padding: 0.25,
    };

    pub const HAND: ModelSpec = ModelSpec {
        name: "hand",
        input_size: 224,
        landmark_count: hand::COUNT,
        flag_is_logit: false,
        padding: 0.25,
    };
}

/// Square pixel region of the frame fed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl Roi {
    /// Largest square centered in a `width` x `height` frame.
    pub fn centered(width: u32, height: u32) -> Roi {
        let size = width.min(height).max(1);
        Roi {
            x: (width - size.min(width)) / 2,
            y: (height - size.min(height)) / 2,
            size,
        }
    }

    /// Square around a previous detection, padded and shifted to fit the frame.
    pub fn around(landmarks: &Landmarks, padding: f32, width: u32, height: u32) -> Option<Roi> {
        let ((min_x, min_y), (max_x, max_y)) = landmarks.bounds()?;
        let (w, h) = (width as f32, height as f32);

        let box_w = (max_x - min_x) * w;
        let box_h = (max_y - min_y) * h;
        let center = ((min_x + max_x) * 0.5 * w, (min_y + max_y) * 0.5 * h);

        Self::square(center, box_w.max(box_h) * (1.0 + 2.0 * padding), width, height)
    }

    /// Square seeded from a detector box: its larger side times `expansion`,
    /// centered on the box moved by `shift_y` box heights.
    pub fn from_box(found: &BoundingBox, expansion: f32, shift_y: f32, width: u32, height: u32) -> Option<Roi> {
        let (w, h) = (width as f32, height as f32);

        let box_w = (found.x_max - found.x_min) * w;
        let box_h = (found.y_max - found.y_min) * h;
        let center = (
            (found.x_min + found.x_max) * 0.5 * w,
            (found.y_min + found.y_max) * 0.5 * h + shift_y * box_h,
        );

        Self::square(center, box_w.max(box_h) * expansion, width, height)
    }

    fn square(center: (f32, f32), side: f32, width: u32, height: u32) -> Option<Roi> {
        let (w, h) = (width as f32, height as f32);
        let side = side.min(w).min(h);
        if !side.is_finite() || side < 1.0 {
            return None;
        }

        let x = (center.0 - side / 2.0).clamp(0.0, w - side);
        let y = (center.1 - side / 2.0).clamp(0.0, h - side);

        Some(Roi {
            x: x as u32,
            y: y as u32,
            size: side as u32,
        })
    }

    /// Maps a point from model input pixels back to normalized frame coordinates.
    fn to_frame(&self, p: &[f32], input_size: u32, width: u32, height: u32) -> Point3<f32> {
        let scale = self.size as f32 / input_size as f32;
        Point3::new(
            (self.x as f32 + p[0] * scale) / width as f32,
            (self.y as f32 + p[1] * scale) / height as f32,
            p[2] * scale / width as f32,
        )
    }
}

pub struct OnnxLandmarker {
    session: Session,
    spec: ModelSpec,
    presence_threshold: f32,
    // follows the last detection, reset when it is lost
    roi: Option<Roi>,
    // finds a new region after a loss; without one the centered square is used
    locator: Option<SsdDetector>,
}

impl OnnxLandmarker {
    pub fn new(
        model_path: &Path,
        spec: ModelSpec,
        presence_threshold: f32,
        intra_threads: i16,
    ) -> Result<OnnxLandmarker> {
        let session = load_session(model_path, spec.name, intra_threads)?;
        log::info!("loaded {} landmark model from {}", spec.name, model_path.display());

        Ok(OnnxLandmarker {
            session,
            spec,
            presence_threshold,
            roi: None,
            locator: None,
        })
    }

    pub fn with_locator(mut self, locator: SsdDetector) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn face(config: &ModelConfig) -> Result<OnnxLandmarker> {
        let landmarker = Self::new(
            &config.face,
            ModelSpec::FACE,
            config.presence_threshold,
            config.intra_threads,
        )?;
        Self::attach(landmarker, config.face_detector.as_deref(), DetectorSpec::FACE, config)
    }

    pub fn hand(config: &ModelConfig) -> Result<OnnxLandmarker> {
        let landmarker = Self::new(
            &config.hand,
            ModelSpec::HAND,
            config.presence_threshold,
            config.intra_threads,
        )?;
        Self::attach(landmarker, config.palm_detector.as_deref(), DetectorSpec::PALM, config)
    }

    fn attach(
        landmarker: OnnxLandmarker,
        path: Option<&Path>,
        spec: DetectorSpec,
        config: &ModelConfig,
    ) -> Result<OnnxLandmarker> {
        match path {
            Some(path) => {
                let locator = SsdDetector::new(path, spec, config.detection_threshold, config.intra_threads)?;
                Ok(landmarker.with_locator(locator))
            }
            None => {
                log::warn!(
                    "no {} configured, {} tracking restarts from the frame center",
                    spec.name,
                    landmarker.spec.name
                );
                Ok(landmarker)
            }
        }
    }

    // region for this frame: the tracked one, else whatever the locator finds
    fn region(&self, image: &DynamicImage) -> Result<Option<Roi>> {
        if let Some(roi) = self.roi {
            return Ok(Some(roi));
        }
        match self.locator.as_ref() {
            Some(locator) => locator.region(image),
            None => Ok(Some(Roi::centered(image.width(), image.height()))),
        }
    }

    // returns the raw landmark values and the presence score
    fn run_model(&self, input: &DynamicImage) -> Result<(Vec<f32>, f32)> {
        let size = self.spec.input_size;
        let input = input.resize_exact(size, size, FilterType::Triangle).to_rgb8();
        let array = nhwc_tensor(&input, false)?;

        let inputs = vec![Value::from_array(self.session.allocator(), &array)?];
        let outputs: Vec<Value> = self.session.run(inputs)?;

        if outputs.len() < 2 {
            return Err(Error::ModelOutput(format!(
                "{} model returned {} outputs, expected at least 2",
                self.spec.name,
                outputs.len()
            )));
        }

        let points: OrtOwnedTensor<f32, _> = outputs[0].try_extract()?;
        let points: Vec<f32> = points.view().iter().copied().collect();

        let flag: OrtOwnedTensor<f32, _> = outputs[1].try_extract()?;
        let flag = flag.view().iter().copied().next().ok_or_else(|| {
            Error::ModelOutput(format!("{} model returned an empty presence score", self.spec.name))
        })?;

        let score = if self.spec.flag_is_logit {
            sigmoid(flag)
        } else {
            flag
        };

        Ok((points, score))
    }
}

impl LandmarkDetector for OnnxLandmarker {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Landmarks>> {
        let (width, height) = (frame.image.width(), frame.image.height());
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let Some(roi) = self.region(&frame.image)? else {
            return Ok(Vec::new());
        };
        let crop = frame.image.crop_imm(roi.x, roi.y, roi.size, roi.size);

        let (raw, score) = self.run_model(&crop)?;

        let needed = self.spec.landmark_count * 3;
        if raw.len() < needed {
            return Err(Error::ModelOutput(format!(
                "{} model returned {} values, expected {}",
                self.spec.name,
                raw.len(),
                needed
            )));
        }

        if score < self.presence_threshold {
            self.roi = None;
            return Ok(Vec::new());
        }

        let points = raw[..needed]
            .chunks_exact(3)
            .map(|p| roi.to_frame(p, self.spec.input_size, width, height))
            .collect();
        let landmarks = Landmarks::new(points);

        self.roi = Roi::around(&landmarks, self.spec.padding, width, height);

        Ok(vec![landmarks])
    }
}

/// Creates an ONNX session on the CPU. Any failure, including the runtime
/// environment, is reported against `model_path`.
pub(crate) fn load_session(model_path: &Path, name: &str, intra_threads: i16) -> Result<Session> {
    let model_load = |source: ort::OrtError| Error::ModelLoad {
        path: model_path.to_path_buf(),
        source,
    };

    let environment = Environment::builder()
        .with_name(name)
        .with_execution_providers([ExecutionProvider::CPU(Default::default())])
        .build()
        .map_err(model_load)?
        .into_arc();

    SessionBuilder::new(&environment)
        .and_then(|builder| builder.with_intra_threads(intra_threads))
        .and_then(|builder| builder.with_model_from_file(model_path))
        .map_err(model_load)
}

/// 1xHxWx3 float tensor, channels in [0, 1] or, when `signed`, in [-1, 1].
pub(crate) fn nhwc_tensor<'a>(image: &RgbImage, signed: bool) -> Result<CowArray<'a, f32, IxDyn>> {
    let (width, height) = image.dimensions();
    let values: Vec<f32> = image
        .pixels()
        .flat_map(|p| p.0)
        .map(|p| {
            if signed {
                p as f32 / 127.5 - 1.0
            } else {
                p as f32 / 255.0
            }
        })
        .collect();

    let array = Array::from_shape_vec((1, height as usize, width as usize, 3), values)?;
    Ok(array.into_dyn().into())
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
