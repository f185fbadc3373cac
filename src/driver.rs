//! Frame-skip aware inference loop.
//!
//! The driver polls the frame source for its presentation timestamp and only
//! runs the detectors when a new frame has arrived. Results are interpreted
//! into [`FaceState`] / [`HandState`] and published to the shared state in a
//! single lock acquisition.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::DynamicImage;
use imageproc::drawing::draw_cross_mut;

use crate::camera::{Camera, FrameSource};
use crate::config::Config;
use crate::detector::onnx::OnnxLandmarker;
use crate::detector::LandmarkDetector;
use crate::error::{Error, Result};
use crate::landmarks::Landmarks;
use crate::tracking::{lock, FaceState, HandState, SharedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The frame was already processed, nothing ran.
    Skipped,
    Processed,
}

pub struct InferenceDriver<F, H> {
    face_detector: F,
    hand_detector: H,
    shared_state: SharedState,

    pinch_threshold: f32,
    mirror: bool,
    show_landmarks: bool,

    last_timestamp: Option<u64>,
    face: FaceState,
    hand: HandState,
    fps: FpsCounter,

    face_errors: ErrorReporter,
    hand_errors: ErrorReporter,
    source_errors: ErrorReporter,
}

impl<F: LandmarkDetector, H: LandmarkDetector> InferenceDriver<F, H> {
    pub fn new(face_detector: F, hand_detector: H, shared_state: SharedState, config: &Config) -> Self {
        Self {
            face_detector,
            hand_detector,
            shared_state,
            pinch_threshold: config.tracking.pinch_threshold,
            mirror: config.camera.mirror,
            show_landmarks: config.hud.show_landmarks,
            last_timestamp: None,
            face: FaceState::default(),
            hand: HandState::default(),
            fps: FpsCounter::new(10),
            face_errors: ErrorReporter::new("face detector"),
            hand_errors: ErrorReporter::new("hand detector"),
            source_errors: ErrorReporter::new("frame source"),
        }
    }

    /// Runs one scheduling tick against `source`.
    pub fn tick<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Tick {
        let timestamp = match source.timestamp() {
            Ok(timestamp) => timestamp,
            Err(err) => {
                self.source_errors.report(&err);
                return Tick::Skipped;
            }
        };
        if self.last_timestamp == Some(timestamp) {
            return Tick::Skipped;
        }
        self.last_timestamp = Some(timestamp);

        let frame = match source.grab() {
            Ok(frame) => {
                self.source_errors.clear();
                // the source may have advanced between polling and grabbing
                self.last_timestamp = Some(frame.timestamp);
                frame
            }
            Err(err) => {
                self.source_errors.report(&err);
                return Tick::Skipped;
            }
        };

        let (faces, hands) = rayon::join(
            || self.face_detector.detect(&frame),
            || self.hand_detector.detect(&frame),
        );

        let faces = match faces {
            Ok(faces) => {
                self.face_errors.clear();
                self.face.observe(&faces);
                faces
            }
            Err(err) => {
                self.face_errors.report(&err);
                self.face.lose();
                Vec::new()
            }
        };

        let hands = match hands {
            Ok(hands) => {
                self.hand_errors.clear();
                self.hand.observe(&hands, self.pinch_threshold);
                hands
            }
            Err(err) => {
                self.hand_errors.report(&err);
                self.hand.lose();
                Vec::new()
            }
        };

        let mut preview = if self.mirror {
            frame.image.fliph()
        } else {
            frame.image
        };
        if self.show_landmarks {
            draw_landmarks(&mut preview, faces.iter().chain(hands.iter()), self.mirror);
        }

        let fps = self.fps.tick(Instant::now());

        let mut state = lock(&self.shared_state);
        state.publish(self.face, self.hand);
        state.set_preview(preview);
        if fps.is_some() {
            state.fps = fps;
        }

        Tick::Processed
    }

    /// Ticks until `stop` is raised. Raising it only prevents the next tick.
    pub fn run<S: FrameSource + ?Sized>(&mut self, source: &mut S, stop: &AtomicBool, poll_interval: Duration) {
        while !stop.load(Ordering::Relaxed) {
            self.tick(source);
            if !poll_interval.is_zero() {
                thread::sleep(poll_interval);
            }
        }
    }
}

/// Starts the inference thread: opens the camera, loads both models and runs
/// the driver until `stop` is raised. Initialization failures are stored in
/// the shared state and end the thread.
pub fn spawn_worker(
    config: Config,
    shared_state: SharedState,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("inference".into())
        .spawn(move || {
            let (mut camera, face, hand) = match open_pipeline(&config) {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    log::error!("initialization failed: {}", err);
                    lock(&shared_state).init_error = Some(err.to_string());
                    return;
                }
            };

            lock(&shared_state).resolution = Some(camera.resolution());

            let mut driver = InferenceDriver::new(face, hand, shared_state, &config);
            driver.run(&mut camera, &stop, config.driver.poll_interval());

            log::info!("inference worker stopped");
        })
}

fn open_pipeline(config: &Config) -> Result<(Camera, OnnxLandmarker, OnnxLandmarker)> {
    let face = OnnxLandmarker::face(&config.models)?;
    let hand = OnnxLandmarker::hand(&config.models)?;
    let camera = Camera::open(&config.camera)?;
    Ok((camera, face, hand))
}

fn draw_landmarks<'a>(image: &mut DynamicImage, detections: impl Iterator<Item = &'a Landmarks>, mirrored: bool) {
    let green = image::Rgba([0u8, 255u8, 0u8, 255u8]);
    let (w, h) = (image.width() as f32, image.height() as f32);

    for landmarks in detections {
        for p in landmarks.points.iter() {
            let x = if mirrored { 1.0 - p.x } else { p.x };
            draw_cross_mut(image, green, (x * w) as i32, (p.y * h) as i32);
        }
    }
}

// logs the first failure of a run at warn, repeats at debug
struct ErrorReporter {
    name: &'static str,
    failing: bool,
}

impl ErrorReporter {
    fn new(name: &'static str) -> Self {
        Self { name, failing: false }
    }

    fn report(&mut self, err: &Error) {
        if self.failing {
            log::debug!("{} still failing: {}", self.name, err);
        } else {
            log::warn!("{} failed, treating as not detected: {}", self.name, err);
            self.failing = true;
        }
    }

    fn clear(&mut self) {
        if self.failing {
            log::info!("{} recovered", self.name);
            self.failing = false;
        }
    }
}

struct FpsCounter {
    last_frame_time: Option<Instant>,
    samples: VecDeque<f32>,
    max_length: usize,
}

impl FpsCounter {
    fn new(max_length: usize) -> Self {
        Self {
            last_frame_time: None,
            samples: VecDeque::with_capacity(max_length),
            max_length,
        }
    }

    // mean over the last `max_length` frame deltas
    fn tick(&mut self, now: Instant) -> Option<f32> {
        let last = self.last_frame_time.replace(now)?;
        let delta = now.duration_since(last).as_secs_f32();
        if delta <= 0.0 {
            return None;
        }

        self.samples.push_back(1.0 / delta);
        if self.samples.len() > self.max_length {
            self.samples.pop_front();
        }

        Some((self.samples.iter().sum::<f32>() / self.samples.len() as f32).round())
    }
}
