use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use image::{DynamicImage, Rgb, RgbImage};
use nalgebra::{Point3, Vector2};

use holohud::camera::{Frame, FrameSource};
use holohud::config::Config;
use holohud::detector::LandmarkDetector;
use holohud::driver::{InferenceDriver, Tick};
use holohud::hologram::{rotation_rate, target_scale, Hologram};
use holohud::hud::{HudProjector, LinkStatus};
use holohud::landmarks::{face, hand, Landmarks};
use holohud::tracking::{lock, new_shared_state, SharedState};
use holohud::{Error, Result};

struct ScriptedSource {
    timestamp: u64,
    // frames the stream moves on between polling and grabbing
    lag: u64,
    grabs: usize,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            timestamp: 1,
            lag: 0,
            grabs: 0,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn timestamp(&mut self) -> Result<u64> {
        Ok(self.timestamp)
    }

    fn grab(&mut self) -> Result<Frame> {
        self.grabs += 1;
        // left pixel red, right pixel black
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        Ok(Frame {
            image: DynamicImage::ImageRgb8(image),
            timestamp: self.timestamp + self.lag,
        })
    }
}

// replays queued results, then keeps returning nothing
struct ScriptedDetector {
    calls: Arc<AtomicUsize>,
    results: VecDeque<Result<Vec<Landmarks>>>,
}

impl ScriptedDetector {
    fn new(results: Vec<Result<Vec<Landmarks>>>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = Self {
            calls: Arc::clone(&calls),
            results: results.into(),
        };
        (detector, calls)
    }
}

impl LandmarkDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Landmarks>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn face_at(x: f32, y: f32) -> Landmarks {
    let mut points = vec![Point3::origin(); face::COUNT];
    points[face::NOSE_TIP] = Point3::new(x, y, 0.0);
    Landmarks::new(points)
}

fn hand_at(x: f32, tip_gap: f32) -> Landmarks {
    let mut points = vec![Point3::new(x, 0.5, 0.0); hand::COUNT];
    points[hand::WRIST] = Point3::new(x, 0.7, 0.0);
    points[hand::THUMB_TIP] = Point3::new(x, 0.4, 0.0);
    points[hand::INDEX_TIP] = Point3::new(x + tip_gap, 0.4, 0.0);
    Landmarks::new(points)
}

fn driver(
    faces: Vec<Result<Vec<Landmarks>>>,
    hands: Vec<Result<Vec<Landmarks>>>,
) -> (
    InferenceDriver<ScriptedDetector, ScriptedDetector>,
    SharedState,
    Arc<AtomicUsize>,
    Arc<AtomicUsize>,
) {
    let state = new_shared_state();
    let (face_detector, face_calls) = ScriptedDetector::new(faces);
    let (hand_detector, hand_calls) = ScriptedDetector::new(hands);
    let driver = InferenceDriver::new(face_detector, hand_detector, Arc::clone(&state), &Config::default());
    (driver, state, face_calls, hand_calls)
}

#[test]
fn unchanged_timestamp_skips_detection() {
    let (mut driver, _state, face_calls, hand_calls) = driver(Vec::new(), Vec::new());
    let mut source = ScriptedSource::new();

    assert_eq!(driver.tick(&mut source), Tick::Processed);
    assert_eq!(face_calls.load(Ordering::SeqCst), 1);
    assert_eq!(hand_calls.load(Ordering::SeqCst), 1);

    assert_eq!(driver.tick(&mut source), Tick::Skipped);
    assert_eq!(face_calls.load(Ordering::SeqCst), 1);
    assert_eq!(hand_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.grabs, 1);

    source.timestamp = 2;
    assert_eq!(driver.tick(&mut source), Tick::Processed);
    assert_eq!(face_calls.load(Ordering::SeqCst), 2);
    assert_eq!(hand_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn grabbed_frame_timestamp_is_the_one_remembered() {
    let (mut driver, _state, face_calls, _) = driver(Vec::new(), Vec::new());
    let mut source = ScriptedSource::new();
    source.lag = 1;

    // polled 1, grabbed 2
    assert_eq!(driver.tick(&mut source), Tick::Processed);

    source.timestamp = 2;
    source.lag = 0;
    assert_eq!(driver.tick(&mut source), Tick::Skipped);
    assert_eq!(face_calls.load(Ordering::SeqCst), 1);

    source.timestamp = 3;
    assert_eq!(driver.tick(&mut source), Tick::Processed);
    assert_eq!(face_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn skipped_tick_leaves_state_untouched() {
    let (mut driver, state, _, _) = driver(vec![Ok(vec![face_at(0.3, 0.6)])], Vec::new());
    let mut source = ScriptedSource::new();

    driver.tick(&mut source);
    let generation = lock(&state).preview_generation;

    driver.tick(&mut source);
    let state = lock(&state);
    assert_eq!(state.preview_generation, generation);
    assert!(state.face.detected);
}

#[test]
fn lost_face_keeps_last_position() {
    let (mut driver, state, _, _) = driver(
        vec![Ok(vec![face_at(0.3, 0.6)]), Ok(Vec::new()), Ok(Vec::new())],
        Vec::new(),
    );
    let mut source = ScriptedSource::new();

    for timestamp in 1..=3 {
        source.timestamp = timestamp;
        driver.tick(&mut source);
    }

    let face = lock(&state).face;
    assert!(!face.detected);
    assert_eq!(face.position, Point3::new(0.3, 0.6, 0.0));
    assert_eq!(face.tilt, 0.0);
}

#[test]
fn detector_error_marks_lost_and_loop_continues() {
    let (mut driver, state, face_calls, _) = driver(
        vec![
            Ok(vec![face_at(0.4, 0.4)]),
            Err(Error::ModelOutput("scripted failure".into())),
            Ok(vec![face_at(0.5, 0.5)]),
        ],
        vec![Ok(vec![hand_at(0.5, 0.0)]), Ok(vec![hand_at(0.5, 0.0)])],
    );
    let mut source = ScriptedSource::new();

    driver.tick(&mut source);
    source.timestamp = 2;
    assert_eq!(driver.tick(&mut source), Tick::Processed);
    {
        let state = lock(&state);
        assert!(!state.face.detected);
        assert_eq!(state.face.position, Point3::new(0.4, 0.4, 0.0));
        // the hand detector is unaffected by the face failure
        assert!(state.hand.detected);
    }

    source.timestamp = 3;
    driver.tick(&mut source);
    assert_eq!(face_calls.load(Ordering::SeqCst), 3);
    let face = lock(&state).face;
    assert!(face.detected);
    assert_eq!(face.position, Point3::new(0.5, 0.5, 0.0));
}

#[test]
fn pinch_is_published_from_first_hand() {
    let (mut driver, state, _, _) = driver(
        Vec::new(),
        vec![Ok(vec![hand_at(0.25, 0.0), hand_at(0.9, 0.3)])],
    );
    driver.tick(&mut ScriptedSource::new());

    let hand = lock(&state).hand;
    assert!(hand.detected);
    assert!(hand.is_pinching);
    assert_eq!(hand.pinch_distance, 0.0);
    assert_eq!(hand.position, Point3::new(0.25, 0.7, 0.0));
}

#[test]
fn preview_is_mirrored() {
    let (mut driver, state, _, _) = driver(Vec::new(), Vec::new());
    driver.tick(&mut ScriptedSource::new());

    let state = lock(&state);
    let preview = state.preview.as_ref().unwrap().to_rgb8();
    assert_eq!(preview.get_pixel(0, 0).0, [0, 0, 0]);
    assert_eq!(preview.get_pixel(1, 0).0, [255, 0, 0]);
}

#[test]
fn raised_stop_flag_prevents_ticks() {
    let (mut driver, _state, face_calls, _) = driver(Vec::new(), Vec::new());
    let stop = AtomicBool::new(true);
    driver.run(&mut ScriptedSource::new(), &stop, Duration::ZERO);
    assert_eq!(face_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn tracked_hand_drives_hologram_and_face_drives_hud() {
    let config = Config::default();
    let (mut driver, state, _, _) = driver(
        vec![Ok(vec![face_at(0.2, 0.3)])],
        vec![Ok(vec![hand_at(1.0, 0.0)])],
    );
    driver.tick(&mut ScriptedSource::new());

    let (face, hand) = {
        let state = lock(&state);
        (state.face, state.hand)
    };

    let mut hud = HudProjector::new(&config.hud);
    let placement = hud.project(&face, Vector2::new(1000.0, 800.0));
    let position = placement.position.unwrap();
    assert_eq!(placement.status, LinkStatus::Online);
    assert_relative_eq!(position.x, 980.0, epsilon = 1e-3);
    assert_relative_eq!(position.y, 190.0, epsilon = 1e-3);

    assert_relative_eq!(
        rotation_rate(&hand, &config.hologram),
        config.hologram.base_rotation + 0.5 * config.hologram.sensitivity
    );
    assert_relative_eq!(target_scale(&hand, &config.hologram), 0.5 * config.hologram.base_scale);

    let mut hologram = Hologram::new(&config.hologram);
    hologram.step(&hand);
    assert!(hologram.scale() < config.hologram.base_scale);
}
