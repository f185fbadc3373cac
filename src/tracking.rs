//! Tracking state shared between the inference worker and the UI.
//!
//! Both face and hand records follow a stale-on-loss policy: when tracking is
//! lost only `detected` flips, the last known position is kept so the
//! presentation side can fade out instead of snapping back to a default.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::DynamicImage;
use nalgebra::Point3;

use crate::landmarks::{face, hand, Landmarks};

// make SharedState an alias for a Mutex protected struct TrackingState
pub type SharedState = Arc<Mutex<TrackingState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(TrackingState::default()))
}

/// Locks the shared state. A poisoned lock is recovered since the state is plain data.
pub fn lock(state: &SharedState) -> MutexGuard<'_, TrackingState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceState {
    pub detected: bool,
    /// Nose tip in normalized image coordinates.
    pub position: Point3<f32>,
    /// Reserved for head roll. Never computed, always zero.
    pub tilt: f32,
}

impl Default for FaceState {
    fn default() -> Self {
        Self {
            detected: false,
            position: Point3::origin(),
            tilt: 0.0,
        }
    }
}

impl FaceState {
    /// Updates the record from one detector result. Only the first face is used.
    pub fn observe(&mut self, faces: &[Landmarks]) {
        match faces.first().and_then(|f| f.get_point(face::NOSE_TIP)) {
            Some(nose) => {
                self.detected = true;
                self.position = nose;
                self.tilt = 0.0;
            }
            None => self.lose(),
        }
    }

    pub fn lose(&mut self) {
        self.detected = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandState {
    pub detected: bool,
    pub is_pinching: bool,
    /// Thumb tip to index tip, in the image plane.
    pub pinch_distance: f32,
    /// Wrist in normalized image coordinates.
    pub position: Point3<f32>,
}

impl Default for HandState {
    fn default() -> Self {
        Self {
            detected: false,
            is_pinching: false,
            pinch_distance: 0.0,
            position: Point3::origin(),
        }
    }
}

impl HandState {
    /// Updates the record from one detector result. Only the first hand is used.
    pub fn observe(&mut self, hands: &[Landmarks], pinch_threshold: f32) {
        let first = match hands.first() {
            Some(h) if h.len() >= hand::COUNT => h,
            _ => return self.lose(),
        };
        let (Some(distance), Some(wrist)) = (
            first.planar_distance(hand::THUMB_TIP, hand::INDEX_TIP),
            first.get_point(hand::WRIST),
        ) else {
            return self.lose();
        };

        self.detected = true;
        self.pinch_distance = distance;
        self.is_pinching = distance < pinch_threshold;
        self.position = wrist;
    }

    pub fn lose(&mut self) {
        self.detected = false;
    }
}

// the data that will be shared between the threads
#[derive(Default)]
pub struct TrackingState {
    pub face: FaceState,
    pub hand: HandState,

    /// Mirrored camera frame for display, bumped by `preview_generation`.
    pub preview: Option<DynamicImage>,
    pub preview_generation: u64,

    pub fps: Option<f32>,
    pub resolution: Option<(u32, u32)>,

    /// Set once when the camera or a model could not be opened.
    pub init_error: Option<String>,
}

impl TrackingState {
    /// Replaces both tracking records at once.
    pub fn publish(&mut self, face: FaceState, hand: HandState) {
        self.face = face;
        self.hand = hand;
    }

    pub fn set_preview(&mut self, image: DynamicImage) {
        self.preview = Some(image);
        self.preview_generation = self.preview_generation.wrapping_add(1);
    }
}
