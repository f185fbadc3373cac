//! Screen-space placement of the HUD panel.

use std::time::{Duration, Instant};

use nalgebra::{Point2, Point3, Vector2};

use crate::config::HudConfig;
use crate::tracking::FaceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Online,
    Searching,
}

impl LinkStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LinkStatus::Online => "TARGET LOCKED // ONLINE",
            LinkStatus::Searching => "SCANNING // SEARCHING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HudPlacement {
    /// Top-left corner of the panel. `None` until a face was seen once.
    pub position: Option<Point2<f32>>,
    pub opacity: f32,
    pub status: LinkStatus,
}

/// Projects a normalized point onto a viewport, flipping x to match the
/// mirrored camera feed, then applies the panel offset.
pub fn screen_position(point: &Point3<f32>, viewport: Vector2<f32>, offset: Vector2<f32>) -> Point2<f32> {
    Point2::new(
        (1.0 - point.x) * viewport.x + offset.x,
        point.y * viewport.y + offset.y,
    )
}

pub struct HudProjector {
    offset: Vector2<f32>,
    dim_opacity: f32,
    last_position: Option<Point2<f32>>,
}

impl HudProjector {
    pub fn new(config: &HudConfig) -> Self {
        Self {
            offset: Vector2::new(config.offset_x, config.offset_y),
            dim_opacity: config.dim_opacity,
            last_position: None,
        }
    }

    pub fn project(&mut self, face: &FaceState, viewport: Vector2<f32>) -> HudPlacement {
        if face.detected {
            let position = screen_position(&face.position, viewport, self.offset);
            self.last_position = Some(position);
            HudPlacement {
                position: Some(position),
                opacity: 1.0,
                status: LinkStatus::Online,
            }
        } else {
            HudPlacement {
                position: self.last_position,
                opacity: self.dim_opacity,
                status: LinkStatus::Searching,
            }
        }
    }
}

const LOG_LINES: [&str; 8] = [
    "SYS.INIT // OPTICAL ARRAY CALIBRATED",
    "MESH.SYNC // 478 NODES STREAMING",
    "HAND.LINK // 21 JOINT VECTORS",
    "HOLO.CORE // FIELD STABLE",
    "NET.SCAN // NO UPLINK REQUIRED",
    "BIO.READ // SIGNAL NOMINAL",
    "GRID.ALIGN // PARALLAX CORRECTED",
    "CACHE.FLUSH // BUFFERS CLEAR",
];

/// Decorative log lines that rotate on a wall-clock interval.
pub struct LogTicker {
    lines: Vec<String>,
    offset: usize,
    interval: Duration,
    last_advance: Option<Instant>,
}

impl LogTicker {
    pub fn new(interval: Duration) -> Self {
        Self::with_lines(LOG_LINES.iter().map(|l| l.to_string()).collect(), interval)
    }

    pub fn with_lines(lines: Vec<String>, interval: Duration) -> Self {
        Self {
            lines,
            offset: 0,
            interval,
            last_advance: None,
        }
    }

    /// Rotates the lines once `interval` has elapsed. Returns whether it did.
    pub fn advance(&mut self, now: Instant) -> bool {
        let last = *self.last_advance.get_or_insert(now);
        if self.lines.is_empty() || now.duration_since(last) < self.interval {
            return false;
        }
        self.offset = (self.offset + 1) % self.lines.len();
        self.last_advance = Some(now);
        true
    }

    /// The `count` lines currently on display, oldest first.
    pub fn visible(&self, count: usize) -> impl Iterator<Item = &str> {
        let len = self.lines.len();
        (0..count.min(len)).map(move |i| self.lines[(self.offset + i) % len].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn face_at(x: f32, y: f32, detected: bool) -> FaceState {
        FaceState {
            detected,
            position: Point3::new(x, y, 0.0),
            tilt: 0.0,
        }
    }

    #[test]
    fn projects_with_flip_and_offset() {
        let mut hud = HudProjector::new(&HudConfig::default());
        let placement = hud.project(&face_at(0.2, 0.3, true), Vector2::new(1000.0, 800.0));
        let position = placement.position.unwrap();
        assert_relative_eq!(position.x, 980.0, epsilon = 1e-3);
        assert_relative_eq!(position.y, 190.0, epsilon = 1e-3);
        assert_eq!(placement.opacity, 1.0);
        assert_eq!(placement.status, LinkStatus::Online);
    }

    #[test]
    fn lost_face_dims_and_keeps_position() {
        let mut hud = HudProjector::new(&HudConfig::default());
        let viewport = Vector2::new(1000.0, 800.0);
        let seen = hud.project(&face_at(0.5, 0.5, true), viewport);
        let lost = hud.project(&face_at(0.9, 0.9, false), viewport);
        assert_eq!(lost.position, seen.position);
        assert_eq!(lost.opacity, 0.3);
        assert_eq!(lost.status, LinkStatus::Searching);
    }

    #[test]
    fn no_position_before_first_detection() {
        let mut hud = HudProjector::new(&HudConfig::default());
        let placement = hud.project(&FaceState::default(), Vector2::new(640.0, 480.0));
        assert_eq!(placement.position, None);
        assert_eq!(placement.status, LinkStatus::Searching);
    }

    #[test]
    fn ticker_rotates_on_interval() {
        let lines = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut ticker = LogTicker::with_lines(lines, Duration::from_secs(2));
        let start = Instant::now();

        assert!(!ticker.advance(start));
        assert!(!ticker.advance(start + Duration::from_millis(1999)));
        assert_eq!(ticker.visible(2).collect::<Vec<_>>(), ["a", "b"]);

        assert!(ticker.advance(start + Duration::from_secs(2)));
        assert_eq!(ticker.visible(5).collect::<Vec<_>>(), ["b", "c", "a"]);
    }

    #[test]
    fn empty_ticker_does_not_panic() {
        let mut ticker = LogTicker::with_lines(Vec::new(), Duration::ZERO);
        assert!(!ticker.advance(Instant::now()));
        assert_eq!(ticker.visible(3).count(), 0);
    }
}
