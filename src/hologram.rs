//! Hand driven hologram: spin rate from the horizontal hand position, scale
//! from the pinch distance.

use nalgebra::{Point2, Point3, Rotation3};

use crate::config::HologramConfig;
use crate::tracking::HandState;

/// Camera distance used for the perspective projection. Geometry must stay in front of it.
pub const VIEW_DISTANCE: f32 = 4.0;
const OUTER_RADIUS: f32 = 1.0;
// target scale of a pinch at the ceiling, relative to the base scale
const MAX_PINCH_GAIN: f32 = 2.0;

/// Spin per frame. The hand at the horizontal center gives the base rate.
pub fn rotation_rate(hand: &HandState, config: &HologramConfig) -> f32 {
    if hand.detected {
        config.base_rotation + (hand.position.x - 0.5) * config.sensitivity
    } else {
        config.base_rotation
    }
}

/// Maps a pinch distance onto [0, 1], saturating at `ceiling`.
pub fn normalized_pinch(distance: f32, ceiling: f32) -> f32 {
    (distance / ceiling).clamp(0.0, 1.0)
}

/// Scale the hologram eases toward: base scale unless pinching, otherwise
/// between 0.5x (tips touching) and 2x (pinch at the ceiling).
pub fn target_scale(hand: &HandState, config: &HologramConfig) -> f32 {
    if hand.detected && hand.is_pinching {
        let normalized = normalized_pinch(hand.pinch_distance, config.pinch_ceiling);
        config.base_scale * (0.5 + normalized * (MAX_PINCH_GAIN - 0.5))
    } else {
        config.base_scale
    }
}

/// Largest radius the outer shell can reach, in view units.
pub fn max_extent(config: &HologramConfig) -> f32 {
    OUTER_RADIUS * config.base_scale * MAX_PINCH_GAIN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    OuterShell,
    MidShell,
    InnerCore,
}

impl Part {
    pub const ALL: [Part; 3] = [Part::OuterShell, Part::MidShell, Part::InnerCore];

    fn index(self) -> usize {
        match self {
            Part::OuterShell => 0,
            Part::MidShell => 1,
            Part::InnerCore => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Wireframe {
    pub vertices: Vec<Point3<f32>>,
    pub edges: Vec<(usize, usize)>,
}

impl Wireframe {
    // connects every pair of vertices at the shortest occurring distance
    fn connect_nearest(vertices: Vec<Point3<f32>>) -> Wireframe {
        let mut shortest = f32::MAX;
        for (i, a) in vertices.iter().enumerate() {
            for b in vertices.iter().skip(i + 1) {
                shortest = shortest.min((a - b).norm());
            }
        }

        let mut edges = Vec::new();
        for (i, a) in vertices.iter().enumerate() {
            for (j, b) in vertices.iter().enumerate().skip(i + 1) {
                if (a - b).norm() < shortest * 1.01 {
                    edges.push((i, j));
                }
            }
        }

        // unit radius
        let radius = vertices.iter().map(|v| v.coords.norm()).fold(0.0, f32::max);
        let vertices = if radius > 0.0 {
            vertices.into_iter().map(|v| v / radius).collect()
        } else {
            vertices
        };

        Wireframe { vertices, edges }
    }

    pub fn icosahedron() -> Wireframe {
        let phi = (1.0 + 5f32.sqrt()) / 2.0;
        let mut vertices = Vec::with_capacity(12);
        for &a in &[-1.0, 1.0] {
            for &b in &[-phi, phi] {
                vertices.push(Point3::new(0.0, a, b));
                vertices.push(Point3::new(a, b, 0.0));
                vertices.push(Point3::new(b, 0.0, a));
            }
        }
        Self::connect_nearest(vertices)
    }

    pub fn octahedron() -> Wireframe {
        let vertices = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, -1.0),
        ];
        Self::connect_nearest(vertices)
    }

    pub fn tetrahedron() -> Wireframe {
        let vertices = vec![
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ];
        Self::connect_nearest(vertices)
    }
}

struct Shell {
    part: Part,
    wireframe: Wireframe,
    radius: f32,
    tilt: f32,
}

pub struct Hologram {
    config: HologramConfig,
    angles: [f32; 3],
    scale: f32,
    shells: Vec<Shell>,
}

impl Hologram {
    pub fn new(config: &HologramConfig) -> Self {
        let shells = vec![
            Shell {
                part: Part::OuterShell,
                wireframe: Wireframe::icosahedron(),
                radius: OUTER_RADIUS,
                tilt: 0.35,
            },
            Shell {
                part: Part::MidShell,
                wireframe: Wireframe::octahedron(),
                radius: 0.68,
                tilt: -0.5,
            },
            Shell {
                part: Part::InnerCore,
                wireframe: Wireframe::tetrahedron(),
                radius: 0.32,
                tilt: 0.2,
            },
        ];

        Self {
            config: config.clone(),
            angles: [0.0; 3],
            scale: config.base_scale,
            shells,
        }
    }

    /// Rate multiplier of a part. The core spins against the shells.
    pub fn multiplier(&self, part: Part) -> f32 {
        match part {
            Part::OuterShell => 1.0,
            Part::MidShell => self.config.mid_multiplier,
            Part::InnerCore => self.config.inner_multiplier,
        }
    }

    pub fn angle(&self, part: Part) -> f32 {
        self.angles[part.index()]
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Advances one frame: integrates the spin and eases the scale toward its target.
    pub fn step(&mut self, hand: &HandState) {
        let rate = rotation_rate(hand, &self.config);
        for part in Part::ALL {
            self.angles[part.index()] += rate * self.multiplier(part);
        }

        let target = target_scale(hand, &self.config);
        self.scale += (target - self.scale) * self.config.smoothing;
    }

    /// Screen-space line segments of every part, centered at `center` with
    /// `size` pixels per unit of radius.
    pub fn project(&self, center: Point2<f32>, size: f32) -> Vec<(Part, [Point2<f32>; 2])> {
        let mut segments = Vec::new();

        for shell in self.shells.iter() {
            let rotation = Rotation3::from_euler_angles(shell.tilt, self.angle(shell.part), 0.0);
            let extent = shell.radius * self.scale;

            let projected: Vec<Point2<f32>> = shell
                .wireframe
                .vertices
                .iter()
                .map(|v| {
                    let p = rotation * (v.coords * extent);
                    let depth = (VIEW_DISTANCE / (VIEW_DISTANCE - p.z)).max(0.0);
                    Point2::new(center.x + p.x * depth * size, center.y - p.y * depth * size)
                })
                .collect();

            segments.extend(
                shell
                    .wireframe
                    .edges
                    .iter()
                    .map(|&(a, b)| (shell.part, [projected[a], projected[b]])),
            );
        }

        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hand(x: f32, pinching: bool, distance: f32) -> HandState {
        HandState {
            detected: true,
            is_pinching: pinching,
            pinch_distance: distance,
            position: Point3::new(x, 0.5, 0.0),
        }
    }

    #[test]
    fn centered_hand_spins_at_base_rate() {
        let config = HologramConfig::default();
        assert_eq!(rotation_rate(&hand(0.5, false, 0.2), &config), config.base_rotation);
        assert_eq!(rotation_rate(&HandState::default(), &config), config.base_rotation);
    }

    #[test]
    fn spin_is_linear_and_symmetric() {
        let config = HologramConfig::default();
        let right = rotation_rate(&hand(1.0, false, 0.2), &config);
        let left = rotation_rate(&hand(0.0, false, 0.2), &config);
        assert_relative_eq!(right, config.base_rotation + 0.5 * config.sensitivity);
        assert_relative_eq!(left, config.base_rotation - 0.5 * config.sensitivity);
    }

    #[test]
    fn pinch_at_ceiling_doubles_scale() {
        let config = HologramConfig::default();
        assert_eq!(normalized_pinch(0.1, config.pinch_ceiling), 1.0);
        assert_eq!(normalized_pinch(0.4, config.pinch_ceiling), 1.0);
        assert_relative_eq!(target_scale(&hand(0.5, true, 0.1), &config), config.base_scale * 2.0);
        assert_relative_eq!(target_scale(&hand(0.5, true, 0.3), &config), config.base_scale * 2.0);
    }

    #[test]
    fn tight_pinch_halves_scale() {
        let config = HologramConfig::default();
        assert_relative_eq!(target_scale(&hand(0.5, true, 0.0), &config), config.base_scale * 0.5);
        assert_eq!(target_scale(&hand(0.5, false, 0.0), &config), config.base_scale);
    }

    #[test]
    fn scale_eases_toward_target() {
        let config = HologramConfig::default();
        let mut hologram = Hologram::new(&config);
        let pinch = hand(0.5, true, 0.0);

        hologram.step(&pinch);
        assert_relative_eq!(hologram.scale(), 1.0 - 0.5 * 0.1, epsilon = 1e-6);

        for _ in 0..200 {
            hologram.step(&pinch);
        }
        assert_relative_eq!(hologram.scale(), 0.5, epsilon = 1e-4);
    }

    #[test]
    fn core_spins_against_shells() {
        let config = HologramConfig::default();
        let mut hologram = Hologram::new(&config);
        hologram.step(&hand(0.5, false, 0.2));

        let outer = hologram.angle(Part::OuterShell);
        assert_relative_eq!(outer, config.base_rotation);
        assert_relative_eq!(hologram.angle(Part::MidShell), outer * 1.5);
        assert!(hologram.angle(Part::InnerCore) < 0.0);
    }

    #[test]
    fn max_extent_matches_largest_pinch() {
        let config = HologramConfig::default();
        let mut hologram = Hologram::new(&config);
        for _ in 0..500 {
            hologram.step(&hand(0.5, true, 1.0));
        }
        assert_relative_eq!(hologram.scale() * OUTER_RADIUS, max_extent(&config), epsilon = 1e-4);
        assert!(max_extent(&config) < VIEW_DISTANCE);
    }

    #[test]
    fn wireframes_have_expected_edges() {
        assert_eq!(Wireframe::icosahedron().edges.len(), 30);
        assert_eq!(Wireframe::octahedron().edges.len(), 12);
        assert_eq!(Wireframe::tetrahedron().edges.len(), 6);
    }

    #[test]
    fn projection_stays_around_center() {
        let hologram = Hologram::new(&HologramConfig::default());
        let segments = hologram.project(Point2::new(400.0, 300.0), 100.0);
        assert_eq!(segments.len(), 48);
        for (_, [a, b]) in segments {
            for p in [a, b] {
                assert!((p.x - 400.0).abs() < 150.0);
                assert!((p.y - 300.0).abs() < 150.0);
            }
        }
    }
}
