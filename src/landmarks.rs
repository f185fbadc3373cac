use nalgebra::Point3;

/// Landmark indices of the face mesh model that are read by the tracker.
pub mod face {
    pub const NOSE_TIP: usize = 1;
    pub const COUNT: usize = 478;
}

/// Landmark indices of the 21 point hand model.
pub mod hand {
    pub const WRIST: usize = 0;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_TIP: usize = 8;
    pub const COUNT: usize = 21;
}

// one detected face or hand, points normalized to the full frame
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    pub points: Vec<Point3<f32>>,
}

impl Landmarks {
    pub fn new(points: Vec<Point3<f32>>) -> Landmarks {
        Landmarks { points }
    }

    // construct from flattened (x, y, z) triples
    pub fn from_vec(points: &[f32]) -> Landmarks {
        let points = points
            .chunks_exact(3)
            .map(|p| Point3::new(p[0], p[1], p[2]))
            .collect();
        Landmarks { points }
    }

    pub fn get_point(&self, index: usize) -> Option<Point3<f32>> {
        self.points.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Distance between two landmarks in the image plane. Depth is ignored.
    pub fn planar_distance(&self, a: usize, b: usize) -> Option<f32> {
        let a = self.get_point(a)?;
        let b = self.get_point(b)?;
        Some((a.xy() - b.xy()).norm())
    }

    /// Axis aligned (min, max) corners of the landmarks in the image plane.
    pub fn bounds(&self) -> Option<((f32, f32), (f32, f32))> {
        let first = self.points.first()?;
        let mut min = (first.x, first.y);
        let mut max = min;
        for p in self.points.iter() {
            min.0 = min.0.min(p.x);
            min.1 = min.1.min(p.y);
            max.0 = max.0.max(p.x);
            max.1 = max.1.max(p.y);
        }
        Some((min, max))
    }
}
