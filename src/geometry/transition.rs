use crate::math::{equidistant_points_along_curve, ParametricCurve2d, Point2d, Vector2d};
use cgmath::prelude::*;

/// A smooth curve joining a leg to the ring, sampled at equidistant points.
///
/// Progress along the curve is a distance; it is mapped to a sample index
/// which is clamped to the last sample, so overrunning the end of the curve
/// is harmless.
#[derive(Clone, Debug)]
pub struct TransitionCurve {
    points: Vec<Point2d>,
    spacing: f64,
    length: f64,
}

impl TransitionCurve {
    /// Samples `curve` every `spacing` units.
    pub fn new(curve: &impl ParametricCurve2d, spacing: f64) -> Self {
        let (points, length) = equidistant_points_along_curve(curve, spacing);
        Self {
            points,
            spacing,
            length,
        }
    }

    /// The length of the curve.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The number of samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// The index of the sample at the given progress, clamped to the curve.
    pub fn index(&self, progress: f64) -> usize {
        let last = self.points.len().saturating_sub(1);
        if progress >= self.length {
            return last;
        }
        let idx = (progress.max(0.0) / self.spacing) as usize;
        usize::min(idx, last)
    }

    /// Samples the curve at the given progress, returning the position
    /// and a unit tangent along the direction of travel.
    pub fn sample(&self, progress: f64) -> (Point2d, Vector2d) {
        let idx = self.index(progress);
        let pos = self.points[idx];
        let (a, b) = if idx + 1 < self.points.len() {
            (pos, self.points[idx + 1])
        } else if idx > 0 {
            (self.points[idx - 1], pos)
        } else {
            return (pos, Vector2d::zero());
        };
        let tan = b - a;
        if tan.magnitude2() > 0.0 {
            (pos, tan.normalize())
        } else {
            (pos, Vector2d::zero())
        }
    }
}
