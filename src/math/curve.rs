use super::{Point2d, Vector2d};
use crate::util::Interval;
use cgmath::prelude::*;

/// The bisection limit when searching for the next equidistant point.
const MAX_REFINE_ITERS: usize = 64;

/// A parametric curve in 2D space.
pub trait ParametricCurve2d {
    /// Samples the parametric curve.
    fn sample(&self, t: f64) -> Point2d;

    /// Returns the minimum and maximum t-values that define the bounds of the curve.
    fn bounds(&self) -> Interval<f64>;

    /// Samples the derivative of the parametric curve.
    ///
    /// The default implementation approximates the derivative by sampling
    /// two very nearby points along the curve.
    fn sample_dt(&self, t: f64) -> Vector2d {
        let delta = self.bounds().length() * 0.0001;
        let p1 = self.sample(t);
        let p2 = self.sample(t + delta);
        (p2 - p1) / delta
    }
}

impl<T: ParametricCurve2d + ?Sized> ParametricCurve2d for &T {
    fn sample(&self, t: f64) -> Point2d {
        (**self).sample(t)
    }

    fn bounds(&self) -> Interval<f64> {
        (**self).bounds()
    }

    fn sample_dt(&self, t: f64) -> Vector2d {
        (**self).sample_dt(t)
    }
}

/// Samples points along a curve such that consecutive points are `dist` apart.
///
/// Returns the points and the approximate length of the curve. The final point
/// is exactly the end of the curve, and may be closer than `dist` to its predecessor.
pub fn equidistant_points_along_curve(
    curve: &impl ParametricCurve2d,
    dist: f64,
) -> (Vec<Point2d>, f64) {
    let end_ts = curve.bounds();
    let end_ps = [curve.sample(end_ts.min), curve.sample(end_ts.max)];

    let mut ts = end_ts;
    let mut dists = Interval::new(0.0, (end_ps[1] - end_ps[0]).magnitude());

    let mut points = vec![end_ps[0]];
    let mut last_p = end_ps[0];

    while dists.max > dist {
        let mut found = None;
        for _ in 0..MAX_REFINE_ITERS {
            let new_t = ts.lerp(dists.inv_lerp(dist));
            let new_p = curve.sample(new_t);
            let new_dist = (new_p - last_p).magnitude();
            let f = new_dist / dist;

            if f < 0.99 {
                ts.min = new_t;
                dists.min = new_dist;
            } else if f > 1.01 {
                ts.max = new_t;
                dists.max = new_dist;
            } else {
                found = Some((new_t, new_p));
                break;
            }
        }

        // A curve which doubles back on itself may defeat the search; accept the
        // best estimate so sampling always terminates.
        let (new_t, new_p) = found.unwrap_or_else(|| {
            let t = ts.lerp(0.5);
            (t, curve.sample(t))
        });
        points.push(new_p);
        last_p = new_p;

        ts = Interval::new(new_t, end_ts.max);
        dists = Interval::new(0.0, (end_ps[1] - new_p).magnitude());
    }

    let mut length = (points.len() - 1) as f64 * dist;
    let end_vec = end_ps[1] - last_p;
    length += end_vec.magnitude();
    if end_vec.magnitude() > 0.001 * dist {
        points.push(end_ps[1]);
    } else if let Some(last) = points.last_mut() {
        *last = end_ps[1];
    }

    (points, length)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::QuadraticBezier2d;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn straight_line_spacing() {
        let line = QuadraticBezier2d::new(&[
            Point2d::new(0.0, 0.0),
            Point2d::new(5.0, 0.0),
            Point2d::new(10.0, 0.0),
        ]);
        let (points, length) = equidistant_points_along_curve(&line, 1.0);
        assert_approx_eq!(length, 10.0, 0.15);
        assert_eq!(points.first().copied(), Some(Point2d::new(0.0, 0.0)));
        assert_eq!(points.last().copied(), Some(Point2d::new(10.0, 0.0)));
        for pair in points.windows(2) {
            assert!((pair[1] - pair[0]).magnitude() <= 1.02);
        }
    }
}
