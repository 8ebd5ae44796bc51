// src/calibration/interpolate.rs - Piecewise-linear interpolation with linear extrapolation

/// Piecewise-linear interpolant over sorted sample points.
///
/// Queries outside the sampled range extend the first or last segment of
/// nonzero width linearly instead of failing or holding the end value.
/// Inside the range, a repeated `x` takes the later sample's value.
#[derive(Debug, Clone)]
pub struct LinearInterpolator<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
}

impl<'a> LinearInterpolator<'a> {
    /// `xs` must be non-decreasing. Returns `None` for mismatched lengths or
    /// fewer than two points.
    pub fn new(xs: &'a [f64], ys: &'a [f64]) -> Option<Self> {
        if xs.len() != ys.len() || xs.len() < 2 {
            return None;
        }
        Some(Self { xs, ys })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        let (first, last) = (self.xs[0], self.xs[n - 1]);
        // Right end of the segment used for x, pinned so that [hi - 1, hi]
        // is always a valid segment. Outside the range, repeated end points
        // are skipped so the edge segment has a real slope.
        let hi = if x < first {
            self.xs.partition_point(|&v| v <= first)
        } else if x > last {
            self.xs.partition_point(|&v| v < last)
        } else {
            self.xs.partition_point(|&v| v <= x)
        }
        .clamp(1, n - 1);
        let lo = hi - 1;
        let (x0, x1) = (self.xs[lo], self.xs[hi]);
        let (y0, y1) = (self.ys[lo], self.ys[hi]);
        let dx = x1 - x0;
        if dx == 0.0 {
            // Repeated timestamp, or every x equal
            return y1;
        }
        y0 + (x - x0) * (y1 - y0) / dx
    }

    /// Evaluate at every query point.
    pub fn resample(&self, queries: &[f64]) -> Vec<f64> {
        queries.iter().map(|&x| self.eval(x)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_inside_range() {
        let xs = [0.0, 1.0, 3.0];
        let ys = [0.0, 10.0, 30.0];
        let interp = LinearInterpolator::new(&xs, &ys).unwrap();
        assert_eq!(interp.eval(0.5), 5.0);
        assert_eq!(interp.eval(2.0), 20.0);
        assert_eq!(interp.eval(1.0), 10.0);
        assert_eq!(interp.eval(3.0), 30.0);
    }

    #[test]
    fn test_extrapolates_beyond_both_ends() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [5.0, 7.0, 3.0];
        let interp = LinearInterpolator::new(&xs, &ys).unwrap();
        // Slope of the first segment is +2, of the last -4
        assert_eq!(interp.eval(-1.0), 3.0);
        assert_eq!(interp.eval(3.0), -1.0);
    }

    #[test]
    fn test_repeated_timestamps_do_not_divide_by_zero() {
        let xs = [0.0, 1.0, 1.0, 2.0];
        let ys = [0.0, 1.0, 5.0, 6.0];
        let interp = LinearInterpolator::new(&xs, &ys).unwrap();
        assert!(interp.eval(1.0).is_finite());
        assert_eq!(interp.eval(1.5), 5.5);

        let flat = [0.0, 0.0];
        let interp = LinearInterpolator::new(&flat, &ys[..2]).unwrap();
        assert_eq!(interp.eval(10.0), 1.0);
    }

    #[test]
    fn test_extrapolation_skips_repeated_end_points() {
        let xs = [0.0, 1.0, 2.0, 2.0];
        let ys = [0.0, 1.0, 2.0, 5.0];
        let interp = LinearInterpolator::new(&xs, &ys).unwrap();
        assert_eq!(interp.eval(2.0), 5.0);
        assert_eq!(interp.eval(3.0), 3.0);

        let xs = [0.0, 0.0, 1.0];
        let ys = [3.0, 1.0, 2.0];
        let interp = LinearInterpolator::new(&xs, &ys).unwrap();
        assert_eq!(interp.eval(0.5), 1.5);
        assert_eq!(interp.eval(-1.0), 0.0);
    }

    #[test]
    fn test_rejects_too_few_points() {
        assert!(LinearInterpolator::new(&[1.0], &[1.0]).is_none());
        assert!(LinearInterpolator::new(&[1.0, 2.0], &[1.0]).is_none());
    }
}
