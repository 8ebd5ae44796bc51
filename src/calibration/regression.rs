// src/calibration/regression.rs - Ordinary least squares for one input variable
use serde::Serialize;

/// `y = slope * x + intercept`, with the coefficient of determination of the fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AffineModel {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl AffineModel {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fit `ys ≈ slope * xs + intercept` by ordinary least squares.
///
/// Returns `None` for empty or mismatched inputs. When every `x` is the same
/// the slope is undefined; the fit then reports slope 0 and the mean of `ys`
/// as intercept, which the solver flags as degenerate.
///
/// R² follows the usual convention for a constant target: 1.0 when the
/// residuals are all zero, 0.0 otherwise.
pub fn fit_least_squares(xs: &[f64], ys: &[f64]) -> Option<AffineModel> {
    if xs.is_empty() || xs.len() != ys.len() {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut sxx, mut sxy) = (0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = mean_y - slope * mean_x;

    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys) {
        let residual = y - (slope * x + intercept);
        ss_res += residual * residual;
        ss_tot += (y - mean_y) * (y - mean_y);
    }
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    Some(AffineModel {
        slope,
        intercept,
        r_squared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let xs = [-10.0, 0.0, 10.0, 20.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x - 5.0).collect();
        let model = fit_least_squares(&xs, &ys).unwrap();
        assert!((model.slope - 2.0).abs() < 1e-12);
        assert!((model.intercept + 5.0).abs() < 1e-12);
        assert!((model.r_squared - 1.0).abs() < 1e-12);
        assert!((model.predict(3.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_identity_is_exact() {
        let xs = [-161.8, -20.3, 0.0, 45.7, 152.49];
        let model = fit_least_squares(&xs, &xs).unwrap();
        assert_eq!(model.slope, 1.0);
        assert_eq!(model.intercept, 0.0);
        assert_eq!(model.r_squared, 1.0);
    }

    #[test]
    fn test_noisy_fit_has_lower_r_squared() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [0.0, 3.0, 1.0, 4.0, 2.0, 5.0];
        let model = fit_least_squares(&xs, &ys).unwrap();
        assert!(model.slope > 0.0);
        assert!(model.r_squared > 0.0 && model.r_squared < 1.0);
    }

    #[test]
    fn test_constant_input_reports_zero_slope() {
        let model = fit_least_squares(&[3.0, 3.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(model.slope, 0.0);
        assert_eq!(model.intercept, 2.0);
        assert_eq!(model.r_squared, 0.0);
    }

    #[test]
    fn test_constant_target() {
        let model = fit_least_squares(&[1.0, 2.0, 3.0], &[7.0, 7.0, 7.0]).unwrap();
        assert_eq!(model.slope, 0.0);
        assert_eq!(model.intercept, 7.0);
        assert_eq!(model.r_squared, 1.0);
    }

    #[test]
    fn test_empty_or_mismatched() {
        assert!(fit_least_squares(&[], &[]).is_none());
        assert!(fit_least_squares(&[1.0, 2.0], &[1.0]).is_none());
    }
}
