//! Validation metrics reported after every epoch.

/// Fraction of predictions equal to their label. `0.0` for an empty set.
pub fn accuracy(predicted: &[u32], labels: &[u32]) -> f64 {
    let total = predicted.len().min(labels.len());
    if total == 0 {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(labels)
        .filter(|(p, l)| p == l)
        .count();
    correct as f64 / total as f64
}

/// Error summary for multi-output regression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Coefficient of determination averaged uniformly over outputs.
    pub r2: f64,
}

impl RegressionMetrics {
    /// `predictions` and `targets` are row-major `[samples][outputs]`.
    pub fn compute<const N: usize>(predictions: &[[f32; N]], targets: &[[f32; N]]) -> Self {
        let rows = predictions.len().min(targets.len());
        if rows == 0 || N == 0 {
            return Self {
                mae: 0.0,
                rmse: 0.0,
                r2: 0.0,
            };
        }

        let mut abs_sum = 0.0;
        let mut sq_sum = 0.0;
        for (p, t) in predictions.iter().zip(targets) {
            for k in 0..N {
                let diff = p[k] as f64 - t[k] as f64;
                abs_sum += diff.abs();
                sq_sum += diff * diff;
            }
        }
        let count = (rows * N) as f64;

        let r2 = (0..N)
            .map(|k| {
                let column: Vec<f64> = targets[..rows].iter().map(|t| t[k] as f64).collect();
                let mean = column.iter().sum::<f64>() / rows as f64;
                let ss_tot: f64 = column.iter().map(|v| (v - mean).powi(2)).sum();
                let ss_res: f64 = predictions[..rows]
                    .iter()
                    .zip(&column)
                    .map(|(p, t)| (p[k] as f64 - t).powi(2))
                    .sum();
                output_r2(ss_res, ss_tot)
            })
            .sum::<f64>()
            / N as f64;

        Self {
            mae: abs_sum / count,
            rmse: (sq_sum / count).sqrt(),
            r2,
        }
    }
}

// A constant target column scores 1.0 when predicted exactly, 0.0 otherwise.
fn output_r2(ss_res: f64, ss_tot: f64) -> f64 {
    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn accuracy_counts_matches() {
        assert_abs_diff_eq!(accuracy(&[0, 1, 2, 2], &[0, 1, 1, 2]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn perfect_predictions_score_one() {
        let targets = [[0.0_f32, 0.25], [0.5, 0.75], [1.0, 0.5]];
        let metrics = RegressionMetrics::compute(&targets, &targets);
        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.rmse, 0.0);
        assert_abs_diff_eq!(metrics.r2, 1.0);
    }

    #[test]
    fn constant_offset_is_reflected_in_errors() {
        let targets = [[0.0_f32, 0.0], [1.0, 1.0]];
        let predictions = [[0.5_f32, 0.5], [0.5, 0.5]];
        let metrics = RegressionMetrics::compute(&predictions, &targets);
        assert_abs_diff_eq!(metrics.mae, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(metrics.rmse, 0.5, epsilon = 1e-9);
        // Predicting the column mean gives zero explained variance.
        assert_abs_diff_eq!(metrics.r2, 0.0, epsilon = 1e-9);
    }
}
