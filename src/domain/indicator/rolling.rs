//! Trailing-window statistics.
//!
//! Every function here uses a partial window at the start of the series
//! (minimum period 1), so the value at index i depends only on `values[..=i]`.

fn window(values: &[f64], i: usize, period: usize) -> &[f64] {
    let start = (i + 1).saturating_sub(period.max(1));
    &values[start..=i]
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Simple moving average.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| mean(window(values, i, period)))
        .collect()
}

/// Sample standard deviation (ddof = 1). `None` while fewer than two samples
/// are in the window.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let w = window(values, i, period);
            if w.len() < 2 {
                return None;
            }
            let m = mean(w);
            let var = w.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (w.len() - 1) as f64;
            Some(var.sqrt())
        })
        .collect()
}

pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| window(values, i, period).iter().copied().fold(f64::INFINITY, f64::min))
        .collect()
}

pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            window(values, i, period)
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .collect()
}

/// Mean absolute deviation from the window mean.
pub fn rolling_mean_abs_dev(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let w = window(values, i, period);
            let m = mean(w);
            w.iter().map(|v| (v - m).abs()).sum::<f64>() / w.len() as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_uses_partial_window() {
        let out = rolling_mean(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_relative_eq!(out[0], 2.0);
        assert_relative_eq!(out[1], 3.0);
        assert_relative_eq!(out[2], 4.0);
        assert_relative_eq!(out[3], 6.0);
    }

    #[test]
    fn std_is_sample_and_absent_for_one_value() {
        let out = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        assert!(out[0].is_none());
        // sum of squared deviations 32 over 7
        assert_relative_eq!(out[7].unwrap(), (32.0_f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn min_max_over_trailing_window() {
        let values = [5.0, 1.0, 4.0, 3.0, 2.0];
        assert_eq!(rolling_min(&values, 2), vec![5.0, 1.0, 1.0, 3.0, 2.0]);
        assert_eq!(rolling_max(&values, 2), vec![5.0, 5.0, 4.0, 4.0, 3.0]);
    }

    #[test]
    fn mean_abs_dev() {
        let out = rolling_mean_abs_dev(&[1.0, 2.0, 3.0, 4.0], 4);
        assert_relative_eq!(out[0], 0.0);
        // mean 2.5, deviations 1.5 0.5 0.5 1.5
        assert_relative_eq!(out[3], 1.0);
    }

    #[test]
    fn zero_period_behaves_like_one() {
        assert_eq!(rolling_mean(&[1.0, 3.0], 0), vec![1.0, 3.0]);
    }

    #[test]
    fn empty_input() {
        assert!(rolling_mean(&[], 5).is_empty());
        assert!(rolling_std(&[], 5).is_empty());
    }
}
