//! Small numeric helpers shared by the aggregation and verdict layers.

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (N-1 divisor).
///
/// A single sample yields `0.0` rather than `None`: "one data point" is
/// distinct from "no data". Empty input yields `None`.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(0.0);
    }
    let avg = values.iter().sum::<f64>() / n as f64;
    let variance = values
        .iter()
        .map(|v| {
            let d = v - avg;
            d * d
        })
        .sum::<f64>()
        / (n as f64 - 1.0);
    Some(variance.sqrt())
}

/// Round to `decimals` decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn mean_of_values() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
    }

    #[test]
    fn std_dev_of_empty_is_none() {
        assert_eq!(sample_std_dev(&[]), None);
    }

    #[test]
    fn std_dev_of_single_sample_is_zero() {
        assert_eq!(sample_std_dev(&[42.5]), Some(0.0));
    }

    #[test]
    fn std_dev_uses_unbiased_estimator() {
        // Variance of [2, 4, 4, 4, 5, 5, 7, 9] with N-1 divisor is 32/7.
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = sample_std_dev(&values).expect("std dev for eight samples");
        assert!((std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn round_to_four_decimals() {
        assert_eq!(round_to(1.234_567_89, 4), 1.2346);
    }

    #[test]
    fn round_to_two_decimals() {
        assert_eq!(round_to(85.456, 2), 85.46);
        assert_eq!(round_to(0.004, 2), 0.0);
    }
}
