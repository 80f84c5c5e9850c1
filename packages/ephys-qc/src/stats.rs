use crate::error::{QcError, Result};

/// Root mean square (0 for an empty slice)
pub fn rms(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let sum_sq: f64 = data.iter().map(|&x| x.powi(2)).sum();
    (sum_sq / data.len() as f64).sqrt()
}

/// Sliding median with an odd window, zero-padded beyond both ends.
pub fn median_filter(data: &[f64], kernel: usize) -> Result<Vec<f64>> {
    if kernel == 0 || kernel % 2 == 0 {
        return Err(QcError::InvalidParameter(format!(
            "median filter kernel must be odd, got {}",
            kernel
        )));
    }

    let half = kernel / 2;
    let n = data.len();
    let mut window = Vec::with_capacity(kernel);

    Ok((0..n)
        .map(|i| {
            window.clear();
            for j in 0..kernel {
                let value = (i + j)
                    .checked_sub(half)
                    .and_then(|idx| data.get(idx))
                    .copied()
                    .unwrap_or(0.0);
                window.push(value);
            }
            window.sort_by(f64::total_cmp);
            window[half]
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[3.0, -3.0]), 3.0);
        assert!((rms(&[1.0, 2.0, 3.0, 4.0]) - 7.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_median_filter_interior() {
        let data = [1.0, 5.0, 2.0, 8.0, 3.0];
        let out = median_filter(&data, 3).unwrap();
        // edges see a zero pad
        assert_eq!(out, vec![1.0, 2.0, 5.0, 3.0, 3.0]);
    }

    #[test]
    fn test_median_filter_suppresses_outlier() {
        let mut data = vec![10.0; 20];
        data[9] = 500.0;
        let out = median_filter(&data, 11).unwrap();
        assert_eq!(out[9], 10.0);
        // five zeros + six values at the left edge
        assert_eq!(out[0], 10.0);
    }

    #[test]
    fn test_median_filter_shorter_than_kernel() {
        let out = median_filter(&[4.0, 6.0, 5.0], 11).unwrap();
        assert_eq!(out, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_median_filter_rejects_even_kernel() {
        assert!(median_filter(&[1.0, 2.0], 4).is_err());
        assert!(median_filter(&[1.0, 2.0], 0).is_err());
    }
}
