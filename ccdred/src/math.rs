//! Robust statistics used by frame combination.

/// MAD to standard deviation conversion factor for normally distributed data.
pub const MAD_TO_SIGMA: f32 = 1.4826022;

#[inline]
pub fn mad_to_sigma(mad: f32) -> f32 {
    mad * MAD_TO_SIGMA
}

/// Median of `data`, reordering it in place.
///
/// Even lengths average the two middle values.
#[inline]
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;
    let (left, right_median, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
    let right = *right_median;

    if len % 2 == 1 {
        right
    } else {
        let left_max = left.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        (left_max + right) * 0.5
    }
}

/// Median absolute deviation of `values` about `center`, using `scratch` as workspace.
pub fn mad_f32_with_scratch(values: &[f32], center: f32, scratch: &mut Vec<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    scratch.clear();
    scratch.extend(values.iter().map(|&v| (v - center).abs()));
    median_f32_mut(scratch)
}

/// Root mean square deviation about `center` (not about the mean).
pub fn std_about(values: &[f32], center: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = values
        .iter()
        .map(|&v| {
            let d = f64::from(v - center);
            d * d
        })
        .sum();
    (sum_sq / values.len() as f64).sqrt() as f32
}

/// Arithmetic mean accumulated in f64.
pub fn mean_f32(values: &[f32]) -> f32 {
    debug_assert!(!values.is_empty());
    let sum: f64 = values.iter().map(|&v| f64::from(v)).sum();
    (sum / values.len() as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median_f32_mut(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_f32_mut(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median_f32_mut(&mut [7.0]), 7.0);
    }

    #[test]
    fn test_mad() {
        // |x - 3| = [2, 1, 0, 1, 97] -> median 1
        let values = [1.0, 2.0, 3.0, 4.0, 100.0];
        let mut scratch = Vec::new();
        assert_eq!(mad_f32_with_scratch(&values, 3.0, &mut scratch), 1.0);
        assert!((mad_to_sigma(1.0) - 1.4826).abs() < 1e-4);
    }

    #[test]
    fn test_std_about_center() {
        let values = [1.0, 3.0];
        assert!((std_about(&values, 2.0) - 1.0).abs() < 1e-6);
        assert!((std_about(&values, 0.0) - 5.0_f32.sqrt()).abs() < 1e-6);
        assert_eq!(std_about(&[], 0.0), 0.0);
    }

    #[test]
    fn test_mean() {
        assert!((mean_f32(&[1.0, 2.0, 3.0, 10.0]) - 4.0).abs() < 1e-6);
    }
}
