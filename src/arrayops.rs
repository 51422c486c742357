use std::cmp::Ordering;

use num_traits::{Float, ToPrimitive};

/// Linearly interpolated percentile of pre-sorted `values`, with `percent` in `[0, 1]`
pub fn percentile<T: Float + ToPrimitive>(values: &[T], percent: f64) -> T {
    if values.is_empty() {
        return T::zero();
    }
    let k = (values.len() - 1) as f64 * percent;
    let f = k.floor();
    let c = k.ceil();
    if f == c {
        return values[k as usize];
    }
    let d0 = values[f as usize] * T::from(c - k).unwrap_or_else(T::zero);
    let d1 = values[c as usize] * T::from(k - f).unwrap_or_else(T::zero);
    d0 + d1
}

/// The median of `values`, averaging the two middle values for an even count.
///
/// Sorts `values` in place. An empty slice has a median of zero.
pub fn median_mut<T: Float>(values: &mut [T]) -> T {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    percentile(values, 0.5)
}

/// The median of `values`, see [`median_mut`]
pub fn median<T: Float>(values: &[T]) -> T {
    let mut buffer = values.to_vec();
    median_mut(&mut buffer)
}

pub fn minmax<T: Float>(values: &[T]) -> (T, T) {
    let mut max = -T::infinity();
    let mut min = T::infinity();

    for v in values.iter() {
        if *v > max {
            max = *v;
        }
        if *v < min {
            min = *v
        }
    }
    (min, max)
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[3.0, 1.0, 2.0], 2.0)]
    #[case(&[4.0, 1.0, 3.0, 2.0], 2.5)]
    #[case(&[7.0], 7.0)]
    #[case(&[], 0.0)]
    fn test_median(#[case] values: &[f64], #[case] expected: f64) {
        assert_eq!(median(values), expected);
    }

    #[test]
    fn test_minmax() {
        assert_eq!(minmax(&[3.0, -1.0, 8.0, 2.0]), (-1.0, 8.0));
    }

    #[test]
    fn test_percentile() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.25), 2.0);
        assert_eq!(percentile(&values, 1.0), 5.0);
    }
}
