use num_traits::Float;

/// Find the index of the value in sorted `vec` nearest to `target_val`
pub fn nearest<T: Float>(vec: &[T], target_val: T) -> usize {
    nearest_by(vec, target_val, |x| *x)
}

/// Find the index of the item in `vec` whose key is nearest to `target_val`,
/// where `key` is non-decreasing over `vec`. When two items are equally close,
/// the earlier one wins.
pub fn nearest_by<T, K: Float, F: Fn(&T) -> K>(vec: &[T], target_val: K, key: F) -> usize {
    let n = vec.len();
    if n == 0 {
        return 0;
    }
    let near = binsearch_by(vec, target_val, &key);
    if near == 0 {
        0
    } else if near >= n {
        n - 1
    } else {
        let below = (key(&vec[near - 1]) - target_val).abs();
        let above = (key(&vec[near]) - target_val).abs();
        if below <= above {
            near - 1
        } else {
            near
        }
    }
}

/// The first index whose key is not less than `q`
pub fn binsearch_by<T, K: Float, F: Fn(&T) -> K>(array: &[T], q: K, key: F) -> usize {
    array.partition_point(|x| key(x) < q)
}

pub fn binsearch<T: Float>(array: &[T], q: T) -> usize {
    binsearch_by(array, q, |x| *x)
}
