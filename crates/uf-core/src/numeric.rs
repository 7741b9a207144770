/// Floating point type used throughout system
pub type Real = f64;

/// Sentinel marking a missing or invalid sample in process data.
pub const DEFAULT_BAD_VALUE: Real = -9999.0;

/// A sample is bad when it is NaN or equals the bad-value sentinel.
#[inline]
pub fn is_bad_sample(v: Real, bad_value: Real) -> bool {
    v.is_nan() || v == bad_value
}

/// Usable for arithmetic: not flagged and not infinite.
#[inline]
pub fn is_usable_sample(v: Real, bad_value: Real) -> bool {
    !is_bad_sample(v, bad_value) && v.is_finite()
}

/// Indices of bad samples in `values`.
pub fn bad_sample_indices(values: &[Real], bad_value: Real) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !is_usable_sample(**v, bad_value))
        .map(|(i, _)| i)
        .collect()
}

/// Adds the index following each entry, keeping the result sorted and unique.
///
/// Used when a bad sample also corrupts the next row of a difference equation.
pub fn append_trailing_indices(indices: &[usize], len: usize) -> Vec<usize> {
    let mut out: Vec<usize> = indices
        .iter()
        .flat_map(|&i| [i, i + 1])
        .filter(|&i| i < len)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}
