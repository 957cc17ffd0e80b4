//! Integer rounding that preserves totals.

/// Round each quantity to an integer so the results sum to the rounded sum
/// of the inputs
///
/// Every entry is first rounded to nearest. If that misses the target total,
/// the entries with the largest positive residuals are incremented (or,
/// when overshooting, the most negative residuals decremented) until the
/// totals match. Ties go to the lower index.
///
/// # Example
/// ```
/// use econ_simulator_core_rs::economics::round_preserving_sum;
///
/// // 0.4 * 3 rounds to 0 each, but the total 1.2 rounds to 1
/// assert_eq!(round_preserving_sum(&[0.4, 0.4, 0.4]), vec![1, 0, 0]);
///
/// // buyers and sellers still net out
/// let quantities = round_preserving_sum(&[2.6, -1.3, -1.3]);
/// assert_eq!(quantities.iter().sum::<i64>(), 0);
/// ```
pub fn round_preserving_sum(quantities: &[f64]) -> Vec<i64> {
    let mut rounded: Vec<i64> = quantities.iter().map(|q| q.round() as i64).collect();
    let target = quantities.iter().sum::<f64>().round() as i64;
    let gap = target - rounded.iter().sum::<i64>();
    if gap == 0 {
        return rounded;
    }

    let residual = |i: usize| quantities[i] - quantities[i].round();
    let mut order: Vec<usize> = (0..quantities.len()).collect();
    if gap > 0 {
        order.sort_by(|&a, &b| residual(b).total_cmp(&residual(a)).then(a.cmp(&b)));
    } else {
        order.sort_by(|&a, &b| residual(a).total_cmp(&residual(b)).then(a.cmp(&b)));
    }

    let step = gap.signum();
    for &i in order.iter().cycle().take(gap.unsigned_abs() as usize) {
        rounded[i] += step;
    }
    rounded
}
