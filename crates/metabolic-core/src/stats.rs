//! Descriptive statistics with pandas-style missing-value semantics.
//!
//! `NaN` inputs are skipped. Statistics that are undefined for the
//! remaining sample size come back as `NaN` rather than an error.

// ── Descriptive statistics ────────────────────────────────────────────────────

fn present(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

/// Arithmetic mean. `NaN` for an empty sample.
pub fn mean(values: &[f64]) -> f64 {
    let (sum, n) = present(values).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Sample standard deviation (N − 1 denominator).
///
/// `NaN` for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = present(values).count();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = present(values).map(|v| (v - m).powi(2)).sum();
    (ss / (n as f64 - 1.0)).sqrt()
}

/// Smallest value. `NaN` for an empty sample.
pub fn min(values: &[f64]) -> f64 {
    present(values).reduce(f64::min).unwrap_or(f64::NAN)
}

/// Largest value. `NaN` for an empty sample.
pub fn max(values: &[f64]) -> f64 {
    present(values).reduce(f64::max).unwrap_or(f64::NAN)
}

// ── Correlation ───────────────────────────────────────────────────────────────

/// Pearson correlation over pairwise-complete observations.
///
/// Pairs where either side is `NaN` are skipped. Returns `NaN` when fewer
/// than two pairs remain or either side has zero variance. The result is
/// clamped to `[-1, 1]` to absorb rounding error.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| (*a, *b))
        .collect();

    let n = pairs.len();
    if n < 2 {
        return f64::NAN;
    }

    let mean_x = pairs.iter().map(|(a, _)| a).sum::<f64>() / n as f64;
    let mean_y = pairs.iter().map(|(_, b)| b).sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}

/// `true` when `values` has at least two present values that are not all equal.
pub fn has_variance(values: &[f64]) -> bool {
    let mut iter = present(values);
    match iter.next() {
        Some(first) => iter.any(|v| v != first),
        None => false,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
