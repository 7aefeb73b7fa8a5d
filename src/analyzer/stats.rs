// Small numeric helpers shared by the analyzers.

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median, `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Population variance, 0 for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64
}

/// Percent change from `from` to `to`; the base is floored at 1.
pub fn percent_change(from: f64, to: f64) -> f64 {
    (to - from) / from.max(1.0) * 100.0
}

/// Clamps a score into [0, 100].
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Weighted mean of `(value, weight)` pairs, normalising the weights to sum to 1.
pub fn weighted_mean(pairs: &[(f64, f64)]) -> Option<f64> {
    let total_weight: f64 = pairs.iter().map(|(_, w)| w).sum();
    if pairs.is_empty() || total_weight <= 0.0 {
        return None;
    }
    Some(pairs.iter().map(|(v, w)| v * w / total_weight).sum())
}
