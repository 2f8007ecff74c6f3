//! Temporal alignment of two independently-clocked series.
//!
//! The monitor stream samples the rotation stage sparsely and irregularly;
//! image frames carry their own dense timestamp grid. [`resample_linear`]
//! interpolates the monitor series onto the image grid. Outside the observed
//! monitor range the result clamps to the boundary value; nothing is ever
//! extrapolated.
//!
//! Both timestamp sequences must be sorted non-decreasing. That is a
//! producer-side contract, but it is enforced here rather than assumed.

use dataex_core::{ExportError, Result};

fn is_sorted(xs: &[f64]) -> bool {
    xs.windows(2).all(|w| w[0] <= w[1])
}

/// Piecewise-linear resampling of `(ref_ts, ref_vals)` onto `target_ts`.
pub fn resample_linear(target_ts: &[f64], ref_ts: &[f64], ref_vals: &[f64]) -> Result<Vec<f64>> {
    if ref_ts.is_empty() {
        return Err(ExportError::sequencing(
            "temporal alignment requested with no reference samples",
        ));
    }
    if ref_ts.len() != ref_vals.len() {
        return Err(ExportError::sequencing(format!(
            "reference series length mismatch: {} timestamps vs {} values",
            ref_ts.len(),
            ref_vals.len(),
        )));
    }
    if !is_sorted(ref_ts) {
        return Err(ExportError::sequencing(
            "reference timestamps are not sorted non-decreasing",
        ));
    }
    if !is_sorted(target_ts) {
        return Err(ExportError::sequencing(
            "target timestamps are not sorted non-decreasing",
        ));
    }

    let first = ref_ts[0];
    let last = ref_ts[ref_ts.len() - 1];
    let mut out = Vec::with_capacity(target_ts.len());
    for &t in target_ts {
        if t <= first {
            out.push(ref_vals[0]);
            continue;
        }
        if t >= last {
            out.push(ref_vals[ref_vals.len() - 1]);
            continue;
        }
        // partition_point: first index with ref_ts[i] >= t; t is strictly
        // inside the range here, so 1 <= idx < len.
        let idx = ref_ts.partition_point(|&x| x < t);
        let (t0, t1) = (ref_ts[idx - 1], ref_ts[idx]);
        let (v0, v1) = (ref_vals[idx - 1], ref_vals[idx]);
        if t1 == t0 {
            out.push(v1);
        } else {
            out.push(v0 + (v1 - v0) * (t - t0) / (t1 - t0));
        }
    }
    Ok(out)
}
