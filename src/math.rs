use std::f64::consts::{PI, TAU};

use itertools::izip;

#[inline]
pub(crate) fn logaddexp(a: f64, b: f64) -> f64 {
    if a == b {
        return a + 2f64.ln();
    }
    let diff = a - b;
    if diff > 0. {
        a + (-diff).exp().ln_1p()
    } else if diff < 0. {
        b + diff.exp().ln_1p()
    } else {
        // diff is NAN
        diff
    }
}

/// `out = y + a * (x - y)`, elementwise.
pub(crate) fn lerp_out(x: &[f64], y: &[f64], a: f64, out: &mut [f64]) {
    let n = x.len();
    assert!(y.len() == n);
    assert!(out.len() == n);

    izip!(x, y, out).for_each(|(x, y, out)| {
        *out = y + a * (x - y);
    });
}

/// Map an angle in radians to `[0, 2π)`.
#[inline]
pub(crate) fn principal_angle(a: f64) -> f64 {
    let out = a.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if out >= TAU {
        0.
    } else {
        out
    }
}

/// Map an angle difference in degrees to `[-180, 180)`.
#[inline]
pub(crate) fn wrap_degrees(diff: f64) -> f64 {
    (diff + 180.).rem_euclid(360.) - 180.
}

/// Map a value onto the unit interval `[0, 1)`.
#[inline]
pub(crate) fn unit_fraction(x: f64) -> f64 {
    let out = x.rem_euclid(1.);
    if out >= 1. {
        0.
    } else {
        out
    }
}

/// Linear-interpolated percentile of already sorted values, `q` in `[0, 100]`.
pub(crate) fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = (q / 100.).clamp(0., 1.) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[inline]
pub(crate) fn radians(deg: f64) -> f64 {
    deg * PI / 180.
}

#[inline]
pub(crate) fn degrees(rad: f64) -> f64 {
    rad * 180. / PI
}
