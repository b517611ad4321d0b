//! Two-body orbit propagation and sky projection.
//!
//! Everything here is a pure function of its inputs so that it can be called
//! from any number of sampling workers at once.

use std::f64::consts::{PI, TAU};

use crate::math::principal_angle;

pub const DAYS_PER_YEAR: f64 = 365.25;

/// Newton iterations are used below this eccentricity, Mikkola's method above.
const NEWTON_MAX_ECC: f64 = 0.95;
const NEWTON_TOLERANCE: f64 = 1e-9;
const NEWTON_MAX_ITER: usize = 50;

/// Campbell elements of one secondary body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitElements {
    /// Semi-major axis in AU.
    pub sma: f64,
    pub ecc: f64,
    /// Inclination in radians.
    pub inc: f64,
    /// Argument of periastron in radians.
    pub aop: f64,
    /// Position angle of nodes in radians.
    pub pan: f64,
    /// Epoch of periastron as a fraction of the period after the reference epoch.
    pub tau: f64,
}

impl OrbitElements {
    pub const LEN: usize = 6;

    /// Read elements in the order `sma, ecc, inc, aop, pan, tau`.
    pub fn from_slice(values: &[f64]) -> Self {
        assert!(values.len() == Self::LEN);
        OrbitElements {
            sma: values[0],
            ecc: values[1],
            inc: values[2],
            aop: values[3],
            pan: values[4],
            tau: values[5],
        }
    }
}

/// Orbital period in years for a semi-major axis in AU and a mass in solar masses.
#[inline]
pub fn period_years(sma: f64, mtot: f64) -> f64 {
    (sma.powi(3) / mtot).sqrt()
}

/// Mean anomaly in `[0, 2π)` at `epoch` (MJD).
pub fn mean_anomaly(epoch: f64, elements: &OrbitElements, mtot: f64, tau_ref_epoch: f64) -> f64 {
    let mean_motion = TAU / period_years(elements.sma, mtot);
    let elapsed = (epoch - tau_ref_epoch) / DAYS_PER_YEAR;
    principal_angle(mean_motion * elapsed - TAU * elements.tau)
}

/// Solve Kepler's equation `E - e sin E = M` for the eccentric anomaly.
pub fn solve_kepler(manom: f64, ecc: f64) -> f64 {
    if ecc == 0. {
        return manom;
    }
    if ecc < NEWTON_MAX_ECC {
        if let Some(eanom) = newton_solver(manom, ecc) {
            return eanom;
        }
    }
    mikkola_solver_wrapper(manom, ecc)
}

fn newton_solver(manom: f64, ecc: f64) -> Option<f64> {
    let mut eanom0 = manom;
    for _ in 0..NEWTON_MAX_ITER {
        let eanom = eanom0 - (eanom0 - ecc * eanom0.sin() - manom) / (1. - ecc * eanom0.cos());
        if (eanom - eanom0).abs() < NEWTON_TOLERANCE {
            return Some(eanom);
        }
        eanom0 = eanom;
    }
    None
}

/// Mikkola's method is set up for `M` in `[0, π]`; use the symmetry of the
/// equation for the other half.
fn mikkola_solver_wrapper(manom: f64, ecc: f64) -> f64 {
    let manom = principal_angle(manom);
    if manom > PI {
        TAU - mikkola_solver(TAU - manom, ecc)
    } else {
        mikkola_solver(manom, ecc)
    }
}

fn mikkola_solver(manom: f64, ecc: f64) -> f64 {
    let alpha = (1. - ecc) / (4. * ecc + 0.5);
    let beta = 0.5 * manom / (4. * ecc + 0.5);
    let aux = (beta * beta + alpha.powi(3)).sqrt();
    let z = (beta + aux).abs().cbrt();

    let s0 = z - alpha / z;
    let s1 = s0 - 0.078 * s0.powi(5) / (1. + ecc);
    let e0 = manom + ecc * (3. * s1 - 4. * s1.powi(3));

    let (se0, ce0) = e0.sin_cos();
    let f = e0 - ecc * se0 - manom;
    let f1 = 1. - ecc * ce0;
    let f2 = ecc * se0;
    let f3 = ecc * ce0;
    let f4 = -f2;
    let u1 = -f / f1;
    let u2 = -f / (f1 + 0.5 * f2 * u1);
    let u3 = -f / (f1 + 0.5 * f2 * u2 + f3 * u2 * u2 / 6.);
    let u4 = -f / (f1 + 0.5 * f2 * u3 + f3 * u3 * u3 / 6. + f4 * u3.powi(3) / 24.);
    e0 + u4
}

/// Offsets `(ra, dec)` in mas of one body at a single epoch.
pub fn predict_radec(
    epoch: f64,
    elements: &OrbitElements,
    plx: f64,
    mtot: f64,
    tau_ref_epoch: f64,
) -> (f64, f64) {
    let OrbitElements {
        sma,
        ecc,
        inc,
        aop,
        pan,
        ..
    } = *elements;

    let manom = mean_anomaly(epoch, elements, mtot, tau_ref_epoch);
    let eanom = solve_kepler(manom, ecc);

    let (sin_half, cos_half) = (0.5 * eanom).sin_cos();
    let tanom = 2. * ((1. + ecc).sqrt() * sin_half).atan2((1. - ecc).sqrt() * cos_half);
    let radius = sma * (1. - ecc * eanom.cos()) * plx;

    let c2i2 = (0.5 * inc).cos().powi(2);
    let s2i2 = (0.5 * inc).sin().powi(2);
    let arg1 = tanom + aop + pan;
    let arg2 = tanom + aop - pan;

    let ra = radius * (c2i2 * arg1.sin() - s2i2 * arg2.sin());
    let dec = radius * (c2i2 * arg1.cos() + s2i2 * arg2.cos());
    (ra, dec)
}

/// [`predict_radec`] for many epochs.
pub fn calc_orbit(
    epochs: &[f64],
    elements: &OrbitElements,
    plx: f64,
    mtot: f64,
    tau_ref_epoch: f64,
) -> Vec<(f64, f64)> {
    epochs
        .iter()
        .map(|&epoch| predict_radec(epoch, elements, plx, mtot, tau_ref_epoch))
        .collect()
}
