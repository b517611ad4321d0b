//! Gaussian log-likelihood of predicted against measured astrometry.

use crate::data::{Observation, QuantType};
use crate::math::wrap_degrees;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Sum of independent Gaussian log-likelihoods of both quantities of every
/// observation. `model[i]` must be in the quantity type of `observations[i]`.
///
/// Position angle residuals are wrapped to `[-180, 180)` degrees.
pub fn chi2_lnlike(observations: &[Observation], model: &[(f64, f64)]) -> f64 {
    assert!(observations.len() == model.len());
    observations
        .iter()
        .zip(model)
        .map(|(obs, &(m1, m2))| {
            let resid1 = obs.quant1 - m1;
            let resid2 = match obs.quant_type {
                QuantType::SepPa => wrap_degrees(obs.quant2 - m2),
                QuantType::RaDec => obs.quant2 - m2,
            };
            gaussian_term(resid1, obs.quant1_err) + gaussian_term(resid2, obs.quant2_err)
        })
        .sum()
}

/// Log-likelihood of a model that reproduces every measurement exactly.
pub fn max_lnlike(observations: &[Observation]) -> f64 {
    observations
        .iter()
        .map(|obs| gaussian_term(0., obs.quant1_err) + gaussian_term(0., obs.quant2_err))
        .sum()
}

#[inline]
fn gaussian_term(resid: f64, sigma: f64) -> f64 {
    let z = resid / sigma;
    -0.5 * z * z - sigma.ln() - LN_SQRT_2PI
}
