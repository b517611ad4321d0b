//! Core abstraction for sampled models.
//!
//! Provides the `Model` trait, the interface both samplers use to evaluate
//! log densities over the free parameter vector and to draw starting points.

use rand::Rng;

/// A posterior over a free parameter vector of fixed dimension.
///
/// The trait is thread-safe so that proposals can be evaluated from a worker
/// pool; implementations must return identical values for identical inputs.
pub trait Model: Send + Sync {
    /// Number of free parameters.
    fn dim(&self) -> usize;

    /// Sum of the per-parameter prior log-densities.
    fn log_prior(&self, position: &[f64]) -> f64;

    /// Log-likelihood of the data given the parameters.
    fn log_likelihood(&self, position: &[f64]) -> f64;

    /// Log-prior and log-likelihood together. The likelihood is skipped when
    /// the prior already rules the point out.
    fn log_prob(&self, position: &[f64]) -> (f64, f64) {
        let lnprior = self.log_prior(position);
        if !lnprior.is_finite() {
            return (lnprior, f64::NEG_INFINITY);
        }
        (lnprior, self.log_likelihood(position))
    }

    /// Draws a starting position from the priors.
    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]);
}
