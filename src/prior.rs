//! Prior distributions over single orbital parameters.
//!
//! A [`Prior`] is a closed set of scalar distributions. Every variant can draw
//! a value inside its support and evaluate a log-density for any real input,
//! returning `-inf` outside the support. [`Prior::Fixed`] is the degenerate
//! case: it always draws its value, contributes nothing to the log-prior, and
//! removes its parameter from the free vector the samplers explore.

use std::f64::consts::PI;
use std::fmt;

use rand::Rng;
use rand_distr::{Open01, StandardNormal};
use thiserror::Error;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Gaussian draws with `no_negatives` are redrawn at most this often.
const MAX_POSITIVE_REDRAWS: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriorError {
    #[error("invalid bounds for {name} prior: min={min} must be below max={max}")]
    InvalidBounds {
        name: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{name} prior requires a positive {param}, got {value}")]
    NonPositive {
        name: &'static str,
        param: &'static str,
        value: f64,
    },
    #[error("linear prior needs a negative slope and positive intercept, got m={slope}, b={intercept}")]
    InvalidLinear { slope: f64, intercept: f64 },
    #[error("prior parameters must be finite")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prior {
    /// Constant density on `[min, max]`.
    Uniform { min: f64, max: f64 },
    /// Normal density. With `no_negatives`, negative values have zero density
    /// and draws are repeated until they are non-negative.
    Gaussian {
        mu: f64,
        sigma: f64,
        no_negatives: bool,
    },
    /// Jeffreys prior, density proportional to `1/x` on `[min, max]`.
    LogUniform { min: f64, max: f64 },
    /// Density `sin(x)/2` on `[0, π]`, an isotropic inclination.
    Sine,
    /// Density `m x + b` on `[0, -b/m]`, normalized.
    Linear { slope: f64, intercept: f64 },
    /// Parameter held at a constant value.
    Fixed(f64),
}

impl Prior {
    pub fn uniform(min: f64, max: f64) -> Result<Self, PriorError> {
        check_finite(&[min, max])?;
        if min >= max {
            return Err(PriorError::InvalidBounds {
                name: "uniform",
                min,
                max,
            });
        }
        Ok(Prior::Uniform { min, max })
    }

    /// A Gaussian prior that excludes negative values.
    pub fn gaussian(mu: f64, sigma: f64) -> Result<Self, PriorError> {
        Self::gaussian_with_negatives(mu, sigma, false)
    }

    pub fn gaussian_with_negatives(
        mu: f64,
        sigma: f64,
        allow_negatives: bool,
    ) -> Result<Self, PriorError> {
        check_finite(&[mu, sigma])?;
        if sigma <= 0. {
            return Err(PriorError::NonPositive {
                name: "gaussian",
                param: "sigma",
                value: sigma,
            });
        }
        Ok(Prior::Gaussian {
            mu,
            sigma,
            no_negatives: !allow_negatives,
        })
    }

    pub fn log_uniform(min: f64, max: f64) -> Result<Self, PriorError> {
        check_finite(&[min, max])?;
        if min <= 0. {
            return Err(PriorError::NonPositive {
                name: "log-uniform",
                param: "minimum",
                value: min,
            });
        }
        if min >= max {
            return Err(PriorError::InvalidBounds {
                name: "log-uniform",
                min,
                max,
            });
        }
        Ok(Prior::LogUniform { min, max })
    }

    /// Alias of [`Prior::log_uniform`].
    pub fn jeffreys(min: f64, max: f64) -> Result<Self, PriorError> {
        Self::log_uniform(min, max)
    }

    pub fn linear(slope: f64, intercept: f64) -> Result<Self, PriorError> {
        check_finite(&[slope, intercept])?;
        if slope >= 0. || intercept <= 0. {
            return Err(PriorError::InvalidLinear { slope, intercept });
        }
        Ok(Prior::Linear { slope, intercept })
    }

    pub fn fixed(value: f64) -> Result<Self, PriorError> {
        check_finite(&[value])?;
        Ok(Prior::Fixed(value))
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Prior::Fixed(_))
    }

    pub fn fixed_value(&self) -> Option<f64> {
        match self {
            Prior::Fixed(value) => Some(*value),
            _ => None,
        }
    }

    /// Draw one value from the distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Prior::Uniform { min, max } => min + (max - min) * rng.random::<f64>(),
            Prior::Gaussian {
                mu,
                sigma,
                no_negatives,
            } => {
                let draw = |rng: &mut R| {
                    let z: f64 = rng.sample(StandardNormal);
                    mu + sigma * z
                };
                if !no_negatives {
                    return draw(rng);
                }
                for _ in 0..MAX_POSITIVE_REDRAWS {
                    let value = draw(rng);
                    if value >= 0. {
                        return value;
                    }
                }
                // Nearly all mass is negative; fold the last draw into support.
                draw(rng).abs()
            }
            Prior::LogUniform { min, max } => {
                let u: f64 = rng.random();
                let (lo, hi) = (min.ln(), max.ln());
                (lo + (hi - lo) * u).exp().clamp(min, max)
            }
            Prior::Sine => {
                let u: f64 = rng.sample(Open01);
                (1. - 2. * u).acos()
            }
            Prior::Linear { slope, intercept } => {
                let u: f64 = rng.sample(Open01);
                intercept * ((1. - u).sqrt() - 1.) / slope
            }
            Prior::Fixed(value) => value,
        }
    }

    /// Log probability density at `x`; `-inf` outside the support.
    pub fn log_density(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NEG_INFINITY;
        }
        match *self {
            Prior::Uniform { min, max } => {
                if (min..=max).contains(&x) {
                    -(max - min).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            Prior::Gaussian {
                mu,
                sigma,
                no_negatives,
            } => {
                if no_negatives && x < 0. {
                    return f64::NEG_INFINITY;
                }
                let z = (x - mu) / sigma;
                -0.5 * z * z - sigma.ln() - LN_SQRT_2PI
            }
            Prior::LogUniform { min, max } => {
                if (min..=max).contains(&x) {
                    -x.ln() - (max / min).ln().ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            Prior::Sine => {
                if (0. ..=PI).contains(&x) {
                    (x.sin() / 2.).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            Prior::Linear { slope, intercept } => {
                let upper = -intercept / slope;
                if (0. ..=upper).contains(&x) {
                    let norm = -intercept * intercept / (2. * slope);
                    ((slope * x + intercept) / norm).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            Prior::Fixed(_) => 0.,
        }
    }

    /// Support of the distribution as `(lower, upper)`.
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Prior::Uniform { min, max } | Prior::LogUniform { min, max } => (min, max),
            Prior::Gaussian { no_negatives, .. } => {
                let lower = if no_negatives { 0. } else { f64::NEG_INFINITY };
                (lower, f64::INFINITY)
            }
            Prior::Sine => (0., PI),
            Prior::Linear { slope, intercept } => (0., -intercept / slope),
            Prior::Fixed(value) => (value, value),
        }
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prior::Uniform { min, max } => write!(f, "Uniform({min}, {max})"),
            Prior::Gaussian { mu, sigma, .. } => write!(f, "Gaussian({mu}, {sigma})"),
            Prior::LogUniform { min, max } => write!(f, "LogUniform({min}, {max})"),
            Prior::Sine => write!(f, "Sine"),
            Prior::Linear { slope, intercept } => write!(f, "Linear({slope}, {intercept})"),
            Prior::Fixed(value) => write!(f, "Fixed({value})"),
        }
    }
}

fn check_finite(values: &[f64]) -> Result<(), PriorError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(PriorError::NonFinite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn all_priors() -> Vec<Prior> {
        vec![
            Prior::uniform(0., 1.).unwrap(),
            Prior::uniform(-3., 7.5).unwrap(),
            Prior::gaussian(0.2, 0.05).unwrap(),
            Prior::gaussian(0.01, 1.).unwrap(),
            Prior::gaussian_with_negatives(-4., 2., true).unwrap(),
            Prior::log_uniform(0.001, 1e4).unwrap(),
            Prior::Sine,
            Prior::linear(-2.18, 2.01).unwrap(),
            Prior::fixed(8.5).unwrap(),
        ]
    }

    proptest! {
        #[test]
        fn samples_have_finite_density(seed in any::<u64>()) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for prior in all_priors() {
                for _ in 0..20 {
                    let x = prior.sample(&mut rng);
                    let (lo, hi) = prior.bounds();
                    prop_assert!(x >= lo && x <= hi, "{prior}: {x} outside [{lo}, {hi}]");
                    prop_assert!(prior.log_density(x).is_finite(), "{prior}: {x}");
                }
            }
        }

        #[test]
        fn uniform_density_is_flat(x in -5f64..5f64) {
            let prior = Prior::uniform(-1., 3.).unwrap();
            let expected = if (-1. ..=3.).contains(&x) { -(4f64).ln() } else { f64::NEG_INFINITY };
            prop_assert_eq!(prior.log_density(x), expected);
        }
    }

    #[test]
    fn fixed_prior_is_degenerate() {
        let prior = Prior::fixed(8.5).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..10 {
            assert_eq!(prior.sample(&mut rng), 8.5);
        }
        assert_eq!(prior.log_density(1.), 0.);
        assert!(prior.is_fixed());
        assert_eq!(prior.fixed_value(), Some(8.5));
    }

    #[test]
    fn constructors_reject_bad_parameters() {
        assert!(matches!(
            Prior::uniform(1., 1.),
            Err(PriorError::InvalidBounds { .. })
        ));
        assert!(matches!(
            Prior::gaussian(0., 0.),
            Err(PriorError::NonPositive { .. })
        ));
        assert!(matches!(
            Prior::log_uniform(0., 10.),
            Err(PriorError::NonPositive { .. })
        ));
        assert!(matches!(
            Prior::linear(1., 1.),
            Err(PriorError::InvalidLinear { .. })
        ));
        assert_eq!(Prior::fixed(f64::NAN), Err(PriorError::NonFinite));
    }

    #[test]
    fn gaussian_rejects_negative_values() {
        let prior = Prior::gaussian(0.2, 0.05).unwrap();
        assert_eq!(prior.log_density(-0.1), f64::NEG_INFINITY);
        let expected = -(0.05f64).ln() - 0.5 * (2. * PI).ln();
        assert_abs_diff_eq!(prior.log_density(0.2), expected, epsilon = 1e-12);
    }

    #[test]
    fn densities_integrate_to_one() {
        let cases = [
            (Prior::log_uniform(0.5, 20.).unwrap(), 0.5, 20.),
            (Prior::Sine, 0., PI),
            (Prior::linear(-2.18, 2.01).unwrap(), 0., 2.01 / 2.18),
        ];
        for (prior, lo, hi) in cases {
            let n = 200_000;
            let dx = (hi - lo) / n as f64;
            let total: f64 = (0..n)
                .map(|i| prior.log_density(lo + (i as f64 + 0.5) * dx).exp() * dx)
                .sum();
            assert_abs_diff_eq!(total, 1., epsilon = 1e-4);
        }
    }

    #[test]
    fn sine_prior_centers_on_right_angle() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let n = 20_000;
        let mean = (0..n).map(|_| Prior::Sine.sample(&mut rng)).sum::<f64>() / n as f64;
        assert_abs_diff_eq!(mean, PI / 2., epsilon = 0.03);
    }

    #[test]
    fn display_names_distribution() {
        assert_eq!(Prior::uniform(0., 1.).unwrap().to_string(), "Uniform(0, 1)");
        assert_eq!(Prior::Sine.to_string(), "Sine");
    }
}
