//! Bayesian orbit fitting for directly imaged companions.
//!
//! A [`System`] holds relative astrometry, physical constants and one prior
//! per orbital parameter. Two samplers draw posterior orbits from it:
//! [`Ofti`], rejection sampling with scale-and-rotate, and [`Mcmc`], a
//! parallel-tempered affine-invariant ensemble. Both fill a [`Results`].
//!
//! ```no_run
//! use orbitfit::{Observation, Ofti, OftiSettings, Sampler, System, SystemConstants};
//!
//! # fn main() -> anyhow::Result<()> {
//! let data = vec![
//!     Observation::sep_pa(55000., 1, 450., 5., 120., 0.5),
//!     Observation::sep_pa(55400., 1, 455., 5., 121.5, 0.5),
//! ];
//! let system = System::new(1, data, SystemConstants::new(1.2, 50.))?;
//! let mut sampler = Ofti::new(system, OftiSettings::default())?;
//! sampler.run_sampler(1000)?;
//! for param in sampler.results().summary() {
//!     println!("{}: {:.3}", param.label, param.median);
//! }
//! # Ok(())
//! # }
//! ```

pub(crate) mod data;
pub(crate) mod kepler;
pub(crate) mod lnlike;
pub(crate) mod math;
pub(crate) mod mcmc;
pub(crate) mod model;
pub(crate) mod ofti;
pub(crate) mod prior;
pub(crate) mod results;
pub(crate) mod sampler;
pub(crate) mod system;

pub use data::{radec2seppa, radec2seppa_err, seppa2radec, Observation, QuantType};
pub use kepler::{
    calc_orbit, mean_anomaly, period_years, predict_radec, solve_kepler, OrbitElements,
    DAYS_PER_YEAR,
};
pub use lnlike::{chi2_lnlike, max_lnlike};
pub use mcmc::{temperature_ladder, Mcmc, McmcSettings};
pub use model::Model;
pub use ofti::{Ofti, OftiSettings, ReferenceEpoch};
pub use prior::{Prior, PriorError};
pub use results::{ParamSummary, Results, SamplerKind};
pub use sampler::{
    AbortHandle, Phase, Progress, ProgressCallback, RunStatus, Sampler, SamplerError, Settings,
};
pub use system::{ParamIndex, System, SystemConstants, SystemError, DEFAULT_TAU_REF_EPOCH};
