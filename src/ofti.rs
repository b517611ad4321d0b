//! Orbits for the Impatient: rejection sampling with scale-and-rotate.
//!
//! Every proposal is drawn from the priors and then rescaled and rotated so
//! that it passes through a noisy copy of the best-measured observation. The
//! adjusted proposal is accepted with probability `exp(lnlike - lnlike_max)`.

use std::f64::consts::TAU;

use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::data::radec2seppa;
use crate::kepler::{mean_anomaly, period_years, predict_radec, DAYS_PER_YEAR};
use crate::lnlike::max_lnlike;
use crate::math::{logaddexp, principal_angle, radians, unit_fraction, wrap_degrees};
use crate::results::{Results, SamplerKind};
use crate::sampler::{
    build_pool, stream_rng, AbortHandle, Phase, Progress, ProgressCallback, ProgressReporter,
    RunStatus, Sampler, SamplerError, Settings,
};
use crate::system::{System, SystemError};

const SMA: usize = 0;
const PAN: usize = 4;
const TAU_ELEMENT: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct OftiSettings {
    /// Proposals per batch.
    pub num_samples: usize,
    /// Proposals evaluated by one worker task, each with its own random stream.
    pub chunk_size: usize,
    /// Give up once this many proposals have been evaluated.
    pub max_attempts: u64,
    /// Consecutive batches without a single finite proposal before failing.
    pub max_nonfinite_batches: usize,
    pub num_threads: usize,
    pub seed: u64,
}

impl Default for OftiSettings {
    fn default() -> Self {
        Self {
            num_samples: 10_000,
            chunk_size: 500,
            max_attempts: 100_000_000,
            max_nonfinite_batches: 10,
            num_threads: 0,
            seed: 0,
        }
    }
}

impl Settings for OftiSettings {
    fn seed(&self) -> u64 {
        self.seed
    }

    fn num_threads(&self) -> usize {
        self.num_threads
    }
}

impl OftiSettings {
    fn validate(&self) -> Result<(), SamplerError> {
        if self.num_samples == 0 || self.chunk_size == 0 {
            return Err(SamplerError::InvalidSettings(
                "batch and chunk sizes must be positive".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(SamplerError::InvalidSettings(
                "max_attempts must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// The observation every proposal is conditioned on, in sep/PA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceEpoch {
    pub epoch: f64,
    pub sep: f64,
    pub sep_err: f64,
    /// Degrees.
    pub pa: f64,
    pub pa_err: f64,
}

impl ReferenceEpoch {
    /// The observation with the smallest separation uncertainty.
    fn best_measured(system: &System) -> Option<Self> {
        system
            .data()
            .iter()
            .map(|obs| {
                let (sep, sep_err, pa, pa_err) = obs.to_sep_pa();
                ReferenceEpoch {
                    epoch: obs.epoch,
                    sep,
                    sep_err,
                    pa,
                    pa_err,
                }
            })
            .min_by(|a, b| a.sep_err.total_cmp(&b.sep_err))
    }
}

/// What a worker needs to turn a random stream into accepted orbits.
#[derive(Debug)]
struct Proposer {
    system: System,
    reference: ReferenceEpoch,
    lnlike_max: f64,
    seed: u64,
}

#[derive(Debug, Default)]
struct ChunkOutput {
    accepted: Vec<(Vec<f64>, f64)>,
    finite: u64,
    /// `ln Σ exp(lnlike - lnlike_max)` over the finite proposals.
    log_acceptance: f64,
}

impl Proposer {
    /// A full parameter vector drawn from the priors and moved onto a noisy
    /// copy of the reference observation.
    fn propose<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let system = &self.system;
        let reference = &self.reference;
        let mut full: Vec<f64> = system.priors().iter().map(|p| p.sample(rng)).collect();

        let sma_idx = system.element_index(1, SMA);
        let pan_idx = system.element_index(1, PAN);
        let tau_idx = system.element_index(1, TAU_ELEMENT);
        let plx = full[system.plx_index()];
        let mtot = full[system.mtot_index()];
        let tau_ref_epoch = system.tau_ref_epoch();

        let elements = system.elements(&full, 1);
        let manom = mean_anomaly(reference.epoch, &elements, mtot, tau_ref_epoch);
        let (ra, dec) = predict_radec(reference.epoch, &elements, plx, mtot, tau_ref_epoch);
        let (sep, pa) = radec2seppa(ra, dec);

        let sep_noise: f64 = rng.sample(StandardNormal);
        let pa_noise: f64 = rng.sample(StandardNormal);
        let sep_target = reference.sep + reference.sep_err * sep_noise;
        let pa_target = reference.pa + reference.pa_err * pa_noise;

        // Scaling changes the separation only; rotating the nodes shifts the
        // position angle by the same amount.
        full[sma_idx] *= sep_target / sep;
        full[pan_idx] = principal_angle(full[pan_idx] + radians(wrap_degrees(pa_target - pa)));

        let period = period_years(full[sma_idx], mtot);
        let elapsed = (reference.epoch - tau_ref_epoch) / DAYS_PER_YEAR;
        full[tau_idx] = unit_fraction(elapsed / period - manom / TAU);
        full
    }

    fn run_chunk(&self, stream: u64, size: usize) -> ChunkOutput {
        let mut rng = stream_rng(self.seed, stream);
        let mut out = ChunkOutput {
            log_acceptance: f64::NEG_INFINITY,
            ..Default::default()
        };
        for _ in 0..size {
            let full = self.propose(&mut rng);
            let u: f64 = rng.random();
            let lnprior = self.system.lnprior(&full);
            if !lnprior.is_finite() {
                continue;
            }
            let lnlike = self.system.lnlike(&full);
            if !lnlike.is_finite() {
                continue;
            }
            out.finite += 1;
            let log_ratio = (lnlike - self.lnlike_max).min(0.);
            out.log_acceptance = logaddexp(out.log_acceptance, log_ratio);
            if u.ln() < log_ratio {
                out.accepted.push((self.system.compress(&full), lnlike));
            }
        }
        out
    }
}

/// Rejection sampler for a single companion.
pub struct Ofti {
    proposer: Proposer,
    settings: OftiSettings,
    pool: ThreadPool,
    results: Results,
    phase: Phase,
    attempts: u64,
    finite: u64,
    batches: u64,
    nonfinite_batches: usize,
    log_acceptance: f64,
    abort: AbortHandle,
    reporter: ProgressReporter,
}

impl Ofti {
    pub fn new(system: System, settings: OftiSettings) -> Result<Self, SamplerError> {
        settings.validate()?;
        if system.num_secondary_bodies() != 1 {
            return Err(SystemError::UnsupportedSystem(format!(
                "OFTI fits one secondary body, got {}",
                system.num_secondary_bodies()
            ))
            .into());
        }
        for label in ["sma1", "pan1", "tau1"] {
            if system.free_param_idx().get(label).is_none() {
                return Err(SystemError::UnsupportedSystem(format!(
                    "OFTI adjusts {label}, which must not be fixed"
                ))
                .into());
            }
        }

        let reference = ReferenceEpoch::best_measured(&system)
            .ok_or_else(|| SystemError::UnsupportedSystem("no observations".into()))?;
        let lnlike_max = max_lnlike(system.data());
        let pool = build_pool(settings.num_threads(), "ofti")?;
        let results = Results::for_system(&system, SamplerKind::Ofti, true);
        Ok(Ofti {
            proposer: Proposer {
                system,
                reference,
                lnlike_max,
                seed: settings.seed(),
            },
            settings,
            pool,
            results,
            phase: Phase::Uninitialized,
            attempts: 0,
            finite: 0,
            batches: 0,
            nonfinite_batches: 0,
            log_acceptance: f64::NEG_INFINITY,
            abort: AbortHandle::default(),
            reporter: ProgressReporter::new(None),
        })
    }

    pub fn system(&self) -> &System {
        &self.proposer.system
    }

    pub fn reference(&self) -> &ReferenceEpoch {
        &self.proposer.reference
    }

    /// Log-likelihood of a perfect fit, the acceptance normalization.
    pub fn lnlike_max(&self) -> f64 {
        self.proposer.lnlike_max
    }

    /// Proposals evaluated so far, accepted or not.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Fraction of evaluated proposals that were kept.
    pub fn acceptance_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.;
        }
        self.results.num_samples() as f64 / self.attempts as f64
    }

    /// `num_samples` scaled-and-rotated full parameter vectors, before the
    /// accept/reject step.
    pub fn prepare_samples<R: Rng + ?Sized>(&self, rng: &mut R, num_samples: usize) -> Vec<Vec<f64>> {
        (0..num_samples).map(|_| self.proposer.propose(rng)).collect()
    }

    fn progress(&self, total: usize) -> Progress {
        Progress {
            sampler: SamplerKind::Ofti,
            phase: self.phase,
            stored: self.results.num_samples(),
            total,
            iterations: self.attempts,
        }
    }

    fn run_batch(&mut self, total_orbits: usize) -> Result<(), SamplerError> {
        let chunk_size = self.settings.chunk_size.min(self.settings.num_samples);
        let remaining = self.settings.max_attempts - self.attempts;
        let batch_size = (self.settings.num_samples as u64).min(remaining) as usize;
        let num_chunks = batch_size.div_ceil(chunk_size);
        // Stream ids depend on the batch number only, never on the pool size.
        let first_stream = self.batches * self.settings.num_samples.div_ceil(chunk_size) as u64;

        let proposer = &self.proposer;
        let outputs: Vec<ChunkOutput> = self.pool.install(|| {
            (0..num_chunks)
                .into_par_iter()
                .map(|chunk| {
                    let size = chunk_size.min(batch_size - chunk * chunk_size);
                    proposer.run_chunk(first_stream + chunk as u64, size)
                })
                .collect()
        });

        self.batches += 1;
        self.attempts += batch_size as u64;
        let mut finite = 0;
        let mut accepted = 0;
        for output in outputs {
            finite += output.finite;
            self.log_acceptance = logaddexp(self.log_acceptance, output.log_acceptance);
            for (row, lnlike) in output.accepted {
                if self.results.num_samples() == total_orbits {
                    break;
                }
                self.results.append(&row, lnlike, Some(1.));
                accepted += 1;
            }
        }
        self.finite += finite;

        debug!(
            batch = self.batches,
            accepted,
            stored = self.results.num_samples(),
            attempts = self.attempts,
            "OFTI batch done"
        );

        if finite == 0 {
            self.nonfinite_batches += 1;
            warn!(
                batch = self.batches,
                consecutive = self.nonfinite_batches,
                "every proposal in the batch had a non-finite log probability"
            );
            if self.nonfinite_batches >= self.settings.max_nonfinite_batches {
                return Err(SamplerError::NonFiniteLogProbability {
                    steps: self.nonfinite_batches,
                });
            }
        } else {
            self.nonfinite_batches = 0;
        }
        Ok(())
    }
}

impl Sampler for Ofti {
    type Settings = OftiSettings;

    fn run_sampler(&mut self, total_orbits: usize) -> Result<RunStatus, SamplerError> {
        if self.phase == Phase::Complete {
            return Err(SamplerError::AlreadyComplete);
        }
        if total_orbits == 0 {
            return Err(SamplerError::InvalidSettings(
                "total_orbits must be positive".into(),
            ));
        }
        if self.phase == Phase::Uninitialized {
            self.reporter.restart();
            info!(
                total_orbits,
                reference_epoch = self.proposer.reference.epoch,
                batch_size = self.settings.num_samples,
                "starting OFTI"
            );
        }
        self.phase = Phase::Producing;

        while self.results.num_samples() < total_orbits {
            if self.abort.is_aborted() {
                info!(stored = self.results.num_samples(), "OFTI aborted");
                return Ok(RunStatus::Aborted);
            }
            if self.attempts >= self.settings.max_attempts {
                warn!(
                    accepted = self.results.num_samples(),
                    attempts = self.attempts,
                    "OFTI reached max_attempts"
                );
                return Err(SamplerError::NotConverged {
                    accepted: self.results.num_samples(),
                    requested: total_orbits,
                    attempts: self.attempts,
                });
            }
            self.run_batch(total_orbits)?;
            let progress = self.progress(total_orbits);
            self.reporter.report(progress);
        }

        self.phase = Phase::Complete;
        let expected_acceptance = if self.finite > 0 {
            (self.log_acceptance - (self.finite as f64).ln()).exp()
        } else {
            0.
        };
        info!(
            accepted = self.results.num_samples(),
            attempts = self.attempts,
            acceptance_rate = self.acceptance_rate(),
            expected_acceptance,
            "OFTI finished"
        );
        let progress = self.progress(total_orbits);
        self.reporter.finish(progress);
        Ok(RunStatus::Complete)
    }

    fn settings(&self) -> &OftiSettings {
        &self.settings
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn results(&self) -> &Results {
        &self.results
    }

    fn into_results(self) -> Results {
        self.results
    }

    fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.reporter.set_callback(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use crate::data::Observation;
    use crate::prior::Prior;
    use crate::system::test_systems::{short_arc, TRUE_ELEMENTS};
    use crate::system::SystemConstants;

    fn settings() -> OftiSettings {
        OftiSettings {
            num_samples: 2000,
            chunk_size: 250,
            seed: 42,
            ..Default::default()
        }
    }

    #[test]
    fn reference_is_best_measured() {
        let mut data = short_arc().data().to_vec();
        data[2].quant1_err = 2.;
        let sys = System::new(1, data.clone(), SystemConstants::new(1.5, 40.)).unwrap();
        let ofti = Ofti::new(sys, settings()).unwrap();
        assert_eq!(ofti.reference().epoch, data[2].epoch);
        assert_eq!(ofti.reference().sep_err, 2.);
    }

    #[test]
    fn proposals_pass_near_reference() {
        let ofti = Ofti::new(short_arc(), settings()).unwrap();
        let reference = *ofti.reference();
        let sys = ofti.system();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for full in ofti.prepare_samples(&mut rng, 200) {
            let elements = sys.elements(&full, 1);
            let (ra, dec) = predict_radec(reference.epoch, &elements, 40., 1.5, 58849.);
            let (sep, pa) = radec2seppa(ra, dec);
            assert!((sep - reference.sep).abs() < 6. * reference.sep_err);
            assert!(wrap_degrees(pa - reference.pa).abs() < 6. * reference.pa_err);
            assert!((0. ..1.).contains(&elements.tau));
            assert!((0. ..TAU).contains(&elements.pan));
        }
    }

    #[test]
    fn returns_exact_count() {
        let mut ofti = Ofti::new(short_arc(), settings()).unwrap();
        assert_eq!(ofti.run_sampler(25).unwrap(), RunStatus::Complete);
        let results = ofti.results();
        assert_eq!(results.num_samples(), 25);
        assert_eq!(results.dim(), 6);
        assert_eq!(results.weights().map(<[f64]>::len), Some(25));
        assert!(results.lnlike().iter().all(|l| *l <= ofti.lnlike_max()));
        assert_eq!(ofti.phase(), Phase::Complete);
        assert!(matches!(
            ofti.run_sampler(25),
            Err(SamplerError::AlreadyComplete)
        ));
    }

    #[test]
    fn output_ignores_thread_count() {
        let run = |num_threads| {
            let mut ofti = Ofti::new(
                short_arc(),
                OftiSettings {
                    num_threads,
                    ..settings()
                },
            )
            .unwrap();
            ofti.run_sampler(20).unwrap();
            ofti.into_results()
        };
        let a = run(1);
        let b = run(3);
        assert_eq!(a.post(), b.post());
        assert_eq!(a.lnlike(), b.lnlike());
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut ofti = Ofti::new(
            short_arc(),
            OftiSettings {
                max_attempts: 1000,
                ..settings()
            },
        )
        .unwrap();
        match ofti.run_sampler(100_000) {
            Err(SamplerError::NotConverged {
                accepted,
                requested,
                attempts,
            }) => {
                assert_eq!(attempts, 1000);
                assert_eq!(requested, 100_000);
                assert_eq!(accepted, ofti.results().num_samples());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn abort_keeps_partial_results() {
        let mut ofti = Ofti::new(short_arc(), settings()).unwrap();
        let handle = ofti.abort_handle();
        handle.abort();
        assert_eq!(ofti.run_sampler(10).unwrap(), RunStatus::Aborted);
        assert_eq!(ofti.results().num_samples(), 0);
        handle.reset();
        assert_eq!(ofti.run_sampler(10).unwrap(), RunStatus::Complete);
        assert_eq!(ofti.results().num_samples(), 10);
    }

    #[test]
    fn rejects_unsupported_systems() {
        let data = vec![
            Observation::sep_pa(58000., 1, 450., 5., 120., 0.5),
            Observation::sep_pa(58000., 2, 900., 5., 10., 0.5),
        ];
        let sys = System::new(2, data, SystemConstants::new(1., 20.)).unwrap();
        assert!(matches!(
            Ofti::new(sys, settings()),
            Err(SamplerError::System(SystemError::UnsupportedSystem(_)))
        ));

        let mut sys = short_arc();
        sys.set_prior("pan1", Prior::fixed(1.).unwrap()).unwrap();
        assert!(matches!(
            Ofti::new(sys, settings()),
            Err(SamplerError::System(SystemError::UnsupportedSystem(_)))
        ));
    }

    #[test]
    fn rejects_bad_settings() {
        let bad = OftiSettings {
            chunk_size: 0,
            ..settings()
        };
        assert!(matches!(
            Ofti::new(short_arc(), bad),
            Err(SamplerError::InvalidSettings(_))
        ));
    }

    #[test]
    fn unreachable_prior_exhausts_nonfinite_budget() {
        let mut sys = short_arc();
        // Face-on and circular, every draw sits 1000 AU out and is scaled
        // back to about 12 AU, outside its prior.
        sys.set_prior("ecc1", Prior::fixed(0.).unwrap()).unwrap();
        sys.set_prior("inc1", Prior::fixed(0.).unwrap()).unwrap();
        sys.set_prior("sma1", Prior::uniform(1000., 1001.).unwrap())
            .unwrap();
        let mut ofti = Ofti::new(
            sys,
            OftiSettings {
                num_samples: 500,
                chunk_size: 100,
                ..settings()
            },
        )
        .unwrap();
        assert!(matches!(
            ofti.run_sampler(10),
            Err(SamplerError::NonFiniteLogProbability { steps: 10 })
        ));
        assert_eq!(ofti.attempts(), 5000);
        assert!(ofti.results().is_empty());
    }

    #[test]
    fn posterior_fits_the_data() {
        let mut ofti = Ofti::new(short_arc(), settings()).unwrap();
        ofti.run_sampler(200).unwrap();
        let results = ofti.results();

        let mut misfit: Vec<f64> = results
            .lnlike()
            .iter()
            .map(|l| ofti.lnlike_max() - l)
            .collect();
        misfit.sort_by(f64::total_cmp);
        assert!(misfit[misfit.len() / 2] < 10.);

        let mut sma = results.column_by_label("sma1").unwrap();
        sma.sort_by(f64::total_cmp);
        let truth = TRUE_ELEMENTS.sma;
        assert!(sma[0] < truth && truth < sma[sma.len() - 1]);
        let median = sma[sma.len() / 2];
        assert!(
            median > truth / 2. && median < truth * 3.,
            "sma1 median {median} far from {truth}"
        );
    }
}
