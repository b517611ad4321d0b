//! Parallel-tempered affine-invariant ensemble sampler.
//!
//! Every temperature holds its own ensemble of walkers. A step updates each
//! ensemble in two halves with the stretch move, then proposes swaps between
//! adjacent temperatures. Only the coldest (`β = 1`) ensemble is stored.

use std::ops::Range;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::math::lerp_out;
use crate::model::Model;
use crate::results::{Results, SamplerKind};
use crate::sampler::{
    build_pool, stream_rng, AbortHandle, Phase, Progress, ProgressCallback, ProgressReporter,
    RunStatus, Sampler, SamplerError, Settings,
};
use crate::system::System;

#[derive(Debug, Clone, Copy)]
pub struct McmcSettings {
    /// Number of temperatures, the first of which samples the posterior.
    pub num_temps: usize,
    /// Walkers per temperature. Must be even and at least twice the number
    /// of free parameters.
    pub num_walkers: usize,
    pub num_threads: usize,
    pub seed: u64,
    /// Steps taken before any sample is stored.
    pub burn_steps: usize,
    /// Store the coldest walkers every `thin` production steps.
    pub thin: usize,
    /// Draws from the priors per walker before initialization fails.
    pub max_init_tries: usize,
    /// Consecutive steps without a finite proposal before the run fails.
    pub nonfinite_retry_budget: usize,
    /// Scale `a` of the stretch move.
    pub stretch: f64,
}

impl Default for McmcSettings {
    fn default() -> Self {
        Self {
            num_temps: 20,
            num_walkers: 1000,
            num_threads: 0,
            seed: 0,
            burn_steps: 0,
            thin: 1,
            max_init_tries: 500,
            nonfinite_retry_budget: 100,
            stretch: 2.,
        }
    }
}

impl Settings for McmcSettings {
    fn seed(&self) -> u64 {
        self.seed
    }

    fn num_threads(&self) -> usize {
        self.num_threads
    }
}

impl McmcSettings {
    fn validate(&self, dim: usize) -> Result<(), SamplerError> {
        let fail = |msg: String| Err(SamplerError::InvalidSettings(msg));
        if self.num_temps == 0 {
            return fail("num_temps must be positive".into());
        }
        if self.num_walkers % 2 != 0 || self.num_walkers < 2 * dim {
            return fail(format!(
                "num_walkers must be even and at least {}, got {}",
                2 * dim,
                self.num_walkers
            ));
        }
        if self.thin == 0 || self.max_init_tries == 0 || self.nonfinite_retry_budget == 0 {
            return fail("thin, max_init_tries and nonfinite_retry_budget must be positive".into());
        }
        if !(self.stretch > 1.) {
            return fail(format!("stretch scale must exceed 1, got {}", self.stretch));
        }
        Ok(())
    }
}

/// Inverse temperatures `β_k = s^-k` with `s = 1 + 2 sqrt(ln 4 / dim)`.
pub fn temperature_ladder(num_temps: usize, dim: usize) -> Vec<f64> {
    let step = 1. + 2. * 4f64.ln().sqrt() / (dim as f64).sqrt();
    (0..num_temps).map(|k| step.powi(-(k as i32))).collect()
}

/// Walker states of every temperature, temperature-major.
#[derive(Debug, Clone, Default)]
struct Ensemble {
    positions: Vec<f64>,
    lnprior: Vec<f64>,
    lnlike: Vec<f64>,
}

impl Ensemble {
    fn position(&self, slot: usize, dim: usize) -> &[f64] {
        &self.positions[slot * dim..(slot + 1) * dim]
    }

    fn swap_slots(&mut self, a: usize, b: usize, dim: usize) {
        for d in 0..dim {
            self.positions.swap(a * dim + d, b * dim + d);
        }
        self.lnprior.swap(a, b);
        self.lnlike.swap(a, b);
    }
}

/// A stretch move with all its random numbers drawn up front.
struct Proposal {
    slot: usize,
    position: Vec<f64>,
    log_z_term: f64,
    log_u: f64,
}

/// `y = x_j + z (x_k - x_j)` for walker `x_k` and partner `x_j`.
fn stretch_position(walker: &[f64], partner: &[f64], z: f64) -> Vec<f64> {
    let mut position = vec![0.; walker.len()];
    lerp_out(walker, partner, z, &mut position);
    position
}

/// Counts of accepted and proposed moves.
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    accepted: u64,
    proposed: u64,
}

impl Tally {
    fn fraction(&self) -> f64 {
        if self.proposed == 0 {
            return 0.;
        }
        self.accepted as f64 / self.proposed as f64
    }
}

pub struct Mcmc {
    system: System,
    settings: McmcSettings,
    pool: ThreadPool,
    rng: ChaCha8Rng,
    betas: Vec<f64>,
    ensemble: Ensemble,
    results: Results,
    phase: Phase,
    burned: usize,
    production_steps: usize,
    steps: u64,
    moves: Vec<Tally>,
    swaps: Vec<Tally>,
    nonfinite_steps: usize,
    abort: AbortHandle,
    reporter: ProgressReporter,
}

impl Mcmc {
    pub fn new(system: System, settings: McmcSettings) -> Result<Self, SamplerError> {
        let dim = system.free_dim();
        settings.validate(dim)?;
        let pool = build_pool(settings.num_threads(), "mcmc")?;
        let results = Results::for_system(&system, SamplerKind::Mcmc, false);
        Ok(Mcmc {
            betas: temperature_ladder(settings.num_temps, dim),
            rng: stream_rng(settings.seed(), 0),
            system,
            pool,
            ensemble: Ensemble::default(),
            results,
            phase: Phase::Uninitialized,
            burned: 0,
            production_steps: 0,
            steps: 0,
            moves: vec![Tally::default(); settings.num_temps],
            swaps: vec![Tally::default(); settings.num_temps.saturating_sub(1)],
            nonfinite_steps: 0,
            abort: AbortHandle::default(),
            reporter: ProgressReporter::new(None),
            settings,
        })
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// Inverse temperature of every ensemble, coldest first.
    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    /// Fraction of accepted stretch moves per temperature.
    pub fn acceptance_fraction(&self) -> Vec<f64> {
        self.moves.iter().map(Tally::fraction).collect()
    }

    /// Fraction of accepted swaps between temperature `k` and `k + 1`.
    pub fn swap_acceptance(&self) -> Vec<f64> {
        self.swaps.iter().map(Tally::fraction).collect()
    }

    /// Current walker positions at temperature `temp`, walker-major.
    pub fn walkers(&self, temp: usize) -> &[f64] {
        let dim = self.system.free_dim();
        let walkers = self.settings.num_walkers;
        &self.ensemble.positions[temp * walkers * dim..(temp + 1) * walkers * dim]
    }

    /// Ensemble steps taken so far, burn-in included.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The stored samples without the first `burn` and the last `trim`
    /// stored steps. A trailing partial step counts as one step.
    pub fn chop_chains(&self, burn: usize, trim: usize) -> Result<Results, SamplerError> {
        let rows = self.results.num_samples();
        let walkers = self.settings.num_walkers;
        let stored_steps = rows.div_ceil(walkers);
        if burn + trim > stored_steps {
            return Err(SamplerError::InvalidSettings(format!(
                "cannot remove {} of {} stored steps",
                burn + trim,
                stored_steps
            )));
        }
        let end = ((stored_steps - trim) * walkers).min(rows);
        let start = (burn * walkers).min(end);
        Ok(self.results.slice_rows(start..end))
    }

    fn num_slots(&self) -> usize {
        self.settings.num_temps * self.settings.num_walkers
    }

    fn evaluate(&self, slots: &[usize]) -> Vec<(f64, f64)> {
        let system = &self.system;
        let ensemble = &self.ensemble;
        let dim = system.free_dim();
        self.pool.install(|| {
            slots
                .par_iter()
                .map(|&slot| system.log_prob(ensemble.position(slot, dim)))
                .collect()
        })
    }

    fn initialize(&mut self) -> Result<(), SamplerError> {
        let dim = self.system.free_dim();
        let num_slots = self.num_slots();
        self.ensemble = Ensemble {
            positions: vec![0.; num_slots * dim],
            lnprior: vec![f64::NEG_INFINITY; num_slots],
            lnlike: vec![f64::NEG_INFINITY; num_slots],
        };

        let mut pending: Vec<usize> = (0..num_slots).collect();
        let mut tries = 0;
        while !pending.is_empty() {
            if tries == self.settings.max_init_tries {
                return Err(SamplerError::InitializationFailed { tries });
            }
            if tries > 0 {
                warn!(
                    walkers = pending.len(),
                    tries, "redrawing walkers with non-finite starting positions"
                );
            }
            for &slot in &pending {
                let position = &mut self.ensemble.positions[slot * dim..(slot + 1) * dim];
                self.system.init_position(&mut self.rng, position);
            }
            let values = self.evaluate(&pending);
            for (&slot, (lnprior, lnlike)) in pending.iter().zip(values) {
                self.ensemble.lnprior[slot] = lnprior;
                self.ensemble.lnlike[slot] = lnlike;
            }
            pending.retain(|&slot| {
                !(self.ensemble.lnprior[slot].is_finite() && self.ensemble.lnlike[slot].is_finite())
            });
            tries += 1;
        }
        self.phase = Phase::BurningIn;
        debug!(tries, "walkers initialized");
        Ok(())
    }

    /// Stretch-move proposals for walkers `active` of every temperature,
    /// paired with walkers `partners`.
    fn draw_proposals(&mut self, active: Range<usize>, partners: Range<usize>) -> Vec<Proposal> {
        let dim = self.system.free_dim();
        let walkers = self.settings.num_walkers;
        let a = self.settings.stretch;
        let mut proposals = Vec::with_capacity(self.settings.num_temps * active.len());
        for temp in 0..self.settings.num_temps {
            let base = temp * walkers;
            for k in active.clone() {
                let j = self.rng.random_range(partners.clone());
                let u: f64 = self.rng.random();
                let z = ((a - 1.) * u + 1.).powi(2) / a;
                let log_u = self.rng.random::<f64>().ln();
                proposals.push(Proposal {
                    slot: base + k,
                    position: stretch_position(
                        self.ensemble.position(base + k, dim),
                        self.ensemble.position(base + j, dim),
                        z,
                    ),
                    log_z_term: (dim as f64 - 1.) * z.ln(),
                    log_u,
                });
            }
        }
        proposals
    }

    /// Update one half of every ensemble. Returns the number of proposals
    /// with a finite log probability.
    fn update_half(&mut self, active: Range<usize>, partners: Range<usize>) -> usize {
        let walkers = self.settings.num_walkers;
        let proposals = self.draw_proposals(active, partners);

        let system = &self.system;
        let values: Vec<(f64, f64)> = self.pool.install(|| {
            proposals
                .par_iter()
                .map(|proposal| system.log_prob(&proposal.position))
                .collect()
        });

        let dim = self.system.free_dim();
        let mut finite = 0;
        for (proposal, (lnprior, lnlike)) in proposals.into_iter().zip(values) {
            let temp = proposal.slot / walkers;
            self.moves[temp].proposed += 1;
            if !(lnprior.is_finite() && lnlike.is_finite()) {
                continue;
            }
            finite += 1;
            let slot = proposal.slot;
            let delta = self.betas[temp] * (lnlike - self.ensemble.lnlike[slot])
                + (lnprior - self.ensemble.lnprior[slot]);
            if proposal.log_z_term + delta > proposal.log_u {
                self.ensemble.positions[slot * dim..(slot + 1) * dim]
                    .copy_from_slice(&proposal.position);
                self.ensemble.lnprior[slot] = lnprior;
                self.ensemble.lnlike[slot] = lnlike;
                self.moves[temp].accepted += 1;
            }
        }
        finite
    }

    /// Propose swapping random pairs of walkers between adjacent
    /// temperatures, hottest pair first.
    fn swap_temperatures(&mut self) {
        let dim = self.system.free_dim();
        let walkers = self.settings.num_walkers;
        let mut hot: Vec<usize> = (0..walkers).collect();
        let mut cold: Vec<usize> = (0..walkers).collect();
        for temp in (1..self.settings.num_temps).rev() {
            let dbeta = self.betas[temp - 1] - self.betas[temp];
            hot.shuffle(&mut self.rng);
            cold.shuffle(&mut self.rng);
            for (&i, &j) in hot.iter().zip(&cold) {
                let hot_slot = temp * walkers + i;
                let cold_slot = (temp - 1) * walkers + j;
                let log_u = self.rng.random::<f64>().ln();
                let log_accept =
                    dbeta * (self.ensemble.lnlike[hot_slot] - self.ensemble.lnlike[cold_slot]);
                self.swaps[temp - 1].proposed += 1;
                if log_accept > log_u {
                    self.ensemble.swap_slots(hot_slot, cold_slot, dim);
                    self.swaps[temp - 1].accepted += 1;
                }
            }
        }
    }

    fn step(&mut self) -> Result<(), SamplerError> {
        let half = self.settings.num_walkers / 2;
        let walkers = self.settings.num_walkers;
        let mut finite = self.update_half(0..half, half..walkers);
        finite += self.update_half(half..walkers, 0..half);
        self.swap_temperatures();
        self.steps += 1;

        if finite == 0 {
            self.nonfinite_steps += 1;
            warn!(
                step = self.steps,
                consecutive = self.nonfinite_steps,
                "every proposal of the step had a non-finite log probability"
            );
            if self.nonfinite_steps >= self.settings.nonfinite_retry_budget {
                return Err(SamplerError::NonFiniteLogProbability {
                    steps: self.nonfinite_steps,
                });
            }
        } else {
            self.nonfinite_steps = 0;
        }
        Ok(())
    }

    fn store_coldest(&mut self, total_orbits: usize) {
        let dim = self.system.free_dim();
        for walker in 0..self.settings.num_walkers {
            if self.results.num_samples() == total_orbits {
                break;
            }
            let position = self.ensemble.position(walker, dim);
            self.results
                .append(position, self.ensemble.lnlike[walker], None);
        }
    }

    fn progress(&self, total: usize) -> Progress {
        Progress {
            sampler: SamplerKind::Mcmc,
            phase: self.phase,
            stored: self.results.num_samples(),
            total,
            iterations: self.steps,
        }
    }
}

impl Sampler for Mcmc {
    type Settings = McmcSettings;

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
                dim = self.system.free_dim(),
                num_temps = self.settings.num_temps,
                num_walkers = self.settings.num_walkers,
                max_temperature = self.betas.last().map_or(1., |beta| 1. / beta),
                total_orbits,
                "starting parallel-tempered MCMC"
            );
            self.initialize()?;
        }

        while self.phase == Phase::BurningIn && self.burned < self.settings.burn_steps {
            if self.abort.is_aborted() {
                info!(burned = self.burned, "MCMC aborted during burn-in");
                return Ok(RunStatus::Aborted);
            }
            self.step()?;
            self.burned += 1;
            debug!(step = self.burned, "burn-in step");
            let progress = self.progress(total_orbits);
            self.reporter.report(progress);
        }
        if self.phase == Phase::BurningIn {
            info!(
                burn_steps = self.burned,
                acceptance = self.moves[0].fraction(),
                "burn-in finished"
            );
            self.phase = Phase::Producing;
        }

        while self.results.num_samples() < total_orbits {
            if self.abort.is_aborted() {
                info!(stored = self.results.num_samples(), "MCMC aborted");
                return Ok(RunStatus::Aborted);
            }
            self.step()?;
            self.production_steps += 1;
            if self.production_steps % self.settings.thin == 0 {
                self.store_coldest(total_orbits);
            }
            debug!(
                step = self.production_steps,
                stored = self.results.num_samples(),
                "production step"
            );
            let progress = self.progress(total_orbits);
            self.reporter.report(progress);
        }

        self.phase = Phase::Complete;
        info!(
            steps = self.steps,
            stored = self.results.num_samples(),
            acceptance = ?self.acceptance_fraction(),
            swap_acceptance = ?self.swap_acceptance(),
            "MCMC finished"
        );
        let progress = self.progress(total_orbits);
        self.reporter.finish(progress);
        Ok(RunStatus::Complete)
    }

    fn settings(&self) -> &McmcSettings {
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
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    use crate::lnlike::max_lnlike;
    use crate::prior::Prior;
    use crate::system::test_systems::{loose_arc, short_arc, TRUE_ELEMENTS};

    fn settings() -> McmcSettings {
        McmcSettings {
            num_temps: 3,
            num_walkers: 16,
            seed: 11,
            burn_steps: 5,
            ..Default::default()
        }
    }

    #[test]
    fn ladder_is_geometric() {
        let betas = temperature_ladder(4, 9);
        let step = 1. + 2. * 4f64.ln().sqrt() / 3.;
        assert_eq!(betas[0], 1.);
        for pair in betas.windows(2) {
            assert_relative_eq!(pair[0] / pair[1], step, epsilon = 1e-12);
        }
        assert_eq!(temperature_ladder(1, 6), vec![1.]);
    }

    #[test]
    fn walker_count_is_validated() {
        for num_walkers in [15, 10] {
            let bad = McmcSettings {
                num_walkers,
                ..settings()
            };
            assert!(matches!(
                Mcmc::new(short_arc(), bad),
                Err(SamplerError::InvalidSettings(_))
            ));
        }
    }

    #[test]
    fn stores_exact_count_in_walker_order() {
        let mut mcmc = Mcmc::new(short_arc(), settings()).unwrap();
        assert_eq!(mcmc.run_sampler(40).unwrap(), RunStatus::Complete);
        let results = mcmc.results();
        assert_eq!(results.num_samples(), 40);
        assert_eq!(results.dim(), 6);
        assert_eq!(results.weights(), None);
        assert!(results.lnlike().iter().all(|l| l.is_finite()));
        // 40 rows of 16 walkers take three production steps after burn-in.
        assert_eq!(mcmc.steps(), 8);
        // The last stored block is the current coldest ensemble.
        let last_block = &results.post()[32 * 6..];
        assert_eq!(last_block, &mcmc.walkers(0)[..8 * 6]);
        assert!(matches!(
            mcmc.run_sampler(40),
            Err(SamplerError::AlreadyComplete)
        ));
    }

    #[test]
    fn output_ignores_thread_count() {
        let run = |num_threads| {
            let mut mcmc = Mcmc::new(
                short_arc(),
                McmcSettings {
                    num_threads,
                    ..settings()
                },
            )
            .unwrap();
            mcmc.run_sampler(32).unwrap();
            mcmc.into_results()
        };
        let a = run(1);
        let b = run(4);
        assert_eq!(a.post(), b.post());
        assert_eq!(a.lnlike(), b.lnlike());
    }

    #[test]
    fn thinning_skips_steps() {
        let mut mcmc = Mcmc::new(
            short_arc(),
            McmcSettings {
                thin: 3,
                burn_steps: 0,
                ..settings()
            },
        )
        .unwrap();
        mcmc.run_sampler(32).unwrap();
        assert_eq!(mcmc.steps(), 6);
    }

    #[test]
    fn acceptance_is_tracked() {
        let mut mcmc = Mcmc::new(short_arc(), settings()).unwrap();
        mcmc.run_sampler(64).unwrap();
        let acceptance = mcmc.acceptance_fraction();
        assert_eq!(acceptance.len(), 3);
        assert!(acceptance.iter().all(|f| (0. ..=1.).contains(f)));
        assert!(acceptance.iter().any(|f| *f > 0.));
        let swaps = mcmc.swap_acceptance();
        assert_eq!(swaps.len(), 2);
        assert!(swaps.iter().all(|f| (0. ..=1.).contains(f)));
    }

    #[test]
    fn chop_chains_drops_whole_steps() {
        let mut mcmc = Mcmc::new(short_arc(), settings()).unwrap();
        mcmc.run_sampler(100).unwrap();
        // Seven stored steps, the last holding four rows.
        let chopped = mcmc.chop_chains(1, 1).unwrap();
        assert_eq!(chopped.num_samples(), 80);
        assert_eq!(chopped.row(0), mcmc.results().row(16));
        assert_eq!(mcmc.chop_chains(0, 1).unwrap().num_samples(), 96);
        assert_eq!(mcmc.chop_chains(2, 0).unwrap().num_samples(), 68);
        assert!(mcmc.chop_chains(4, 4).is_err());
    }

    #[test]
    fn abort_then_resume() {
        let mut mcmc = Mcmc::new(short_arc(), settings()).unwrap();
        let handle = mcmc.abort_handle();
        handle.abort();
        assert_eq!(mcmc.run_sampler(32).unwrap(), RunStatus::Aborted);
        assert_eq!(mcmc.phase(), Phase::BurningIn);
        assert_eq!(mcmc.results().num_samples(), 0);
        handle.reset();
        assert_eq!(mcmc.run_sampler(32).unwrap(), RunStatus::Complete);
        assert_eq!(mcmc.results().num_samples(), 32);
        assert_eq!(mcmc.phase(), Phase::Complete);
    }

    #[test]
    fn impossible_priors_fail_initialization() {
        let mut sys = short_arc();
        sys.set_prior(
            "ecc1",
            Prior::gaussian_with_negatives(-5., 0.1, true).unwrap(),
        )
        .unwrap();
        let mut mcmc = Mcmc::new(
            sys,
            McmcSettings {
                max_init_tries: 3,
                ..settings()
            },
        )
        .unwrap();
        assert!(matches!(
            mcmc.run_sampler(16),
            Err(SamplerError::InitializationFailed { tries: 3 })
        ));
    }

    #[test]
    fn initial_walkers_are_finite() {
        let mut sys = short_arc();
        // About a third of these draws are unbound orbits and must be redrawn.
        sys.set_prior(
            "ecc1",
            Prior::gaussian_with_negatives(0.9, 0.3, true).unwrap(),
        )
        .unwrap();
        let mut mcmc = Mcmc::new(sys, settings()).unwrap();
        mcmc.initialize().unwrap();
        assert_eq!(mcmc.phase(), Phase::BurningIn);
        assert!(mcmc.ensemble.lnprior.iter().all(|l| l.is_finite()));
        assert!(mcmc.ensemble.lnlike.iter().all(|l| l.is_finite()));
        for temp in 0..3 {
            assert!(mcmc
                .walkers(temp)
                .chunks(6)
                .all(|walker| walker[1] < 1.));
        }
    }

    #[test]
    fn stuck_ensemble_exhausts_retry_budget() {
        let mut mcmc = Mcmc::new(
            short_arc(),
            McmcSettings {
                nonfinite_retry_budget: 3,
                ..settings()
            },
        )
        .unwrap();
        mcmc.initialize().unwrap();
        // Every walker at the same unphysical eccentricity: each stretch move
        // lands there too.
        for walker in mcmc.ensemble.positions.chunks_mut(6) {
            walker[1] = 1.5;
        }
        assert!(mcmc.step().is_ok());
        assert!(mcmc.step().is_ok());
        assert!(matches!(
            mcmc.step(),
            Err(SamplerError::NonFiniteLogProbability { steps: 3 })
        ));
        assert_eq!(mcmc.acceptance_fraction(), vec![0.; 3]);
    }

    #[test]
    fn recovers_known_orbit() {
        let mut sys = loose_arc();
        for (label, value) in [
            ("ecc1", TRUE_ELEMENTS.ecc),
            ("inc1", TRUE_ELEMENTS.inc),
            ("aop1", TRUE_ELEMENTS.aop),
        ] {
            sys.set_prior(label, Prior::fixed(value).unwrap()).unwrap();
        }
        sys.set_prior("sma1", Prior::uniform(5., 30.).unwrap())
            .unwrap();
        let lnlike_max = max_lnlike(sys.data());
        let mut mcmc = Mcmc::new(
            sys,
            McmcSettings {
                num_temps: 4,
                num_walkers: 32,
                burn_steps: 300,
                seed: 13,
                ..Default::default()
            },
        )
        .unwrap();
        mcmc.run_sampler(320).unwrap();

        let results = mcmc.results();
        let sma = &results.summary()[0];
        assert_eq!(sma.label, "sma1");
        assert!(
            (9. ..15.).contains(&sma.median),
            "sma1 median {} far from {}",
            sma.median,
            TRUE_ELEMENTS.sma
        );
        let mut misfit: Vec<f64> = results.lnlike().iter().map(|l| lnlike_max - l).collect();
        misfit.sort_by(f64::total_cmp);
        assert!(misfit[misfit.len() / 2] < 10.);
    }

    #[test]
    fn seed_changes_the_chain() {
        let run = |seed| {
            let mut mcmc = Mcmc::new(short_arc(), McmcSettings { seed, ..settings() }).unwrap();
            mcmc.run_sampler(16).unwrap();
            mcmc.into_results()
        };
        assert_eq!(run(3).post(), run(3).post());
        assert!(run(3).post() != run(4).post());
    }
}
