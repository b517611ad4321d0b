use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;

use crate::results::{Results, SamplerKind};
use crate::system::SystemError;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("every proposal had a non-finite log probability for {steps} consecutive steps")]
    NonFiniteLogProbability { steps: usize },
    #[error("accepted {accepted} of {requested} orbits after {attempts} proposals")]
    NotConverged {
        accepted: usize,
        requested: usize,
        attempts: u64,
    },
    #[error("no finite starting position after {tries} draws from the priors")]
    InitializationFailed { tries: usize },
    #[error("sampler already completed its run")]
    AlreadyComplete,
    #[error("invalid sampler settings: {0}")]
    InvalidSettings(String),
    #[error(transparent)]
    System(#[from] SystemError),
    #[error("could not start thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// All sampler configurations implement this trait
pub trait Settings: Clone + Copy + Debug + Default + Send + Sync + 'static {
    /// Seed of the random stream every draw of a run derives from.
    fn seed(&self) -> u64;
    /// Worker threads; zero lets rayon decide.
    fn num_threads(&self) -> usize;
}

/// Where a sampler is in its run.
///
/// Runs move forward only: `Uninitialized → BurningIn → Producing → Complete`.
/// Rejection sampling has no burn-in and goes straight to `Producing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Uninitialized,
    BurningIn,
    Producing,
    Complete,
}

/// Outcome of a call to [`Sampler::run_sampler`] that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    /// Stopped through an [`AbortHandle`]; the results hold every sample
    /// stored so far and the run can be resumed.
    Aborted,
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Progress {
    pub sampler: SamplerKind,
    pub phase: Phase,
    /// Rows stored in the results.
    pub stored: usize,
    /// Rows requested.
    pub total: usize,
    /// Proposals evaluated (OFTI) or ensemble steps taken (MCMC).
    pub iterations: u64,
}

pub struct ProgressCallback {
    pub callback: Box<dyn FnMut(Duration, Progress) + Send>,
    pub rate: Duration,
}

/// Stops a running sampler between batches or steps.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear an earlier abort so that the run can be resumed.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// A posterior sampler over the free parameters of a system.
pub trait Sampler {
    type Settings: Settings;

    /// Sample until the results hold `total_orbits` rows.
    fn run_sampler(&mut self, total_orbits: usize) -> Result<RunStatus, SamplerError>;

    fn settings(&self) -> &Self::Settings;

    fn phase(&self) -> Phase;

    fn results(&self) -> &Results;

    fn into_results(self) -> Results;

    fn abort_handle(&self) -> AbortHandle;

    fn set_progress_callback(&mut self, callback: ProgressCallback);
}

/// Rate-limited delivery of [`Progress`] to an optional callback.
pub(crate) struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start: Instant,
    last: Option<Instant>,
}

impl ProgressReporter {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        ProgressReporter {
            callback,
            start: Instant::now(),
            last: None,
        }
    }

    pub(crate) fn set_callback(&mut self, callback: ProgressCallback) {
        self.callback = Some(callback);
        self.last = None;
    }

    pub(crate) fn restart(&mut self) {
        self.start = Instant::now();
        self.last = None;
    }

    pub(crate) fn report(&mut self, progress: Progress) {
        let Some(ProgressCallback { callback, rate }) = &mut self.callback else {
            return;
        };
        let due = self.last.map_or(true, |last| last.elapsed() >= *rate);
        if due {
            callback(self.start.elapsed(), progress);
            self.last = Some(Instant::now());
        }
    }

    pub(crate) fn finish(&mut self, progress: Progress) {
        if let Some(ProgressCallback { callback, .. }) = &mut self.callback {
            callback(self.start.elapsed(), progress);
            self.last = Some(Instant::now());
        }
    }
}

pub(crate) fn build_pool(num_threads: usize, name: &'static str) -> Result<ThreadPool, SamplerError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(move |i| format!("{}-worker-{}", name, i))
        .build()?;
    Ok(pool)
}

/// Independent random stream `stream` of the generator seeded with `seed`.
pub(crate) fn stream_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}
