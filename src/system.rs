//! The system being fit: measurements, physical constants and priors.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;

use crate::data::{radec2seppa, Observation, QuantType};
use crate::kepler::{predict_radec, OrbitElements};
use crate::lnlike::chi2_lnlike;
use crate::model::Model;
use crate::prior::{Prior, PriorError};

/// Reference epoch (MJD) `tau` is measured from unless configured otherwise.
pub const DEFAULT_TAU_REF_EPOCH: f64 = 58849.;

const ELEMENT_NAMES: [&str; OrbitElements::LEN] = ["sma", "ecc", "inc", "aop", "pan", "tau"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SystemError {
    #[error("could not construct system: {0}")]
    Construction(String),
    #[error("invalid prior replacement: {0}")]
    InvalidPriorReplacement(String),
    #[error("unsupported system: {0}")]
    UnsupportedSystem(String),
    #[error(transparent)]
    Prior(#[from] PriorError),
}

/// Bijection between parameter labels and positions in a parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamIndex {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl ParamIndex {
    pub fn new(labels: Vec<String>) -> Result<Self, SystemError> {
        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(SystemError::Construction(format!(
                    "duplicate parameter label {label}"
                )));
            }
        }
        Ok(ParamIndex { labels, index })
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn label(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Physical constants of the system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemConstants {
    /// Total mass in solar masses.
    pub total_mass: f64,
    /// Uncertainty on the total mass; zero holds the mass fixed.
    pub mass_err: f64,
    /// Parallax in mas.
    pub plx: f64,
    /// Uncertainty on the parallax; zero holds the parallax fixed.
    pub plx_err: f64,
    /// MJD from which `tau` is measured.
    pub tau_ref_epoch: f64,
}

impl SystemConstants {
    pub fn new(total_mass: f64, plx: f64) -> Self {
        SystemConstants {
            total_mass,
            mass_err: 0.,
            plx,
            plx_err: 0.,
            tau_ref_epoch: DEFAULT_TAU_REF_EPOCH,
        }
    }

    pub fn with_errors(mut self, mass_err: f64, plx_err: f64) -> Self {
        self.mass_err = mass_err;
        self.plx_err = plx_err;
        self
    }

    pub fn with_tau_ref_epoch(mut self, tau_ref_epoch: f64) -> Self {
        self.tau_ref_epoch = tau_ref_epoch;
        self
    }
}

/// Measurements, constants and the ordered parameter list with its priors.
///
/// For `n` secondary bodies the parameter vector is
/// `sma1, ecc1, inc1, aop1, pan1, tau1, ..., sma{n}, ..., tau{n}, plx, mtot`.
/// Samplers explore the free vector, the same list without fixed priors.
#[derive(Debug, Clone)]
pub struct System {
    num_secondary_bodies: usize,
    data: Arc<[Observation]>,
    constants: SystemConstants,
    priors: Vec<Prior>,
    param_idx: Arc<ParamIndex>,
    free_param_idx: Arc<ParamIndex>,
    /// Position in the full vector of every free parameter.
    free_positions: Vec<usize>,
}

impl System {
    /// A system with the default priors for every parameter.
    pub fn new(
        num_secondary_bodies: usize,
        data: Vec<Observation>,
        constants: SystemConstants,
    ) -> Result<Self, SystemError> {
        let priors = default_priors(num_secondary_bodies, &constants)?;
        Self::with_priors(num_secondary_bodies, data, constants, priors)
    }

    /// A system with an explicit prior for every parameter, in vector order.
    pub fn with_priors(
        num_secondary_bodies: usize,
        data: Vec<Observation>,
        constants: SystemConstants,
        priors: Vec<Prior>,
    ) -> Result<Self, SystemError> {
        if num_secondary_bodies == 0 {
            return Err(SystemError::Construction(
                "at least one secondary body is required".into(),
            ));
        }
        if data.is_empty() {
            return Err(SystemError::Construction("no observations".into()));
        }
        for obs in data.iter() {
            obs.validate(num_secondary_bodies)
                .map_err(SystemError::Construction)?;
        }
        if !(constants.tau_ref_epoch.is_finite()
            && constants.total_mass > 0.
            && constants.plx > 0.)
        {
            return Err(SystemError::Construction(
                "total mass and parallax must be positive".into(),
            ));
        }

        let param_idx = ParamIndex::new(param_labels(num_secondary_bodies))?;
        if priors.len() != param_idx.len() {
            return Err(SystemError::Construction(format!(
                "{} priors given for {} parameters",
                priors.len(),
                param_idx.len()
            )));
        }

        let (free_param_idx, free_positions) = free_index(&param_idx, &priors)?;
        if free_param_idx.is_empty() {
            return Err(SystemError::Construction(
                "every parameter is fixed".into(),
            ));
        }
        Ok(System {
            num_secondary_bodies,
            data: data.into(),
            constants,
            priors,
            param_idx: Arc::new(param_idx),
            free_param_idx: Arc::new(free_param_idx),
            free_positions,
        })
    }

    pub fn num_secondary_bodies(&self) -> usize {
        self.num_secondary_bodies
    }

    pub fn data(&self) -> &[Observation] {
        &self.data
    }

    pub fn constants(&self) -> &SystemConstants {
        &self.constants
    }

    pub fn tau_ref_epoch(&self) -> f64 {
        self.constants.tau_ref_epoch
    }

    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    /// Label to position map over the full parameter vector.
    pub fn param_idx(&self) -> &Arc<ParamIndex> {
        &self.param_idx
    }

    /// Label to position map over the free parameter vector.
    pub fn free_param_idx(&self) -> &Arc<ParamIndex> {
        &self.free_param_idx
    }

    pub fn labels(&self) -> &[String] {
        self.param_idx.labels()
    }

    pub fn prior(&self, label: &str) -> Option<&Prior> {
        self.param_idx.get(label).map(|idx| &self.priors[idx])
    }

    /// Position of an orbital element of `body` (1-based) in the full vector.
    pub fn element_index(&self, body: usize, element: usize) -> usize {
        assert!(body >= 1 && body <= self.num_secondary_bodies);
        assert!(element < OrbitElements::LEN);
        OrbitElements::LEN * (body - 1) + element
    }

    pub fn plx_index(&self) -> usize {
        OrbitElements::LEN * self.num_secondary_bodies
    }

    pub fn mtot_index(&self) -> usize {
        self.plx_index() + 1
    }

    /// Replace the prior of the parameter named `label`.
    pub fn set_prior(&mut self, label: &str, prior: Prior) -> Result<(), SystemError> {
        let idx = self.param_idx.get(label).ok_or_else(|| {
            SystemError::InvalidPriorReplacement(format!("unknown parameter {label}"))
        })?;
        self.set_prior_at(idx, prior)
    }

    /// Replace the prior at position `idx` of the full vector.
    pub fn set_prior_at(&mut self, idx: usize, prior: Prior) -> Result<(), SystemError> {
        if idx >= self.priors.len() {
            return Err(SystemError::InvalidPriorReplacement(format!(
                "index {idx} outside {} parameters",
                self.priors.len()
            )));
        }
        let mut priors = self.priors.clone();
        priors[idx] = prior;
        self.replace_priors(priors)
    }

    /// Replace every prior at once. The list must match the parameter list.
    pub fn replace_priors(&mut self, priors: Vec<Prior>) -> Result<(), SystemError> {
        if priors.len() != self.param_idx.len() {
            return Err(SystemError::InvalidPriorReplacement(format!(
                "expected {} priors, got {}",
                self.param_idx.len(),
                priors.len()
            )));
        }
        let (free_param_idx, free_positions) = free_index(&self.param_idx, &priors)?;
        if free_param_idx.is_empty() {
            return Err(SystemError::InvalidPriorReplacement(
                "every parameter would be fixed".into(),
            ));
        }
        self.priors = priors;
        self.free_param_idx = Arc::new(free_param_idx);
        self.free_positions = free_positions;
        Ok(())
    }

    pub fn free_dim(&self) -> usize {
        self.free_positions.len()
    }

    /// Position in the full vector of every free parameter.
    pub fn free_positions(&self) -> &[usize] {
        &self.free_positions
    }

    /// `(position, value)` of every fixed parameter in the full vector.
    pub fn fixed_values(&self) -> Vec<(usize, f64)> {
        self.priors
            .iter()
            .enumerate()
            .filter_map(|(idx, prior)| prior.fixed_value().map(|value| (idx, value)))
            .collect()
    }

    /// Full parameter vector from a free one, inserting fixed values.
    pub fn expand_free(&self, free: &[f64]) -> Vec<f64> {
        assert!(free.len() == self.free_dim());
        let mut full: Vec<f64> = self
            .priors
            .iter()
            .map(|prior| prior.fixed_value().unwrap_or(f64::NAN))
            .collect();
        for (&pos, &value) in self.free_positions.iter().zip(free) {
            full[pos] = value;
        }
        full
    }

    /// Free parameter vector from a full one.
    pub fn compress(&self, full: &[f64]) -> Vec<f64> {
        assert!(full.len() == self.priors.len());
        self.free_positions.iter().map(|&pos| full[pos]).collect()
    }

    pub fn elements(&self, full: &[f64], body: usize) -> OrbitElements {
        let start = self.element_index(body, 0);
        OrbitElements::from_slice(&full[start..start + OrbitElements::LEN])
    }

    /// Predicted measurements for every observation, each in its own
    /// quantity type.
    pub fn compute_model(&self, full: &[f64]) -> Vec<(f64, f64)> {
        assert!(full.len() == self.priors.len());
        let plx = full[self.plx_index()];
        let mtot = full[self.mtot_index()];
        self.data
            .iter()
            .map(|obs| {
                let elements = self.elements(full, obs.object);
                let (ra, dec) =
                    predict_radec(obs.epoch, &elements, plx, mtot, self.tau_ref_epoch());
                match obs.quant_type {
                    QuantType::RaDec => (ra, dec),
                    QuantType::SepPa => radec2seppa(ra, dec),
                }
            })
            .collect()
    }

    /// Log-likelihood of a full parameter vector.
    pub fn lnlike(&self, full: &[f64]) -> f64 {
        let model = self.compute_model(full);
        let lnlike = chi2_lnlike(&self.data, &model);
        if lnlike.is_nan() {
            f64::NEG_INFINITY
        } else {
            lnlike
        }
    }

    /// Sum of prior log-densities of a full parameter vector.
    pub fn lnprior(&self, full: &[f64]) -> f64 {
        self.free_positions
            .iter()
            .map(|&pos| self.priors[pos].log_density(full[pos]))
            .sum()
    }
}

impl Model for System {
    fn dim(&self) -> usize {
        self.free_dim()
    }

    fn log_prior(&self, position: &[f64]) -> f64 {
        self.free_positions
            .iter()
            .zip(position)
            .map(|(&pos, &x)| self.priors[pos].log_density(x))
            .sum()
    }

    fn log_likelihood(&self, position: &[f64]) -> f64 {
        self.lnlike(&self.expand_free(position))
    }

    fn init_position<R: Rng + ?Sized>(&self, rng: &mut R, position: &mut [f64]) {
        assert!(position.len() == self.free_dim());
        for (&pos, out) in self.free_positions.iter().zip(position.iter_mut()) {
            *out = self.priors[pos].sample(rng);
        }
    }
}

fn param_labels(num_secondary_bodies: usize) -> Vec<String> {
    let mut labels: Vec<String> = (1..=num_secondary_bodies)
        .flat_map(|body| ELEMENT_NAMES.iter().map(move |name| format!("{name}{body}")))
        .collect();
    labels.push("plx".into());
    labels.push("mtot".into());
    labels
}

fn default_priors(
    num_secondary_bodies: usize,
    constants: &SystemConstants,
) -> Result<Vec<Prior>, SystemError> {
    let mut priors = Vec::with_capacity(OrbitElements::LEN * num_secondary_bodies + 2);
    for _ in 0..num_secondary_bodies {
        priors.push(Prior::log_uniform(0.001, 1e4)?);
        priors.push(Prior::uniform(0., 1.)?);
        priors.push(Prior::Sine);
        priors.push(Prior::uniform(0., TAU)?);
        priors.push(Prior::uniform(0., TAU)?);
        priors.push(Prior::uniform(0., 1.)?);
    }
    priors.push(gaussian_or_fixed(constants.plx, constants.plx_err)?);
    priors.push(gaussian_or_fixed(constants.total_mass, constants.mass_err)?);
    Ok(priors)
}

fn gaussian_or_fixed(value: f64, err: f64) -> Result<Prior, PriorError> {
    if err > 0. {
        Prior::gaussian(value, err)
    } else {
        Prior::fixed(value)
    }
}

fn free_index(
    param_idx: &ParamIndex,
    priors: &[Prior],
) -> Result<(ParamIndex, Vec<usize>), SystemError> {
    let free_positions: Vec<usize> = priors
        .iter()
        .enumerate()
        .filter(|(_, prior)| !prior.is_fixed())
        .map(|(idx, _)| idx)
        .collect();
    let free_labels = free_positions
        .iter()
        .map(|&idx| param_idx.labels()[idx].clone())
        .collect();
    Ok((ParamIndex::new(free_labels)?, free_positions))
}
