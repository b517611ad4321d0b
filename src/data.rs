//! Relative astrometry of secondary bodies.
//!
//! Parsing measurement files is left to callers; this module only holds the
//! in-memory table and the conversions between the two measurement types.

use crate::math::{degrees, radians};

/// Which pair of quantities an [`Observation`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantType {
    /// Separation (mas) and position angle (degrees east of north).
    SepPa,
    /// RA and Dec offsets of the companion from the primary (mas).
    RaDec,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Epoch in MJD.
    pub epoch: f64,
    /// Index of the orbiting body, starting at 1.
    pub object: usize,
    pub quant1: f64,
    pub quant1_err: f64,
    pub quant2: f64,
    pub quant2_err: f64,
    pub quant_type: QuantType,
}

impl Observation {
    pub fn sep_pa(epoch: f64, object: usize, sep: f64, sep_err: f64, pa: f64, pa_err: f64) -> Self {
        Observation {
            epoch,
            object,
            quant1: sep,
            quant1_err: sep_err,
            quant2: pa,
            quant2_err: pa_err,
            quant_type: QuantType::SepPa,
        }
    }

    pub fn ra_dec(epoch: f64, object: usize, ra: f64, ra_err: f64, dec: f64, dec_err: f64) -> Self {
        Observation {
            epoch,
            object,
            quant1: ra,
            quant1_err: ra_err,
            quant2: dec,
            quant2_err: dec_err,
            quant_type: QuantType::RaDec,
        }
    }

    /// This observation as `(sep, sep_err, pa, pa_err)`.
    pub fn to_sep_pa(&self) -> (f64, f64, f64, f64) {
        match self.quant_type {
            QuantType::SepPa => (self.quant1, self.quant1_err, self.quant2, self.quant2_err),
            QuantType::RaDec => {
                radec2seppa_err(self.quant1, self.quant1_err, self.quant2, self.quant2_err)
            }
        }
    }

    pub(crate) fn validate(&self, num_bodies: usize) -> Result<(), String> {
        let values = [
            self.epoch,
            self.quant1,
            self.quant1_err,
            self.quant2,
            self.quant2_err,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(format!("non-finite value at epoch {}", self.epoch));
        }
        if self.quant1_err <= 0. || self.quant2_err <= 0. {
            return Err(format!(
                "uncertainties must be positive at epoch {}",
                self.epoch
            ));
        }
        if self.object == 0 || self.object > num_bodies {
            return Err(format!(
                "object index {} outside 1..={num_bodies}",
                self.object
            ));
        }
        if self.quant_type == QuantType::SepPa && self.quant1 < 0. {
            return Err(format!("negative separation at epoch {}", self.epoch));
        }
        Ok(())
    }
}

/// Separation and position angle (degrees in `[0, 360)`) from RA/Dec offsets.
pub fn radec2seppa(ra: f64, dec: f64) -> (f64, f64) {
    let sep = ra.hypot(dec);
    let pa = degrees(ra.atan2(dec)).rem_euclid(360.);
    (sep, pa)
}

/// RA/Dec offsets from separation and position angle in degrees.
pub fn seppa2radec(sep: f64, pa: f64) -> (f64, f64) {
    let pa = radians(pa);
    (sep * pa.sin(), sep * pa.cos())
}

/// [`radec2seppa`] with first-order propagation of uncorrelated errors.
pub fn radec2seppa_err(ra: f64, ra_err: f64, dec: f64, dec_err: f64) -> (f64, f64, f64, f64) {
    let (sep, pa) = radec2seppa(ra, dec);
    if sep == 0. {
        return (sep, ra_err.max(dec_err), pa, 180.);
    }
    let sep_err = ((ra * ra_err).powi(2) + (dec * dec_err).powi(2)).sqrt() / sep;
    let pa_err = degrees(((dec * ra_err).powi(2) + (ra * dec_err).powi(2)).sqrt() / (sep * sep));
    (sep, sep_err, pa, pa_err)
}
