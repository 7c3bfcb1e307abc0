//! Instrumental Q resolution and beamstop transmission per bin.
//!
//! Pinhole (or lens) collimation, detector pixel blur, wavelength spread and
//! gravity contribute Gaussian variances in the detector plane. Near the
//! beamstop edge the radial distribution is truncated, which shifts the mean
//! radius and narrows the variance; `fsubs` is the surviving fraction.

use std::f64::consts::PI;

use log::trace;
use scilib::math::basic::erf;

use sansim_core::config::InstrumentConfig;
use sansim_core::geometry::DerivedGeometry;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Exclusive lower bound on reported transmission; keeps downstream
/// divisions finite.
pub const TRANSMISSION_FLOOR: f64 = 1.0e-10;

/// Transmission of a bin lying entirely in the beamstop shadow.
const SHADOWED_TRANSMISSION: f64 = 2.0 * TRANSMISSION_FLOOR;

/// Value substituted for the incomplete-gamma term in
/// [`IncompleteGamma::EpsilonStub`] mode.
pub const INCOMPLETE_GAMMA_STUB: f64 = 1.0e-10;

/// Mean radii at or below this (cm) use the small-Q limiting form.
pub const RM_FLOOR: f64 = 1.0e-10;

/// Standard gravity (cm/s^2).
const GRAVITY: f64 = 981.0;

/// Neutron velocity times wavelength (cm A / s).
const VELOCITY_WAVELENGTH: f64 = 3.956e5;

/// FWHM to standard deviation for a Gaussian.
const FWHM_PER_SIGMA: f64 = 2.3548;

/// Evaluation of the incomplete-gamma term in the truncated-variance correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IncompleteGamma {
    /// Fixed [`INCOMPLETE_GAMMA_STUB`].
    #[default]
    EpsilonStub,
    /// `Gamma(3/2) (1 -/+ P(3/2, delta))` from the closed form of `P(3/2, x)`.
    ClosedForm,
}

impl IncompleteGamma {
    /// Term for a truncation depth `delta`; `inside` is true when the
    /// nominal radius lies behind the beamstop.
    #[must_use]
    pub fn evaluate(self, delta: f64, inside: bool) -> f64 {
        match self {
            IncompleteGamma::EpsilonStub => INCOMPLETE_GAMMA_STUB,
            IncompleteGamma::ClosedForm => {
                let gamma = 0.5 * PI.sqrt();
                let p = regularized_gamma_three_halves(delta);
                if inside {
                    gamma * (1.0 - p)
                } else {
                    gamma * (1.0 + p)
                }
            }
        }
    }
}

/// Lower regularized incomplete gamma `P(3/2, x)`.
#[must_use]
pub fn regularized_gamma_three_halves(x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    erf(x.sqrt()) - 2.0 * (x / PI).sqrt() * (-x).exp()
}

/// Beamstop radius projected onto the detector plane.
///
/// The beamstop sits `20.1 + 1.61 r` cm upstream of the detector; the
/// projection is skipped when the detector is closer than that.
#[must_use]
pub fn projected_beamstop_radius(radius_cm: f64, l2_cm: f64) -> f64 {
    let lb = 20.1 + 1.61 * radius_cm;
    if l2_cm > lb {
        radius_cm + radius_cm * lb / (l2_cm - lb)
    } else {
        radius_cm
    }
}

/// Inputs to the resolution calculation. Lengths in cm.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResolutionParams {
    /// Wavelength (A).
    pub wavelength: f64,
    /// Fractional wavelength spread (FWHM).
    pub wavelength_spread: f64,
    /// Source aperture radius.
    pub source_radius_cm: f64,
    /// Sample aperture radius.
    pub sample_radius_cm: f64,
    /// Source aperture to sample aperture.
    pub l1_cm: f64,
    /// Sample aperture to detector.
    pub l2_cm: f64,
    /// Nominal beamstop radius.
    pub beamstop_radius_cm: f64,
    /// Detector pixel pitch.
    pub pixel_size_cm: f64,
    /// Focusing lenses instead of pinhole collimation.
    pub lens: bool,
    /// Incomplete-gamma evaluation mode.
    pub incomplete_gamma: IncompleteGamma,
}

impl ResolutionParams {
    /// Collects the inputs from a configuration and its derived geometry.
    #[must_use]
    pub fn from_config(config: &InstrumentConfig, geometry: &DerivedGeometry) -> Self {
        Self {
            wavelength: config.wavelength,
            wavelength_spread: config.wavelength_spread / 100.0,
            source_radius_cm: 0.5 * config.source_aperture_cm,
            sample_radius_cm: 0.5 * config.sample_aperture_cm,
            l1_cm: geometry.ssd_cm,
            l2_cm: geometry.sdd_cm + config.aperture_offset_cm,
            beamstop_radius_cm: 0.5 * config.beamstop_diameter_cm,
            pixel_size_cm: config.pixel_size_cm,
            lens: config.guides.is_lens(),
            incomplete_gamma: IncompleteGamma::default(),
        }
    }

    /// Set the incomplete-gamma mode.
    #[must_use]
    pub fn with_incomplete_gamma(mut self, mode: IncompleteGamma) -> Self {
        self.incomplete_gamma = mode;
        self
    }
}

/// Resolution output for one bin.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BinResolution {
    /// Resolution-corrected mean Q (1/A).
    pub q_mean: f64,
    /// Q standard deviation (1/A).
    pub sigma_q: f64,
    /// Unshadowed beam fraction, in `(TRANSMISSION_FLOOR, 1]`.
    pub transmission: f64,
}

/// Q-independent variances (cm^2, except `lambda` which is fractional).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variances {
    /// Wavelength spread.
    pub lambda: f64,
    /// Beam divergence.
    pub beam: f64,
    /// Detector blur.
    pub detector: f64,
    /// Gravity sag.
    pub gravity: f64,
}

/// Per-bin resolution for one configuration.
#[derive(Debug, Clone)]
pub struct ResolutionEngine {
    params: ResolutionParams,
    beamstop_radius_cm: f64,
    variances: Variances,
}

impl ResolutionEngine {
    /// Precomputes the Q-independent terms.
    #[must_use]
    pub fn new(params: ResolutionParams) -> Self {
        let p = &params;
        let (l1, l2) = (p.l1_cm, p.l2_cm);
        let lp = 1.0 / (1.0 / l1 + 1.0 / l2);

        let lambda = p.wavelength_spread.powi(2) / 6.0;
        let source_term = 0.25 * (p.source_radius_cm * l2 / l1).powi(2);
        let sample_term = 0.25 * (p.sample_radius_cm * l2 / lp).powi(2);
        let beam = if p.lens {
            source_term + (2.0 / 3.0) * (p.wavelength_spread / p.wavelength).powi(2) * sample_term
        } else {
            source_term + sample_term
        };
        let detector = (p.pixel_size_cm / FWHM_PER_SIGMA).powi(2) + p.pixel_size_cm.powi(2) / 12.0;
        let velocity = VELOCITY_WAVELENGTH / p.wavelength;
        let sag = 0.5 * GRAVITY * l2 * (l1 + l2) / velocity.powi(2);
        let gravity = 2.0 * (2.0 * sag * sag * lambda);

        Self {
            beamstop_radius_cm: projected_beamstop_radius(p.beamstop_radius_cm, l2),
            variances: Variances {
                lambda,
                beam,
                detector,
                gravity,
            },
            params,
        }
    }

    /// Inputs this engine was built from.
    #[must_use]
    pub fn params(&self) -> &ResolutionParams {
        &self.params
    }

    /// Q-independent variances.
    #[must_use]
    pub fn variances(&self) -> Variances {
        self.variances
    }

    /// Beamstop radius on the detector plane (cm).
    #[must_use]
    pub fn beamstop_radius_cm(&self) -> f64 {
        self.beamstop_radius_cm
    }

    /// Nominal radius on the detector (cm) for a Q value.
    #[must_use]
    pub fn nominal_radius(&self, q: f64) -> f64 {
        let s = (self.params.wavelength * q / (4.0 * PI)).clamp(-1.0, 1.0);
        self.params.l2_cm * (2.0 * s.asin()).tan()
    }

    /// Fraction of a Gaussian beam profile at `r0` not behind the beamstop.
    #[must_use]
    pub fn transmission_at(&self, r0: f64) -> f64 {
        let z = (r0 - self.beamstop_radius_cm) / (2.0 * self.variances.detector).sqrt();
        (0.5 * (1.0 + erf(z))).clamp(SHADOWED_TRANSMISSION, 1.0)
    }

    /// Resolution for one bin.
    #[must_use]
    pub fn evaluate(&self, q: f64) -> BinResolution {
        let Variances {
            lambda,
            beam,
            detector,
            gravity,
        } = self.variances;
        let bs = self.beamstop_radius_cm;
        let l2 = self.params.l2_cm;
        let wavelength = self.params.wavelength;

        let r0 = self.nominal_radius(q);
        let delta = 0.5 * (bs - r0).powi(2) / detector;
        let inc_gamma = self.params.incomplete_gamma.evaluate(delta, r0 < bs);
        let fsubs = self.transmission_at(r0);

        let rm = r0 + detector.sqrt() * (-delta).exp() / (fsubs * (2.0 * PI).sqrt());
        let fv =
            inc_gamma / (fsubs * PI.sqrt()) - (-2.0 * delta).exp() / (2.0 * PI * fsubs * fsubs);
        let var_r1 = (beam + fv * detector + gravity).max(0.0);

        let (q_mean, sigma_q) = if rm > RM_FLOOR {
            let rmd = rm + 0.5 * var_r1 / rm;
            let var_r = (var_r1 - 0.5 * (var_r1 / rmd).powi(2)).max(0.0);
            let q_mean = 4.0 * PI / wavelength * (0.5 * (rmd / l2).atan()).sin();
            (q_mean, q_mean * (var_r / (rmd * rmd) + lambda).sqrt())
        } else {
            // small-angle limit of the expression above as rm -> 0
            (q, 2.0 * PI / (wavelength * l2) * var_r1.sqrt())
        };

        trace!(
            "q = {q:.5}: r0 = {r0:.3} cm, fsubs = {fsubs:.3e}, q_mean = {q_mean:.5}, \
             sigma_q = {sigma_q:.3e}"
        );
        BinResolution {
            q_mean,
            sigma_q,
            transmission: fsubs,
        }
    }

    /// Resolution for every bin.
    #[must_use]
    pub fn evaluate_all(&self, q: &[f64]) -> Vec<BinResolution> {
        q.iter().map(|&q| self.evaluate(q)).collect()
    }
}
