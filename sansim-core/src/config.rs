//! Instrument and averaging configuration.
#![allow(clippy::neg_cmp_op_on_partial_ord)]

use crate::error::{Error, Result};
use crate::instrument::{GuideConfig, Instrument, InstrumentTable, SampleTable};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Centimetres per inch, for aperture sizes quoted in inches.
pub const CM_PER_INCH: f64 = 2.54;

/// Instrument settings for one calculation.
///
/// Lengths are in cm, wavelength in A. Aperture and beamstop sizes are
/// diameters. The value is replaced wholesale when any setting changes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InstrumentConfig {
    /// Instrument whose constant tables apply.
    pub instrument: Instrument,
    /// Neutron wavelength (A).
    pub wavelength: f64,
    /// Wavelength spread, FWHM in percent.
    pub wavelength_spread: f64,
    /// Source aperture diameter (cm).
    pub source_aperture_cm: f64,
    /// Sample aperture diameter (cm).
    pub sample_aperture_cm: f64,
    /// Sample aperture to nominal sample position (cm).
    pub aperture_offset_cm: f64,
    /// Guides in the beam, or focusing lenses.
    pub guides: GuideConfig,
    /// Sample table in use.
    pub sample_table: SampleTable,
    /// Detector carriage position as read from the instrument (cm).
    pub detector_distance_cm: f64,
    /// Lateral detector offset (cm).
    pub detector_offset_cm: f64,
    /// Detector pixel pitch (cm).
    pub pixel_size_cm: f64,
    /// Detector pixels along x.
    pub x_pixels: usize,
    /// Detector pixels along y.
    pub y_pixels: usize,
    /// Beamstop diameter (cm).
    pub beamstop_diameter_cm: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self::from_instrument(Instrument::default())
    }
}

impl InstrumentConfig {
    /// Default settings for an instrument, taken from its constant table.
    #[must_use]
    pub fn from_instrument(instrument: Instrument) -> Self {
        let table = instrument.table();
        Self {
            instrument,
            wavelength: 6.0,
            wavelength_spread: table.wavelength_bands[0].spread_percent,
            source_aperture_cm: table.source_apertures_cm[0],
            sample_aperture_cm: 0.5 * CM_PER_INCH,
            aperture_offset_cm: table.aperture_offset_cm,
            guides: GuideConfig::default(),
            sample_table: SampleTable::default(),
            detector_distance_cm: table.detector_distance_range_cm.0,
            detector_offset_cm: 0.0,
            pixel_size_cm: table.pixel_size_cm,
            x_pixels: table.x_pixels,
            y_pixels: table.y_pixels,
            beamstop_diameter_cm: table.beamstop_diameters_cm[1],
        }
    }

    /// Constant table of the configured instrument.
    #[must_use]
    pub fn table(&self) -> &'static InstrumentTable {
        self.instrument.table()
    }

    /// Set wavelength (A).
    #[must_use]
    pub fn with_wavelength(mut self, wavelength: f64) -> Self {
        self.wavelength = wavelength;
        self
    }

    /// Set wavelength spread (percent FWHM).
    #[must_use]
    pub fn with_wavelength_spread(mut self, spread: f64) -> Self {
        self.wavelength_spread = spread;
        self
    }

    /// Set source aperture diameter (cm).
    #[must_use]
    pub fn with_source_aperture(mut self, diameter_cm: f64) -> Self {
        self.source_aperture_cm = diameter_cm;
        self
    }

    /// Set sample aperture diameter (cm).
    #[must_use]
    pub fn with_sample_aperture(mut self, diameter_cm: f64) -> Self {
        self.sample_aperture_cm = diameter_cm;
        self
    }

    /// Set aperture offset (cm).
    #[must_use]
    pub fn with_aperture_offset(mut self, offset_cm: f64) -> Self {
        self.aperture_offset_cm = offset_cm;
        self
    }

    /// Set guide configuration.
    #[must_use]
    pub fn with_guides(mut self, guides: GuideConfig) -> Self {
        self.guides = guides;
        self
    }

    /// Set sample table.
    #[must_use]
    pub fn with_sample_table(mut self, table: SampleTable) -> Self {
        self.sample_table = table;
        self
    }

    /// Set raw detector distance (cm).
    #[must_use]
    pub fn with_detector_distance(mut self, distance_cm: f64) -> Self {
        self.detector_distance_cm = distance_cm;
        self
    }

    /// Set lateral detector offset (cm).
    #[must_use]
    pub fn with_detector_offset(mut self, offset_cm: f64) -> Self {
        self.detector_offset_cm = offset_cm;
        self
    }

    /// Set pixel pitch (cm).
    #[must_use]
    pub fn with_pixel_size(mut self, pixel_size_cm: f64) -> Self {
        self.pixel_size_cm = pixel_size_cm;
        self
    }

    /// Set detector dimensions in pixels.
    #[must_use]
    pub fn with_detector_pixels(mut self, x_pixels: usize, y_pixels: usize) -> Self {
        self.x_pixels = x_pixels;
        self.y_pixels = y_pixels;
        self
    }

    /// Set beamstop diameter (cm).
    #[must_use]
    pub fn with_beamstop(mut self, diameter_cm: f64) -> Self {
        self.beamstop_diameter_cm = diameter_cm;
        self
    }

    /// Rejects settings the instrument cannot realize.
    ///
    /// Derived distances are checked separately by the geometry resolver.
    pub fn validate(&self) -> Result<()> {
        let table = self.table();
        if !is_positive(self.pixel_size_cm) {
            return Err(Error::InvalidPixelSize(self.pixel_size_cm));
        }
        if self.x_pixels == 0 || self.y_pixels == 0 {
            return Err(Error::InvalidDetector {
                x: self.x_pixels,
                y: self.y_pixels,
            });
        }
        if !is_positive(self.wavelength) {
            return Err(Error::WavelengthOutOfRange {
                wavelength: self.wavelength,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        table.check_wavelength(self.wavelength, self.wavelength_spread)?;
        if !within(self.detector_offset_cm, table.max_detector_offset_cm) {
            return Err(Error::DetectorOffsetOutOfRange {
                offset: self.detector_offset_cm,
                max: table.max_detector_offset_cm,
            });
        }
        if let GuideConfig::Guides(n) = self.guides {
            if n > table.max_guides {
                return Err(Error::UnknownGuideConfig(n.to_string()));
            }
        }
        Ok(())
    }
}

/// Which half of the detector a sector or bar selects, split at the
/// beam-center column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DetectorSection {
    /// Both halves.
    #[default]
    Both,
    /// Mirrored half only (`dx < 0`).
    Left,
    /// Forward half only (`dx > 0`).
    Right,
}

impl DetectorSection {
    /// Whether the `dx > 0` half is selected.
    #[must_use]
    pub fn forward(self) -> bool {
        matches!(self, DetectorSection::Both | DetectorSection::Right)
    }

    /// Whether the `dx < 0` half is selected.
    #[must_use]
    pub fn mirrored(self) -> bool {
        matches!(self, DetectorSection::Both | DetectorSection::Left)
    }
}

/// Averaging variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AveragingKind {
    /// Full azimuthal average.
    #[default]
    Circular,
    /// Wedge around the orientation angle.
    Sector,
    /// Ring between two Q values.
    Annular,
    /// Bar along the orientation angle.
    Rectangular,
    /// Full average over ellipse-corrected radii.
    Elliptical,
}

/// Parameters selecting and shaping the averaging policy.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AveragingParams {
    /// Active averaging variant.
    pub kind: AveragingKind,
    /// Orientation angle (degrees, counter-clockwise from +x).
    pub phi_degrees: f64,
    /// Azimuthal half-width of a sector (degrees).
    pub dphi_degrees: f64,
    /// Detector half selection for sector and bar averages.
    pub section: DetectorSection,
    /// Annulus center (1/A).
    pub q_center: f64,
    /// Annulus half-width (1/A).
    pub q_width: f64,
    /// Bar width (pixels).
    pub bar_width_pixels: f64,
    /// Ellipse aspect ratio.
    pub aspect_ratio: f64,
}

impl Default for AveragingParams {
    fn default() -> Self {
        Self {
            kind: AveragingKind::Circular,
            phi_degrees: 0.0,
            dphi_degrees: 10.0,
            section: DetectorSection::Both,
            q_center: 0.01,
            q_width: 0.005,
            bar_width_pixels: 3.0,
            aspect_ratio: 1.0,
        }
    }
}

impl AveragingParams {
    /// Circular average.
    #[must_use]
    pub fn circular() -> Self {
        Self::default()
    }

    /// Sector average around `phi_degrees` with half-width `dphi_degrees`.
    #[must_use]
    pub fn sector(phi_degrees: f64, dphi_degrees: f64, section: DetectorSection) -> Self {
        Self {
            kind: AveragingKind::Sector,
            phi_degrees,
            dphi_degrees,
            section,
            ..Self::default()
        }
    }

    /// Annular average over `[q_center - q_width, q_center + q_width]`.
    #[must_use]
    pub fn annular(q_center: f64, q_width: f64) -> Self {
        Self {
            kind: AveragingKind::Annular,
            q_center,
            q_width,
            ..Self::default()
        }
    }

    /// Bar average of `width_pixels` along `phi_degrees`.
    #[must_use]
    pub fn rectangular(phi_degrees: f64, width_pixels: f64, section: DetectorSection) -> Self {
        Self {
            kind: AveragingKind::Rectangular,
            phi_degrees,
            bar_width_pixels: width_pixels,
            section,
            ..Self::default()
        }
    }

    /// Elliptical average with major axis along `phi_degrees`.
    #[must_use]
    pub fn elliptical(phi_degrees: f64, aspect_ratio: f64) -> Self {
        Self {
            kind: AveragingKind::Elliptical,
            phi_degrees,
            aspect_ratio,
            ..Self::default()
        }
    }

    /// Rejects parameters outside their domain.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            AveragingKind::Sector if !(self.dphi_degrees >= 0.0 && self.dphi_degrees <= 90.0) => {
                Err(Error::InvalidAveraging(format!(
                    "sector half-width {} deg outside [0, 90]",
                    self.dphi_degrees
                )))
            }
            AveragingKind::Annular if self.q_width.is_nan() || self.q_width < 0.0 => {
                Err(Error::InvalidAveraging(format!(
                    "annulus width {} must be non-negative",
                    self.q_width
                )))
            }
            AveragingKind::Rectangular if !is_positive(self.bar_width_pixels) => {
                Err(Error::InvalidAveraging(format!(
                    "bar width {} pixels must be positive",
                    self.bar_width_pixels
                )))
            }
            AveragingKind::Elliptical if !is_positive(self.aspect_ratio) => {
                Err(Error::InvalidAveraging(format!(
                    "aspect ratio {} must be positive",
                    self.aspect_ratio
                )))
            }
            _ => Ok(()),
        }
    }
}

/// False for NaN.
fn is_positive(value: f64) -> bool {
    value > 0.0
}

/// `|value| <= limit`, false for NaN.
fn within(value: f64, limit: f64) -> bool {
    value.abs() <= limit
}
