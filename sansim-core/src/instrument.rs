//! Static per-instrument constant tables.
//!
//! Every instrument-specific number lives here as data. Code selects a table
//! through [`Instrument`] and never branches on instrument names.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Supported SANS instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Instrument {
    /// 30 m SANS on NG7.
    #[default]
    Ng7,
    /// 30 m SANS on NGB.
    Ngb30,
}

impl Instrument {
    /// All instruments with a constant table.
    pub const ALL: [Instrument; 2] = [Instrument::Ng7, Instrument::Ngb30];

    /// Returns the constant table for this instrument.
    #[must_use]
    pub fn table(self) -> &'static InstrumentTable {
        match self {
            Instrument::Ng7 => &NG7,
            Instrument::Ngb30 => &NGB30,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table().name)
    }
}

impl FromStr for Instrument {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Instrument::ALL
            .into_iter()
            .find(|inst| inst.table().name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownInstrument(s.to_string()))
    }
}

/// Source-to-sample distance formula family.
///
/// Distances in cm. Both families subtract the sample-table and aperture
/// offsets after the guide term.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SsdFormula {
    /// `source_distance - guide_spacing * guides`.
    Linear {
        source_distance: f64,
        guide_spacing: f64,
    },
    /// As `Linear`, with an additional `guide_deduction` once any guide is in.
    Stepwise {
        source_distance: f64,
        guide_spacing: f64,
        guide_deduction: f64,
    },
}

impl SsdFormula {
    /// Distance from the source aperture to the nominal sample position.
    #[must_use]
    pub fn guide_term(&self, guides: u8) -> f64 {
        match *self {
            SsdFormula::Linear {
                source_distance,
                guide_spacing,
            } => source_distance - guide_spacing * f64::from(guides),
            SsdFormula::Stepwise {
                source_distance,
                guide_spacing,
                guide_deduction,
            } => {
                let step = if guides > 0 { guide_deduction } else { 0.0 };
                source_distance - guide_spacing * f64::from(guides) - step
            }
        }
    }
}

/// Allowed wavelength band for one velocity-selector spread setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavelengthBand {
    /// Wavelength spread, FWHM in percent.
    pub spread_percent: f64,
    /// Shortest wavelength (A).
    pub min: f64,
    /// Longest wavelength (A).
    pub max: f64,
}

/// Read-only constants describing one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentTable {
    /// Display name, also the parse key.
    pub name: &'static str,
    /// Detector pixel pitch (cm).
    pub pixel_size_cm: f64,
    /// Detector pixels along x.
    pub x_pixels: usize,
    /// Detector pixels along y.
    pub y_pixels: usize,
    /// Largest lateral detector offset either side of the beam (cm).
    pub max_detector_offset_cm: f64,
    /// Detector carriage travel (cm).
    pub detector_distance_range_cm: (f64, f64),
    /// Sample aperture to nominal sample position (cm).
    pub aperture_offset_cm: f64,
    /// Maximum number of guides.
    pub max_guides: u8,
    /// Source-to-sample distance family.
    pub ssd_formula: SsdFormula,
    /// Sample-table offsets (cm), indexed by [`SampleTable`].
    pub sample_table_offsets_cm: [f64; 2],
    /// Available beamstop diameters (cm).
    pub beamstop_diameters_cm: &'static [f64],
    /// Source aperture diameters (cm) available with zero guides.
    pub source_apertures_cm: &'static [f64],
    /// Velocity selector settings.
    pub wavelength_bands: &'static [WavelengthBand],
    /// Transmission per guide section.
    pub guide_transmission: f64,
}

impl InstrumentTable {
    /// Finds the wavelength band for a spread setting.
    pub fn band(&self, spread_percent: f64) -> Result<&WavelengthBand> {
        self.wavelength_bands
            .iter()
            .find(|band| (band.spread_percent - spread_percent).abs() < 0.05)
            .ok_or(Error::UnsupportedWavelengthSpread(spread_percent))
    }

    /// Checks a wavelength/spread pair against the selector bands.
    pub fn check_wavelength(&self, wavelength: f64, spread_percent: f64) -> Result<()> {
        let band = self.band(spread_percent)?;
        if wavelength < band.min || wavelength > band.max {
            return Err(Error::WavelengthOutOfRange {
                wavelength,
                min: band.min,
                max: band.max,
            });
        }
        Ok(())
    }

    /// Sample-table offset (cm).
    #[must_use]
    pub fn sample_table_offset(&self, table: SampleTable) -> f64 {
        self.sample_table_offsets_cm[table as usize]
    }

    /// Fraction of beam surviving the guides.
    #[must_use]
    pub fn guide_loss(&self, guides: u8) -> f64 {
        self.guide_transmission.powi(i32::from(guides))
    }
}

const BEAMSTOPS_CM: &[f64] = &[2.54, 5.08, 7.62, 10.16];

static NG7: InstrumentTable = InstrumentTable {
    name: "NG7",
    pixel_size_cm: 0.508,
    x_pixels: 128,
    y_pixels: 128,
    max_detector_offset_cm: 25.0,
    detector_distance_range_cm: (100.0, 1530.0),
    aperture_offset_cm: 5.0,
    max_guides: 8,
    ssd_formula: SsdFormula::Linear {
        source_distance: 1632.0,
        guide_spacing: 155.0,
    },
    sample_table_offsets_cm: [0.0, 54.8],
    beamstop_diameters_cm: BEAMSTOPS_CM,
    source_apertures_cm: &[1.43, 2.54, 3.81],
    wavelength_bands: &[
        WavelengthBand {
            spread_percent: 11.5,
            min: 4.0,
            max: 20.0,
        },
        WavelengthBand {
            spread_percent: 13.9,
            min: 4.0,
            max: 20.0,
        },
        WavelengthBand {
            spread_percent: 22.1,
            min: 4.0,
            max: 20.0,
        },
    ],
    guide_transmission: 0.974,
};

static NGB30: InstrumentTable = InstrumentTable {
    name: "NGB30",
    pixel_size_cm: 0.508,
    x_pixels: 128,
    y_pixels: 128,
    max_detector_offset_cm: 25.0,
    detector_distance_range_cm: (133.0, 1317.0),
    aperture_offset_cm: 5.0,
    max_guides: 8,
    ssd_formula: SsdFormula::Stepwise {
        source_distance: 1632.0,
        guide_spacing: 155.0,
        guide_deduction: 61.9,
    },
    sample_table_offsets_cm: [0.0, 54.8],
    beamstop_diameters_cm: BEAMSTOPS_CM,
    source_apertures_cm: &[1.43, 2.22, 3.81],
    wavelength_bands: &[
        WavelengthBand {
            spread_percent: 9.0,
            min: 5.0,
            max: 20.0,
        },
        WavelengthBand {
            spread_percent: 11.5,
            min: 4.5,
            max: 20.0,
        },
        WavelengthBand {
            spread_percent: 13.0,
            min: 4.5,
            max: 20.0,
        },
    ],
    guide_transmission: 0.974,
};

/// Sample table position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SampleTable {
    /// Standard sample chamber.
    #[default]
    Chamber = 0,
    /// Huber goniometer table, upstream of the chamber.
    Huber = 1,
}

impl FromStr for SampleTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CHAMBER" => Ok(SampleTable::Chamber),
            "HUBER" => Ok(SampleTable::Huber),
            _ => Err(Error::UnknownSampleTable(s.to_string())),
        }
    }
}

/// Number of neutron-guide sections, or refractive focusing lenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GuideConfig {
    /// Pinhole collimation with this many guides in the beam.
    Guides(u8),
    /// Focusing lenses; collimation length is that of zero guides.
    Lens,
}

impl Default for GuideConfig {
    fn default() -> Self {
        GuideConfig::Guides(0)
    }
}

impl GuideConfig {
    /// Guide count used for the source-to-sample distance.
    #[must_use]
    pub fn guide_count(self) -> u8 {
        match self {
            GuideConfig::Guides(n) => n,
            GuideConfig::Lens => 0,
        }
    }

    /// Returns true in focusing mode.
    #[must_use]
    pub fn is_lens(self) -> bool {
        matches!(self, GuideConfig::Lens)
    }
}

impl FromStr for GuideConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("LENS") {
            return Ok(GuideConfig::Lens);
        }
        s.parse::<u8>()
            .map(GuideConfig::Guides)
            .map_err(|_| Error::UnknownGuideConfig(s.to_string()))
    }
}

impl fmt::Display for GuideConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuideConfig::Guides(n) => write!(f, "{n}"),
            GuideConfig::Lens => f.write_str("LENS"),
        }
    }
}
