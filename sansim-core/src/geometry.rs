//! Absolute instrument distances and beam center.

use log::debug;

use crate::config::InstrumentConfig;
use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distances and beam center derived from an [`InstrumentConfig`].
///
/// Recomputed for every calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DerivedGeometry {
    /// Source aperture to sample aperture distance (cm).
    pub ssd_cm: f64,
    /// Sample to detector distance (cm), sample-table corrected.
    pub sdd_cm: f64,
    /// Beam center x in 1-based pixel coordinates.
    pub beam_center_x: f64,
    /// Beam center y in 1-based pixel coordinates.
    pub beam_center_y: f64,
}

/// Derives [`DerivedGeometry`] from the configuration and instrument tables.
///
/// Fails with [`Error::InvalidGeometry`] if either distance is not positive.
pub fn resolve_geometry(config: &InstrumentConfig) -> Result<DerivedGeometry> {
    config.validate()?;
    let table = config.table();
    let table_offset = table.sample_table_offset(config.sample_table);

    let sdd_cm = config.detector_distance_cm + table_offset;
    let ssd_cm = table.ssd_formula.guide_term(config.guides.guide_count())
        - table_offset
        - config.aperture_offset_cm;

    if !(ssd_cm > 0.0 && sdd_cm > 0.0) {
        return Err(Error::InvalidGeometry {
            ssd: ssd_cm,
            sdd: sdd_cm,
        });
    }

    let geometry = DerivedGeometry {
        ssd_cm,
        sdd_cm,
        beam_center_x: beam_center_x(config),
        beam_center_y: beam_center_y(config),
    };
    debug!(
        "{}: SSD = {:.1} cm, SDD = {:.1} cm, beam center = ({:.2}, {:.2})",
        config.instrument,
        geometry.ssd_cm,
        geometry.sdd_cm,
        geometry.beam_center_x,
        geometry.beam_center_y
    );
    Ok(geometry)
}

#[allow(clippy::cast_precision_loss)]
fn beam_center_x(config: &InstrumentConfig) -> f64 {
    config.detector_offset_cm / config.pixel_size_cm + (config.x_pixels as f64 / 2.0 + 0.5)
}

// Vertical offset is not adjustable.
#[allow(clippy::cast_precision_loss)]
fn beam_center_y(config: &InstrumentConfig) -> f64 {
    config.y_pixels as f64 / 2.0 + 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{GuideConfig, Instrument, SampleTable};
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_guide_geometry() {
        let geometry = resolve_geometry(&InstrumentConfig::default()).unwrap();
        assert_relative_eq!(geometry.ssd_cm, 1627.0);
        assert_relative_eq!(geometry.sdd_cm, 100.0);
        assert_relative_eq!(geometry.beam_center_x, 64.5);
        assert_relative_eq!(geometry.beam_center_y, 64.5);
    }

    #[test]
    fn test_guides_shorten_collimation() {
        let config = InstrumentConfig::default().with_guides(GuideConfig::Guides(3));
        let geometry = resolve_geometry(&config).unwrap();
        assert_relative_eq!(geometry.ssd_cm, 1632.0 - 3.0 * 155.0 - 5.0);
    }

    #[test]
    fn test_stepwise_family_deducts_once() {
        let base = InstrumentConfig::from_instrument(Instrument::Ngb30);
        let zero = resolve_geometry(&base).unwrap();
        let one = resolve_geometry(&base.clone().with_guides(GuideConfig::Guides(1))).unwrap();
        let two = resolve_geometry(&base.with_guides(GuideConfig::Guides(2))).unwrap();
        assert_relative_eq!(zero.ssd_cm - one.ssd_cm, 155.0 + 61.9, epsilon = 1e-9);
        assert_relative_eq!(one.ssd_cm - two.ssd_cm, 155.0, epsilon = 1e-9);
    }

    #[test]
    fn test_lens_uses_full_collimation() {
        let config = InstrumentConfig::default().with_guides(GuideConfig::Lens);
        let geometry = resolve_geometry(&config).unwrap();
        assert_relative_eq!(geometry.ssd_cm, 1627.0);
    }

    #[test]
    fn test_sample_table_moves_sample_upstream() {
        let config = InstrumentConfig::default().with_sample_table(SampleTable::Huber);
        let geometry = resolve_geometry(&config).unwrap();
        assert_relative_eq!(geometry.sdd_cm, 154.8, epsilon = 1e-9);
        assert_relative_eq!(geometry.ssd_cm, 1627.0 - 54.8, epsilon = 1e-9);
    }

    #[test]
    fn test_detector_offset_shifts_beam_center() {
        let config = InstrumentConfig::default().with_detector_offset(5.08);
        let geometry = resolve_geometry(&config).unwrap();
        assert_relative_eq!(geometry.beam_center_x, 74.5, epsilon = 1e-9);
        assert_relative_eq!(geometry.beam_center_y, 64.5);
    }

    #[test]
    fn test_non_positive_distance_rejected() {
        let config = InstrumentConfig::default().with_detector_distance(-10.0);
        assert!(matches!(
            resolve_geometry(&config),
            Err(Error::InvalidGeometry { .. })
        ));

        let config = InstrumentConfig::default().with_aperture_offset(2000.0);
        let err = resolve_geometry(&config).unwrap_err();
        assert!(err.is_configuration());
    }
}
