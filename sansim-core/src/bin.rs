//! Reduced 1D Q bins.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Standard deviation reported for bins with fewer than two cells.
///
/// Marks the bin as statistically unusable; it is not an uncertainty.
pub const LOW_STATISTICS_SIGMA: f64 = 1.0e6;

/// One Q bin of a reduced data set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QBin {
    /// 0-based bin index.
    pub index: usize,
    /// Nominal Q at the bin center (1/A).
    pub q: f64,
    /// Mean intensity over the bin.
    pub intensity: f64,
    /// Fractional number of pixel cells summed.
    pub cells: f64,
    /// Cell-weighted sum of squared intensities.
    pub sum_sq: f64,
    /// Standard deviation of the mean intensity.
    pub sigma_intensity: f64,
    /// Resolution-corrected mean Q (1/A).
    pub q_mean: f64,
    /// Q resolution, one standard deviation (1/A).
    pub sigma_q: f64,
    /// Fraction of the beam not shadowed by the beamstop.
    pub transmission: f64,
}

impl QBin {
    /// Returns false for bins whose sigma is the low-statistics marker.
    #[must_use]
    pub fn has_statistics(&self) -> bool {
        self.cells > 1.0 && self.sigma_intensity < LOW_STATISTICS_SIGMA
    }
}
