//! Pixel accumulation into Q bins.
//!
//! Pixels close to the beam center are split into `n x n` sub-pixels so
//! that the steep low-Q bins are sampled finely; every other pixel counts
//! once. Bins are filled with intensity, squared intensity and a fractional
//! cell count, then reduced to a mean and its standard deviation.
#![allow(clippy::cast_precision_loss)]

use log::debug;
use rayon::prelude::*;

use sansim_core::bin::LOW_STATISTICS_SIGMA;
use sansim_core::grid::PixelGrid;
use sansim_core::qmap::{q_from_distance, QMapper};

use crate::averaging::{AveragingPolicy, CellPosition};

/// Accumulator settings.
#[derive(Clone, Debug, PartialEq)]
pub struct AccumulatorConfig {
    /// Pixels closer than this to the beam center are subdivided (mm).
    pub subdivision_radius_mm: f64,
    /// Sub-pixels per side for subdivided pixels.
    pub subdivisions: usize,
    /// Sweep detector columns in parallel.
    pub parallel: bool,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            subdivision_radius_mm: 100.0,
            subdivisions: 3,
            parallel: true,
        }
    }
}

impl AccumulatorConfig {
    /// Set the subdivision radius (mm).
    #[must_use]
    pub fn with_subdivision_radius(mut self, radius_mm: f64) -> Self {
        self.subdivision_radius_mm = radius_mm;
        self
    }

    /// Set sub-pixels per side.
    #[must_use]
    pub fn with_subdivisions(mut self, n: usize) -> Self {
        self.subdivisions = n.max(1);
        self
    }

    /// Set whether to use parallel processing.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Running sums per bin, indexed by `bin_number - 1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinSums {
    /// Cell-weighted intensity sums.
    pub sum: Vec<f64>,
    /// Cell-weighted squared-intensity sums.
    pub sum_sq: Vec<f64>,
    /// Fractional cell counts.
    pub cells: Vec<f64>,
}

impl BinSums {
    fn ensure(&mut self, len: usize) {
        if self.sum.len() < len {
            self.sum.resize(len, 0.0);
            self.sum_sq.resize(len, 0.0);
            self.cells.resize(len, 0.0);
        }
    }

    /// Adds `weight` cells of `intensity` to a 1-based bin.
    pub fn add(&mut self, bin_number: usize, intensity: f64, weight: f64) {
        self.ensure(bin_number);
        let k = bin_number - 1;
        self.sum[k] += intensity * weight;
        self.sum_sq[k] += intensity * intensity * weight;
        self.cells[k] += weight;
    }

    /// Merges partial sums from another sweep.
    #[must_use]
    pub fn merge(mut self, other: BinSums) -> Self {
        self.ensure(other.sum.len());
        for k in 0..other.sum.len() {
            self.sum[k] += other.sum[k];
            self.sum_sq[k] += other.sum_sq[k];
            self.cells[k] += other.cells[k];
        }
        self
    }

    /// Number of bins touched so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sum.len()
    }

    /// Returns true if no cell was accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }
}

/// Per-bin statistics, all vectors aligned by bin index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinStatistics {
    /// Nominal Q at each bin center (1/A).
    pub q: Vec<f64>,
    /// Mean intensity.
    pub intensity: Vec<f64>,
    /// Standard deviation of the mean, or [`LOW_STATISTICS_SIGMA`].
    pub sigma: Vec<f64>,
    /// Fractional cell counts.
    pub cells: Vec<f64>,
    /// Cell-weighted squared-intensity sums.
    pub sum_sq: Vec<f64>,
    /// Highest populated 0-based bin index, `None` if nothing was binned.
    pub max_bin: Option<usize>,
}

impl BinStatistics {
    /// Number of bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.q.len()
    }

    /// Returns true if no bin exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}

/// Bins a detector image under one averaging policy.
#[derive(Debug, Clone)]
pub struct PixelAccumulator<'a> {
    mapper: &'a QMapper,
    policy: &'a AveragingPolicy,
    config: AccumulatorConfig,
}

impl<'a> PixelAccumulator<'a> {
    /// Creates an accumulator.
    #[must_use]
    pub fn new(
        mapper: &'a QMapper,
        policy: &'a AveragingPolicy,
        config: AccumulatorConfig,
    ) -> Self {
        Self {
            mapper,
            policy,
            config,
        }
    }

    /// Sweeps the grid and returns per-bin statistics.
    #[must_use]
    pub fn accumulate(&self, grid: &PixelGrid) -> BinStatistics {
        let sums = self.sweep(grid);
        let stats = self.finish(&sums);
        debug!(
            "{:?} average: {} bins from {} usable pixels",
            self.policy.kind(),
            stats.len(),
            grid.usable_count()
        );
        stats
    }

    /// Raw bin sums for the grid.
    #[must_use]
    pub fn sweep(&self, grid: &PixelGrid) -> BinSums {
        let (nx, _) = grid.dim();
        if self.config.parallel {
            (0..nx)
                .into_par_iter()
                .fold(BinSums::default, |acc, i| self.sweep_column(grid, i, acc))
                .reduce(BinSums::default, BinSums::merge)
        } else {
            (0..nx).fold(BinSums::default(), |acc, i| self.sweep_column(grid, i, acc))
        }
    }

    fn sweep_column(&self, grid: &PixelGrid, i: usize, mut acc: BinSums) -> BinSums {
        let (_, ny) = grid.dim();
        let bin_width = self.mapper.pixel_size_cm();
        let x = (i + 1) as f64;
        for j in 0..ny {
            if !grid.is_usable(i, j) {
                continue;
            }
            let value = grid.intensity()[[i, j]];
            let y = (j + 1) as f64;
            let center_mm = 10.0 * self.mapper.x_offset(x).hypot(self.mapper.y_offset(y));
            let n = if center_mm < self.config.subdivision_radius_mm {
                self.config.subdivisions.max(1)
            } else {
                1
            };
            let weight = 1.0 / (n * n) as f64;
            for a in 0..n {
                let sx = sub_coordinate(x, a, n);
                let dx = self.mapper.x_offset(sx);
                for b in 0..n {
                    let sy = sub_coordinate(y, b, n);
                    let cell = CellPosition::new(self.mapper, dx, self.mapper.y_offset(sy));
                    if !self.policy.includes(&cell) {
                        continue;
                    }
                    acc.add(self.policy.bin_number(&cell, bin_width), value, weight);
                }
            }
        }
        acc
    }

    /// Reduces bin sums to means and standard deviations.
    #[must_use]
    pub fn finish(&self, sums: &BinSums) -> BinStatistics {
        let bin_width = self.mapper.pixel_size_cm();
        let max_bin = sums.cells.iter().rposition(|&c| c > 0.0);
        let len = max_bin.map_or(0, |k| k + 1);

        let mut stats = BinStatistics {
            q: Vec::with_capacity(len),
            intensity: Vec::with_capacity(len),
            sigma: Vec::with_capacity(len),
            cells: sums.cells[..len].to_vec(),
            sum_sq: sums.sum_sq[..len].to_vec(),
            max_bin,
        };
        for k in 0..len {
            let radius = (k as f64 + 0.5) * bin_width;
            stats.q.push(q_from_distance(
                radius,
                self.mapper.sdd_cm(),
                self.mapper.wavelength(),
            ));
            let (mean, sigma) = bin_moments(sums.sum[k], sums.sum_sq[k], sums.cells[k]);
            stats.intensity.push(mean);
            stats.sigma.push(sigma);
        }
        stats
    }
}

/// Center of sub-pixel `k` of `n` within the pixel at coordinate `c`.
#[inline]
fn sub_coordinate(c: f64, k: usize, n: usize) -> f64 {
    c - 0.5 + (k as f64 + 0.5) / n as f64
}

/// Mean and standard deviation of the mean for one bin.
///
/// Bins with at most one cell get [`LOW_STATISTICS_SIGMA`].
#[must_use]
pub fn bin_moments(sum: f64, sum_sq: f64, cells: f64) -> (f64, f64) {
    if cells > 1.0 {
        let mean = sum / cells;
        let variance = sum_sq / cells - mean * mean;
        (mean, (variance.max(0.0) / (cells - 1.0)).sqrt())
    } else if cells <= 0.0 || cells.is_nan() {
        (0.0, LOW_STATISTICS_SIGMA)
    } else {
        (sum / cells, LOW_STATISTICS_SIGMA)
    }
}
