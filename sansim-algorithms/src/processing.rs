//! Calculation pipeline.
//!
//! A [`CalculationContext`] owns everything derived from one configuration:
//! geometry, Q mapping, averaging policy and resolution terms. Nothing is
//! shared between contexts, so independent scenarios run in parallel.

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

use sansim_core::bin::QBin;
use sansim_core::config::{AveragingKind, AveragingParams, InstrumentConfig};
use sansim_core::geometry::{resolve_geometry, DerivedGeometry};
use sansim_core::grid::PixelGrid;
use sansim_core::model::{
    apply_transmission, sample_checked, sanitize, ModelRequest, ModelSampler,
};
use sansim_core::qmap::{QMap, QMapper};
use sansim_core::{Error, Result};

use crate::accumulator::{AccumulatorConfig, PixelAccumulator};
use crate::averaging::{AveragingPolicy, DetectorFrame};
use crate::overlay::{overlay, OverlayShape};
use crate::resolution::{IncompleteGamma, ResolutionEngine, ResolutionParams};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One instrument setting plus the averaging to apply.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Scenario {
    /// Instrument settings.
    pub config: InstrumentConfig,
    /// Averaging policy parameters.
    pub averaging: AveragingParams,
}

impl Scenario {
    /// Creates a scenario.
    #[must_use]
    pub fn new(config: InstrumentConfig, averaging: AveragingParams) -> Self {
        Self { config, averaging }
    }
}

/// Scattering-law model to sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelSpec {
    /// Model identifier understood by the sampler.
    pub name: String,
    /// Model parameters.
    pub params: Vec<f64>,
}

impl ModelSpec {
    /// Creates a model specification.
    #[must_use]
    pub fn new(name: impl Into<String>, params: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Pipeline options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationOptions {
    /// Pixel accumulation settings.
    pub accumulator: AccumulatorConfig,
    /// Incomplete-gamma evaluation in the resolution engine.
    pub incomplete_gamma: IncompleteGamma,
    /// Exclude pixels behind the projected beamstop from the average.
    pub mask_beamstop: bool,
}

impl SimulationOptions {
    /// Set accumulator settings.
    #[must_use]
    pub fn with_accumulator(mut self, accumulator: AccumulatorConfig) -> Self {
        self.accumulator = accumulator;
        self
    }

    /// Set incomplete-gamma mode.
    #[must_use]
    pub fn with_incomplete_gamma(mut self, mode: IncompleteGamma) -> Self {
        self.incomplete_gamma = mode;
        self
    }

    /// Set beamstop masking.
    #[must_use]
    pub fn with_beamstop_mask(mut self, mask: bool) -> Self {
        self.mask_beamstop = mask;
        self
    }
}

/// Q interval covered by a reduction (1/A).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QRange {
    /// Q of the first populated bin.
    pub q_min: f64,
    /// Largest |Q| at a detector corner.
    pub q_max: f64,
}

/// Result of one calculation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReducedData {
    /// Averaging variant used.
    pub averaging: AveragingKind,
    /// Derived instrument geometry.
    pub geometry: DerivedGeometry,
    /// Bins `0..=max_bin`, contiguous.
    pub bins: Vec<QBin>,
    /// Highest populated bin, `None` if no cell was binned.
    pub max_bin: Option<usize>,
    /// Q coverage.
    pub q_range: QRange,
    /// Transmission-corrected model intensity per bin, if a model was sampled.
    pub model: Option<Vec<f64>>,
}

impl ReducedData {
    /// Nominal Q per bin.
    #[must_use]
    pub fn q(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.q).collect()
    }

    /// Mean intensity per bin.
    #[must_use]
    pub fn intensity(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.intensity).collect()
    }

    /// Transmission per bin.
    #[must_use]
    pub fn transmission(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.transmission).collect()
    }

    /// Bins that received at least one cell.
    pub fn populated(&self) -> impl Iterator<Item = &QBin> {
        self.bins.iter().filter(|b| b.cells > 0.0)
    }
}

/// Everything derived from one scenario.
#[derive(Debug, Clone)]
pub struct CalculationContext {
    config: InstrumentConfig,
    geometry: DerivedGeometry,
    mapper: QMapper,
    qmap: QMap,
    policy: AveragingPolicy,
    frame: DetectorFrame,
    resolution: ResolutionEngine,
    options: SimulationOptions,
}

impl CalculationContext {
    /// Resolves geometry, Q map, policy and resolution terms.
    ///
    /// Configuration errors surface here, before any pixel is processed.
    pub fn new(scenario: &Scenario, options: &SimulationOptions) -> Result<Self> {
        let config = scenario.config.clone();
        let geometry = resolve_geometry(&config)?;
        let mapper = QMapper::new(&config, &geometry);
        let policy = AveragingPolicy::from_params(&scenario.averaging, config.pixel_size_cm)?;
        let qmap = mapper.map(config.x_pixels, config.y_pixels);
        let frame = DetectorFrame::new(&qmap);
        let resolution = ResolutionEngine::new(
            ResolutionParams::from_config(&config, &geometry)
                .with_incomplete_gamma(options.incomplete_gamma),
        );
        debug!(
            "context: {:?} average, q_max = {:.4} 1/A, beamstop radius {:.2} cm on detector",
            policy.kind(),
            qmap.q_max(),
            resolution.beamstop_radius_cm()
        );
        Ok(Self {
            config,
            geometry,
            mapper,
            qmap,
            policy,
            frame,
            resolution,
            options: options.clone(),
        })
    }

    /// Instrument settings.
    #[must_use]
    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    /// Derived geometry.
    #[must_use]
    pub fn geometry(&self) -> &DerivedGeometry {
        &self.geometry
    }

    /// Pixel to Q mapping.
    #[must_use]
    pub fn mapper(&self) -> &QMapper {
        &self.mapper
    }

    /// Q over the detector.
    #[must_use]
    pub fn qmap(&self) -> &QMap {
        &self.qmap
    }

    /// Active averaging policy.
    #[must_use]
    pub fn policy(&self) -> &AveragingPolicy {
        &self.policy
    }

    /// Resolution engine.
    #[must_use]
    pub fn resolution(&self) -> &ResolutionEngine {
        &self.resolution
    }

    /// Boundary of the averaging region in Q space.
    #[must_use]
    pub fn overlay(&self) -> Vec<OverlayShape> {
        overlay(
            &self.policy,
            &self.frame,
            self.mapper.sdd_cm(),
            self.config.wavelength,
        )
    }

    /// Projected beamstop radius in pixels.
    #[must_use]
    pub fn beamstop_radius_pixels(&self) -> f64 {
        self.resolution.beamstop_radius_cm() / self.config.pixel_size_cm
    }

    /// Applies the beamstop mask if enabled.
    fn prepare(&self, grid: PixelGrid) -> PixelGrid {
        if self.options.mask_beamstop {
            grid.with_disk_mask(self.mapper.beam_center(), self.beamstop_radius_pixels())
        } else {
            grid
        }
    }

    /// Averages a detector image into Q bins and attaches resolution.
    pub fn reduce(&self, grid: &PixelGrid) -> Result<ReducedData> {
        let expected = (self.config.x_pixels, self.config.y_pixels);
        if grid.dim() != expected {
            return Err(Error::GridShapeMismatch {
                expected,
                actual: grid.dim(),
            });
        }
        let grid = self.prepare(grid.clone());
        let accumulator =
            PixelAccumulator::new(&self.mapper, &self.policy, self.options.accumulator.clone());
        let stats = accumulator.accumulate(&grid);
        let resolution = self.resolution.evaluate_all(&stats.q);

        let bins: Vec<QBin> = resolution
            .iter()
            .enumerate()
            .map(|(k, r)| QBin {
                index: k,
                q: stats.q[k],
                intensity: stats.intensity[k],
                cells: stats.cells[k],
                sum_sq: stats.sum_sq[k],
                sigma_intensity: stats.sigma[k],
                q_mean: r.q_mean,
                sigma_q: r.sigma_q,
                transmission: r.transmission,
            })
            .collect();

        let q_min = bins.iter().find(|b| b.cells > 0.0).map_or(0.0, |b| b.q);
        Ok(ReducedData {
            averaging: self.policy.kind(),
            geometry: self.geometry,
            bins,
            max_bin: stats.max_bin,
            q_range: QRange {
                q_min,
                q_max: self.frame.q_extent(),
            },
            model: None,
        })
    }

    /// Samples the model over the detector axes and returns the image.
    ///
    /// Pixels where the sampler returned a non-finite value carry the
    /// sentinel and are masked.
    pub fn model_detector_image<S: ModelSampler + ?Sized>(
        &self,
        sampler: &S,
        model: &ModelSpec,
    ) -> Result<PixelGrid> {
        let request = ModelRequest::two_d(
            model.name.clone(),
            model.params.clone(),
            self.qmap.qx.clone(),
            self.qmap.qy.clone(),
        );
        let raw = sample_checked(sampler, &request)?;
        let finite: Vec<bool> = raw.iter().map(|v| v.is_finite()).collect();
        let dim = (self.qmap.qx.len(), self.qmap.qy.len());
        let intensity = Array2::from_shape_vec(dim, sanitize(&raw)).map_err(|_| {
            Error::GridShapeMismatch {
                expected: dim,
                actual: (raw.len(), 1),
            }
        })?;
        let ny = dim.1;
        Ok(PixelGrid::from_intensity(intensity).with_mask_fn(|i, j| !finite[i * ny + j]))
    }

    /// Samples the model at the bin Q values, times transmission.
    pub fn model_intensity<S: ModelSampler + ?Sized>(
        &self,
        sampler: &S,
        model: &ModelSpec,
        data: &ReducedData,
    ) -> Result<Vec<f64>> {
        let request = ModelRequest::one_d(model.name.clone(), model.params.clone(), data.q());
        let raw = sample_checked(sampler, &request)?;
        Ok(apply_transmission(&raw, &data.transmission()))
    }

    /// Simulates the detector image from the model, reduces it, and
    /// attaches the transmission-corrected 1D model curve.
    pub fn simulate<S: ModelSampler + ?Sized>(
        &self,
        sampler: &S,
        model: &ModelSpec,
    ) -> Result<ReducedData> {
        let image = self.model_detector_image(sampler, model)?;
        let mut data = self.reduce(&image)?;
        data.model = Some(self.model_intensity(sampler, model, &data)?);
        Ok(data)
    }
}

/// Reduces a detector image for one scenario.
pub fn reduce(
    scenario: &Scenario,
    grid: &PixelGrid,
    options: &SimulationOptions,
) -> Result<ReducedData> {
    CalculationContext::new(scenario, options)?.reduce(grid)
}

/// Runs the full model simulation for one scenario.
pub fn simulate<S: ModelSampler + ?Sized>(
    scenario: &Scenario,
    sampler: &S,
    model: &ModelSpec,
    options: &SimulationOptions,
) -> Result<ReducedData> {
    CalculationContext::new(scenario, options)?.simulate(sampler, model)
}

/// Runs independent scenarios in parallel; results keep input order.
pub fn simulate_many<S: ModelSampler + ?Sized>(
    scenarios: &[Scenario],
    sampler: &S,
    model: &ModelSpec,
    options: &SimulationOptions,
) -> Vec<Result<ReducedData>> {
    info!("simulating {} scenarios", scenarios.len());
    scenarios
        .par_iter()
        .map(|scenario| simulate(scenario, sampler, model, options))
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp, clippy::cast_precision_loss)]
    use super::*;
    use approx::assert_relative_eq;
    use sansim_core::error::ExternalServiceError;
    use sansim_core::model::{QValues, NAN_SENTINEL};

    fn flat(req: &ModelRequest) -> std::result::Result<Vec<f64>, ExternalServiceError> {
        Ok(vec![1.0; req.expected_len()])
    }

    #[test]
    fn test_context_rejects_bad_config() {
        let scenario = Scenario::new(
            InstrumentConfig::default().with_pixel_size(-1.0),
            AveragingParams::circular(),
        );
        let err = CalculationContext::new(&scenario, &SimulationOptions::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_reduce_rejects_wrong_grid() {
        let ctx = CalculationContext::new(&Scenario::default(), &SimulationOptions::default())
            .unwrap();
        let err = ctx.reduce(&PixelGrid::filled(64, 64, 1.0)).unwrap_err();
        assert!(matches!(err, Error::GridShapeMismatch { .. }));
    }

    #[test]
    fn test_simulate_flat_model() {
        let ctx = CalculationContext::new(&Scenario::default(), &SimulationOptions::default())
            .unwrap();
        let data = ctx.simulate(&flat, &ModelSpec::new("flat", vec![])).unwrap();
        let model = data.model.as_ref().unwrap();
        assert_eq!(model.len(), data.bins.len());
        for (bin, m) in data.bins.iter().zip(model) {
            assert_relative_eq!(*m, bin.transmission);
        }
        for bin in data.populated() {
            assert_relative_eq!(bin.intensity, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_non_finite_pixels_are_masked() {
        let ctx = CalculationContext::new(&Scenario::default(), &SimulationOptions::default())
            .unwrap();
        let sampler = |req: &ModelRequest| {
            let mut out = vec![2.0; req.expected_len()];
            if let QValues::TwoD { .. } = req.q {
                out[0] = f64::NAN;
            }
            Ok::<_, ExternalServiceError>(out)
        };
        let image = ctx
            .model_detector_image(&sampler, &ModelSpec::new("m", vec![]))
            .unwrap();
        assert_eq!(image.intensity()[[0, 0]].to_bits(), NAN_SENTINEL.to_bits());
        assert!(!image.is_usable(0, 0));
        assert_eq!(image.usable_count(), 128 * 128 - 1);
    }

    #[test]
    fn test_sampler_failure_propagates() {
        let ctx = CalculationContext::new(&Scenario::default(), &SimulationOptions::default())
            .unwrap();
        let down = |_: &ModelRequest| {
            Err::<Vec<f64>, _>(ExternalServiceError::Unreachable("connection refused".into()))
        };
        let err = ctx.simulate(&down, &ModelSpec::new("m", vec![])).unwrap_err();
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_beamstop_mask_removes_low_bins() {
        let options = SimulationOptions::default().with_beamstop_mask(true);
        let ctx = CalculationContext::new(&Scenario::default(), &options).unwrap();
        let data = ctx.reduce(&PixelGrid::filled(128, 128, 1.0)).unwrap();
        assert!(data.bins[0].cells == 0.0);
        let first = data.populated().next().unwrap();
        assert!(first.index as f64 >= ctx.beamstop_radius_pixels() - 2.0);
    }

    #[test]
    fn test_simulate_many_keeps_order() {
        let scenarios: Vec<Scenario> = [100.0, 400.0, 1000.0]
            .iter()
            .map(|&d| {
                Scenario::new(
                    InstrumentConfig::default().with_detector_distance(d),
                    AveragingParams::circular(),
                )
            })
            .collect();
        let results = simulate_many(
            &scenarios,
            &flat,
            &ModelSpec::new("flat", vec![]),
            &SimulationOptions::default(),
        );
        assert_eq!(results.len(), 3);
        let q_max: Vec<f64> = results
            .iter()
            .map(|r| r.as_ref().unwrap().q_range.q_max)
            .collect();
        assert!(q_max[0] > q_max[1] && q_max[1] > q_max[2]);
    }
}
