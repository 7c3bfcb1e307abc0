//! sansim-algorithms: Averaging, accumulation and resolution for SANS simulation.
//!
//! This crate provides the numerical half of the simulator:
//! - **Averaging policies** - circular, sector, annular, rectangular and
//!   elliptical selection of detector cells, with Q-space overlays
//! - **Pixel accumulation** - sub-pixel binning with per-bin statistics
//! - **Resolution** - per-bin Q resolution and beamstop transmission
//! - **Pipeline** - [`CalculationContext`] and the `simulate` entry points
//!
#![warn(missing_docs)]

mod accumulator;
pub mod averaging;
mod overlay;
mod processing;
pub mod resolution;

pub use accumulator::{bin_moments, AccumulatorConfig, BinStatistics, BinSums, PixelAccumulator};
pub use averaging::{AveragingPolicy, AzimuthWindow, CellPosition, DetectorFrame};
pub use overlay::{overlay, OverlayShape, QPoint};
pub use processing::{
    reduce, simulate, simulate_many, CalculationContext, ModelSpec, QRange, ReducedData, Scenario,
    SimulationOptions,
};
pub use resolution::{
    BinResolution, IncompleteGamma, ResolutionEngine, ResolutionParams, TRANSMISSION_FLOOR,
};

// Re-export core types used in the public API
pub use sansim_core::{AveragingKind, AveragingParams, InstrumentConfig, PixelGrid, QBin};
