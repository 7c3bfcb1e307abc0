//! sansim-core: Core types for small-angle neutron scattering simulation.
//!
//! This crate provides instrument configuration and constant tables,
//! derived instrument geometry, the detector-to-Q mapping, detector grids,
//! reduced Q bins and the contract with the external model sampler.
//!

pub mod bin;
pub mod config;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod instrument;
pub mod model;
pub mod qmap;

pub use bin::{QBin, LOW_STATISTICS_SIGMA};
pub use config::{AveragingKind, AveragingParams, DetectorSection, InstrumentConfig};
pub use error::{Error, ExternalServiceError, Result};
pub use geometry::{resolve_geometry, DerivedGeometry};
pub use grid::PixelGrid;
pub use instrument::{GuideConfig, Instrument, InstrumentTable, SampleTable, SsdFormula};
pub use model::{ModelRequest, ModelSampler, QValues};
pub use qmap::{QMap, QMapper};
