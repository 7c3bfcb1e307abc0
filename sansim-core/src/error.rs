//! Error types for sansim-core.

use thiserror::Error;

/// Result type alias for sansim operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for sansim operations.
///
/// Everything except [`Error::ExternalService`] is a configuration error and
/// is raised before any pixel is touched.
#[derive(Error, Debug)]
pub enum Error {
    /// Derived source-to-sample or sample-to-detector distance is not physical.
    #[error("non-physical geometry: SSD = {ssd} cm, SDD = {sdd} cm")]
    InvalidGeometry { ssd: f64, sdd: f64 },

    /// Instrument name not present in the instrument tables.
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Guide identifier is neither a valid count nor `LENS`.
    #[error("unknown guide configuration: {0}")]
    UnknownGuideConfig(String),

    /// Sample table identifier not recognized.
    #[error("unknown sample table: {0}")]
    UnknownSampleTable(String),

    /// Pixel size must be strictly positive.
    #[error("invalid pixel size: {0} cm")]
    InvalidPixelSize(f64),

    /// Detector must have at least one pixel along each axis.
    #[error("invalid detector dimensions: {x} x {y}")]
    InvalidDetector { x: usize, y: usize },

    /// Lateral detector offset beyond the carriage travel.
    #[error("detector offset {offset} cm outside +/-{max} cm")]
    DetectorOffsetOutOfRange { offset: f64, max: f64 },

    /// Wavelength spread setting not offered by the instrument.
    #[error("unsupported wavelength spread: {0}%")]
    UnsupportedWavelengthSpread(f64),

    /// Wavelength outside the band allowed for the selected spread.
    #[error("wavelength {wavelength} A outside [{min}, {max}] A for this spread")]
    WavelengthOutOfRange { wavelength: f64, min: f64, max: f64 },

    /// Intensity, mask or Q arrays do not share a shape.
    #[error("grid shape mismatch: expected {expected:?}, got {actual:?}")]
    GridShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Averaging parameters out of their valid domain.
    #[error("invalid averaging parameters: {0}")]
    InvalidAveraging(String),

    /// The model sampler failed.
    #[error("model sampler failure: {0}")]
    ExternalService(#[from] ExternalServiceError),
}

impl Error {
    /// Returns true for errors that reject a configuration before the pipeline runs.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Error::ExternalService(_))
    }
}

/// Failure talking to the external model sampler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExternalServiceError {
    /// The sampler could not be reached.
    #[error("model sampler unreachable: {0}")]
    Unreachable(String),

    /// The payload could not be decoded.
    #[error("malformed model sampler payload: {0}")]
    MalformedPayload(String),

    /// The sampler returned a different number of values than requested.
    #[error("model sampler returned {actual} values, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        let err = Error::InvalidGeometry {
            ssd: -1.0,
            sdd: 100.0,
        };
        assert!(err.is_configuration());

        let err: Error = ExternalServiceError::Unreachable("timeout".into()).into();
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("timeout"));
    }
}
