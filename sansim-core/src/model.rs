//! Contract with the external scattering-model sampler.
//!
//! The sampler is a black box mapping Q values to intensities. This module
//! defines the request shape, the sentinel encoding used for non-finite
//! values on the wire, and the transmission correction applied to returned
//! intensities.

use log::warn;

use crate::error::ExternalServiceError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Wire stand-in for `+inf`.
pub const POS_INFINITY_SENTINEL: f64 = 1.0e308;
/// Wire stand-in for `-inf`.
pub const NEG_INFINITY_SENTINEL: f64 = -1.0e308;
/// Wire stand-in for NaN.
pub const NAN_SENTINEL: f64 = -1.0e307;

/// Replaces a non-finite value with its sentinel.
#[inline]
#[must_use]
pub fn encode_non_finite(value: f64) -> f64 {
    if value.is_nan() {
        NAN_SENTINEL
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            POS_INFINITY_SENTINEL
        } else {
            NEG_INFINITY_SENTINEL
        }
    } else {
        value
    }
}

/// Inverse of [`encode_non_finite`].
#[inline]
#[must_use]
#[allow(clippy::float_cmp)]
pub fn decode_non_finite(value: f64) -> f64 {
    if value == POS_INFINITY_SENTINEL {
        f64::INFINITY
    } else if value == NEG_INFINITY_SENTINEL {
        f64::NEG_INFINITY
    } else if value == NAN_SENTINEL {
        f64::NAN
    } else {
        value
    }
}

/// Q values to evaluate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum QValues {
    /// Reduced 1D Q values.
    OneD(Vec<f64>),
    /// Detector axes; the response is flattened row-major by the Qx axis.
    TwoD { qx: Vec<f64>, qy: Vec<f64> },
}

impl QValues {
    /// Number of intensities a sampler must return.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            QValues::OneD(q) => q.len(),
            QValues::TwoD { qx, qy } => qx.len() * qy.len(),
        }
    }

    /// Returns true if no values are requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Request sent to a [`ModelSampler`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelRequest {
    /// Model identifier, e.g. `"sphere"`.
    pub model: String,
    /// Model parameter vector.
    pub params: Vec<f64>,
    /// Where to evaluate.
    pub q: QValues,
}

impl ModelRequest {
    /// 1D request.
    #[must_use]
    pub fn one_d(model: impl Into<String>, params: Vec<f64>, q: Vec<f64>) -> Self {
        Self {
            model: model.into(),
            params,
            q: QValues::OneD(q),
        }
    }

    /// 2D request over detector axes.
    #[must_use]
    pub fn two_d(model: impl Into<String>, params: Vec<f64>, qx: Vec<f64>, qy: Vec<f64>) -> Self {
        Self {
            model: model.into(),
            params,
            q: QValues::TwoD { qx, qy },
        }
    }

    /// Number of intensities expected back.
    #[must_use]
    pub fn expected_len(&self) -> usize {
        self.q.len()
    }
}

/// Evaluates a scattering-law model.
///
/// Implementations own transport, retries and timeouts.
pub trait ModelSampler: Send + Sync {
    /// Returns one raw intensity per requested Q point.
    fn sample(&self, request: &ModelRequest) -> Result<Vec<f64>, ExternalServiceError>;
}

impl<F> ModelSampler for F
where
    F: Fn(&ModelRequest) -> Result<Vec<f64>, ExternalServiceError> + Send + Sync,
{
    fn sample(&self, request: &ModelRequest) -> Result<Vec<f64>, ExternalServiceError> {
        self(request)
    }
}

/// Calls the sampler and checks the response length.
pub fn sample_checked<S: ModelSampler + ?Sized>(
    sampler: &S,
    request: &ModelRequest,
) -> Result<Vec<f64>, ExternalServiceError> {
    let values = sampler.sample(request)?;
    let expected = request.expected_len();
    if values.len() != expected {
        return Err(ExternalServiceError::ShapeMismatch {
            expected,
            actual: values.len(),
        });
    }
    Ok(values)
}

/// Multiplies raw intensities by the per-bin transmission factor.
///
/// Non-finite products are replaced by their sentinel.
#[must_use]
pub fn apply_transmission(raw: &[f64], transmission: &[f64]) -> Vec<f64> {
    let mut substituted = 0usize;
    let out = raw
        .iter()
        .zip(transmission)
        .map(|(&i, &t)| {
            let v = i * t;
            if v.is_finite() {
                v
            } else {
                substituted += 1;
                encode_non_finite(v)
            }
        })
        .collect();
    if substituted > 0 {
        warn!("model sampler produced {substituted} non-finite intensities; sentinels substituted");
    }
    out
}

/// Replaces non-finite values in a 2D response by their sentinel.
#[must_use]
pub fn sanitize(raw: &[f64]) -> Vec<f64> {
    let out: Vec<f64> = raw.iter().copied().map(encode_non_finite).collect();
    let substituted = raw.iter().filter(|v| !v.is_finite()).count();
    if substituted > 0 {
        warn!("model sampler produced {substituted} non-finite intensities; sentinels substituted");
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_sentinel_round_trip() {
        assert_eq!(
            decode_non_finite(encode_non_finite(f64::INFINITY)),
            f64::INFINITY
        );
        assert_eq!(
            decode_non_finite(encode_non_finite(f64::NEG_INFINITY)),
            f64::NEG_INFINITY
        );
        assert!(decode_non_finite(encode_non_finite(f64::NAN)).is_nan());
        assert_eq!(decode_non_finite(encode_non_finite(1.25)), 1.25);
    }

    #[test]
    fn test_sentinels_are_distinct_and_finite() {
        let s = [POS_INFINITY_SENTINEL, NEG_INFINITY_SENTINEL, NAN_SENTINEL];
        assert!(s.iter().all(|v| v.is_finite()));
        assert_ne!(s[0], s[1]);
        assert_ne!(s[0], s[2]);
        assert_ne!(s[1], s[2]);
    }

    #[test]
    fn test_closure_sampler_and_shape_check() {
        let sampler =
            |req: &ModelRequest| Ok::<_, ExternalServiceError>(vec![1.0; req.expected_len()]);
        let req = ModelRequest::two_d("flat", vec![], vec![0.0; 3], vec![0.0; 4]);
        assert_eq!(sample_checked(&sampler, &req).unwrap().len(), 12);

        let short = |_: &ModelRequest| Ok::<_, ExternalServiceError>(vec![1.0]);
        let err = sample_checked(&short, &req).unwrap_err();
        assert_eq!(
            err,
            ExternalServiceError::ShapeMismatch {
                expected: 12,
                actual: 1
            }
        );
    }

    #[test]
    fn test_apply_transmission_substitutes_nan() {
        let out = apply_transmission(&[2.0, f64::NAN, f64::INFINITY], &[0.5, 1.0, 1.0]);
        assert_eq!(out, vec![1.0, NAN_SENTINEL, POS_INFINITY_SENTINEL]);
    }
}
