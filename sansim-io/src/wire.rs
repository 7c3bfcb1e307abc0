//! JSON payloads exchanged with a remote model sampler.
//!
//! JSON has no representation for infinities or NaN, so every float crosses
//! the boundary sentinel-encoded and is decoded on receipt.

use log::debug;
use serde::{Deserialize, Serialize};

use sansim_core::error::ExternalServiceError;
use sansim_core::model::{
    decode_non_finite, encode_non_finite, ModelRequest, ModelSampler, QValues,
};

/// Response body: one intensity per requested point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    /// Sentinel-encoded intensities.
    pub intensities: Vec<f64>,
}

fn encode_all(values: &[f64]) -> Vec<f64> {
    values.iter().copied().map(encode_non_finite).collect()
}

fn decode_all(values: &[f64]) -> Vec<f64> {
    values.iter().copied().map(decode_non_finite).collect()
}

/// Serializes a request with all floats sentinel-encoded.
pub fn encode_request(request: &ModelRequest) -> Result<String, ExternalServiceError> {
    let q = match &request.q {
        QValues::OneD(q) => QValues::OneD(encode_all(q)),
        QValues::TwoD { qx, qy } => QValues::TwoD {
            qx: encode_all(qx),
            qy: encode_all(qy),
        },
    };
    let wire = ModelRequest {
        model: request.model.clone(),
        params: encode_all(&request.params),
        q,
    };
    serde_json::to_string(&wire).map_err(|e| ExternalServiceError::MalformedPayload(e.to_string()))
}

/// Parses a request and decodes its sentinels.
pub fn decode_request(json: &str) -> Result<ModelRequest, ExternalServiceError> {
    let mut request: ModelRequest = serde_json::from_str(json)
        .map_err(|e| ExternalServiceError::MalformedPayload(e.to_string()))?;
    request.params = decode_all(&request.params);
    request.q = match request.q {
        QValues::OneD(q) => QValues::OneD(decode_all(&q)),
        QValues::TwoD { qx, qy } => QValues::TwoD {
            qx: decode_all(&qx),
            qy: decode_all(&qy),
        },
    };
    Ok(request)
}

/// Serializes intensities with non-finite values sentinel-encoded.
pub fn encode_response(intensities: &[f64]) -> Result<String, ExternalServiceError> {
    let wire = WireResponse {
        intensities: encode_all(intensities),
    };
    serde_json::to_string(&wire).map_err(|e| ExternalServiceError::MalformedPayload(e.to_string()))
}

/// Parses a response, checks its length and decodes sentinels.
pub fn decode_response(json: &str, expected: usize) -> Result<Vec<f64>, ExternalServiceError> {
    let wire: WireResponse = serde_json::from_str(json)
        .map_err(|e| ExternalServiceError::MalformedPayload(e.to_string()))?;
    if wire.intensities.len() != expected {
        return Err(ExternalServiceError::ShapeMismatch {
            expected,
            actual: wire.intensities.len(),
        });
    }
    Ok(decode_all(&wire.intensities))
}

/// Moves a request body to the sampler service and returns its reply.
///
/// Retries and timeouts belong to the implementation.
pub trait Transport: Send + Sync {
    /// Sends `body` and returns the response body.
    fn exchange(&self, body: &str) -> Result<String, ExternalServiceError>;
}

impl<F> Transport for F
where
    F: Fn(&str) -> Result<String, ExternalServiceError> + Send + Sync,
{
    fn exchange(&self, body: &str) -> Result<String, ExternalServiceError> {
        self(body)
    }
}

/// [`ModelSampler`] speaking JSON over a [`Transport`].
#[derive(Debug, Clone)]
pub struct JsonSampler<T> {
    transport: T,
}

impl<T: Transport> JsonSampler<T> {
    /// Wraps a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: Transport> ModelSampler for JsonSampler<T> {
    fn sample(&self, request: &ModelRequest) -> Result<Vec<f64>, ExternalServiceError> {
        let body = encode_request(request)?;
        debug!(
            "model '{}': requesting {} points",
            request.model,
            request.expected_len()
        );
        let reply = self.transport.exchange(&body)?;
        decode_response(&reply, request.expected_len())
    }
}
