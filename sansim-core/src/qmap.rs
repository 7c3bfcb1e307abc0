//! Detector pixel to scattering-vector mapping.
#![allow(clippy::cast_precision_loss)]

use std::f64::consts::PI;

use ndarray::Array2;

use crate::config::InstrumentConfig;
use crate::geometry::DerivedGeometry;

/// Default arc-linearization coefficient (mm).
pub const DEFAULT_DETECTOR_COEFFICIENT_MM: f64 = 10_000.0;

/// Converts detector positions into Q.
///
/// Pixel coordinates are 1-based: the center of the first pixel is at 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QMapper {
    wavelength: f64,
    sdd_cm: f64,
    pixel_size_cm: f64,
    beam_center: (f64, f64),
    coefficient_mm: f64,
}

impl QMapper {
    /// Creates a mapper with the default linearization coefficient.
    #[must_use]
    pub fn new(config: &InstrumentConfig, geometry: &DerivedGeometry) -> Self {
        Self {
            wavelength: config.wavelength,
            sdd_cm: geometry.sdd_cm,
            pixel_size_cm: config.pixel_size_cm,
            beam_center: (geometry.beam_center_x, geometry.beam_center_y),
            coefficient_mm: DEFAULT_DETECTOR_COEFFICIENT_MM,
        }
    }

    /// Overrides the linearization coefficient (mm).
    #[must_use]
    pub fn with_coefficient(mut self, coefficient_mm: f64) -> Self {
        self.coefficient_mm = coefficient_mm;
        self
    }

    /// Sample-to-detector distance used by this mapper (cm).
    #[must_use]
    pub fn sdd_cm(&self) -> f64 {
        self.sdd_cm
    }

    /// Pixel pitch (cm).
    #[must_use]
    pub fn pixel_size_cm(&self) -> f64 {
        self.pixel_size_cm
    }

    /// Beam center in pixel coordinates.
    #[must_use]
    pub fn beam_center(&self) -> (f64, f64) {
        self.beam_center
    }

    /// Wavelength (A).
    #[must_use]
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    /// Linearized detector-plane distance (cm) of a coordinate from `center`.
    #[inline]
    #[must_use]
    pub fn linearized_offset(&self, pixel: f64, center: f64) -> f64 {
        let c = self.coefficient_mm;
        let mm = c * ((pixel - center) * self.pixel_size_cm * 10.0 / c).tan();
        mm / 10.0
    }

    /// Horizontal detector-plane offset (cm) of an x pixel coordinate.
    #[inline]
    #[must_use]
    pub fn x_offset(&self, x: f64) -> f64 {
        self.linearized_offset(x, self.beam_center.0)
    }

    /// Vertical detector-plane offset (cm) of a y pixel coordinate.
    #[inline]
    #[must_use]
    pub fn y_offset(&self, y: f64) -> f64 {
        self.linearized_offset(y, self.beam_center.1)
    }

    /// Signed Q component for a signed detector-plane offset (cm).
    ///
    /// Passing a radius gives the Q magnitude.
    #[inline]
    #[must_use]
    pub fn q_from_offset(&self, offset_cm: f64) -> f64 {
        q_from_distance(offset_cm, self.sdd_cm, self.wavelength)
    }

    /// Q magnitude at a detector-plane position (cm).
    #[inline]
    #[must_use]
    pub fn q_at(&self, dx_cm: f64, dy_cm: f64) -> f64 {
        self.q_from_offset(dx_cm.hypot(dy_cm))
    }

    /// Maps the whole detector grid.
    #[must_use]
    pub fn map(&self, x_pixels: usize, y_pixels: usize) -> QMap {
        let qx: Vec<f64> = (1..=x_pixels)
            .map(|i| self.q_from_offset(self.x_offset(i as f64)))
            .collect();
        let qy: Vec<f64> = (1..=y_pixels)
            .map(|j| self.q_from_offset(self.y_offset(j as f64)))
            .collect();
        let q = Array2::from_shape_fn((x_pixels, y_pixels), |(i, j)| {
            let dx = self.x_offset((i + 1) as f64);
            let dy = self.y_offset((j + 1) as f64);
            self.q_at(dx, dy)
        });
        QMap { qx, qy, q }
    }
}

/// `(4 pi / lambda) sin(atan(distance / sdd) / 2)`.
#[inline]
#[must_use]
pub fn q_from_distance(distance_cm: f64, sdd_cm: f64, wavelength: f64) -> f64 {
    let theta = (distance_cm / sdd_cm).atan() / 2.0;
    4.0 * PI / wavelength * theta.sin()
}

/// Q values over the detector, indexed `[x, y]`.
#[derive(Debug, Clone, PartialEq)]
pub struct QMap {
    /// Qx of each pixel column.
    pub qx: Vec<f64>,
    /// Qy of each pixel row.
    pub qy: Vec<f64>,
    /// |Q| of each pixel.
    pub q: Array2<f64>,
}

impl QMap {
    /// Largest |Q| on the detector.
    #[must_use]
    pub fn q_max(&self) -> f64 {
        self.q.iter().copied().fold(0.0, f64::max)
    }

    /// Corner Q vectors `(qx, qy)`: (max, max), (min, max), (min, min), (max, min).
    #[must_use]
    pub fn corners(&self) -> [(f64, f64); 4] {
        let (x_lo, x_hi) = (first(&self.qx), last(&self.qx));
        let (y_lo, y_hi) = (first(&self.qy), last(&self.qy));
        [(x_hi, y_hi), (x_lo, y_hi), (x_lo, y_lo), (x_hi, y_lo)]
    }
}

fn first(values: &[f64]) -> f64 {
    values.first().copied().unwrap_or(0.0)
}

fn last(values: &[f64]) -> f64 {
    values.last().copied().unwrap_or(0.0)
}
