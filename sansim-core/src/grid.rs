//! Detector intensity and mask arrays.

use ndarray::Array2;

use crate::error::{Error, Result};

/// Mask value for a usable pixel.
pub const MASK_USABLE: u8 = 0;
/// Mask value for an excluded pixel.
pub const MASK_EXCLUDED: u8 = 1;

/// 2D detector image with a parallel mask, both indexed `[x, y]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    intensity: Array2<f64>,
    mask: Array2<u8>,
}

impl PixelGrid {
    /// Creates a grid from intensity and mask arrays of the same shape.
    pub fn new(intensity: Array2<f64>, mask: Array2<u8>) -> Result<Self> {
        if intensity.dim() != mask.dim() {
            return Err(Error::GridShapeMismatch {
                expected: intensity.dim(),
                actual: mask.dim(),
            });
        }
        Ok(Self { intensity, mask })
    }

    /// Unmasked grid with the given intensity.
    #[must_use]
    pub fn from_intensity(intensity: Array2<f64>) -> Self {
        let mask = Array2::zeros(intensity.dim());
        Self { intensity, mask }
    }

    /// Unmasked grid of constant intensity.
    #[must_use]
    pub fn filled(x_pixels: usize, y_pixels: usize, value: f64) -> Self {
        Self::from_intensity(Array2::from_elem((x_pixels, y_pixels), value))
    }

    /// Unmasked grid with intensity `f(i, j)` for 0-based pixel indices.
    #[must_use]
    pub fn from_fn<F>(x_pixels: usize, y_pixels: usize, f: F) -> Self
    where
        F: FnMut((usize, usize)) -> f64,
    {
        Self::from_intensity(Array2::from_shape_fn((x_pixels, y_pixels), f))
    }

    /// Excludes every pixel for which `exclude(i, j)` is true.
    #[must_use]
    pub fn with_mask_fn<F>(mut self, mut exclude: F) -> Self
    where
        F: FnMut(usize, usize) -> bool,
    {
        for ((i, j), m) in self.mask.indexed_iter_mut() {
            if exclude(i, j) {
                *m = MASK_EXCLUDED;
            }
        }
        self
    }

    /// Excludes pixels whose center lies within `radius_pixels` of a
    /// 1-based pixel coordinate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn with_disk_mask(self, center: (f64, f64), radius_pixels: f64) -> Self {
        let r2 = radius_pixels * radius_pixels;
        self.with_mask_fn(|i, j| {
            let dx = (i + 1) as f64 - center.0;
            let dy = (j + 1) as f64 - center.1;
            dx * dx + dy * dy <= r2
        })
    }

    /// Grid dimensions `(x_pixels, y_pixels)`.
    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        self.intensity.dim()
    }

    /// Intensity array.
    #[must_use]
    pub fn intensity(&self) -> &Array2<f64> {
        &self.intensity
    }

    /// Mask array.
    #[must_use]
    pub fn mask(&self) -> &Array2<u8> {
        &self.mask
    }

    /// Whether pixel `(i, j)` may contribute to a bin.
    #[inline]
    #[must_use]
    pub fn is_usable(&self, i: usize, j: usize) -> bool {
        self.mask[[i, j]] == MASK_USABLE
    }

    /// Number of usable pixels.
    #[must_use]
    pub fn usable_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m == MASK_USABLE).count()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_shape_mismatch() {
        let result = PixelGrid::new(Array2::zeros((4, 4)), Array2::zeros((4, 3)));
        assert!(matches!(result, Err(Error::GridShapeMismatch { .. })));
    }

    #[test]
    fn test_disk_mask() {
        let grid = PixelGrid::filled(9, 9, 1.0).with_disk_mask((5.0, 5.0), 1.0);
        // center plus its four edge neighbours
        assert_eq!(grid.usable_count(), 81 - 5);
        assert!(!grid.is_usable(4, 4));
        assert!(grid.is_usable(0, 0));
    }

    #[test]
    fn test_from_fn_indexing() {
        let grid = PixelGrid::from_fn(3, 2, |(i, j)| (10 * i + j) as f64);
        assert_eq!(grid.dim(), (3, 2));
        assert_eq!(grid.intensity()[[2, 1]], 21.0);
    }
}
