//! Averaging policies: which detector cells enter the 1D reduction, and
//! which bin each cell lands in.
//!
//! One [`AveragingPolicy`] is active per calculation. Each variant is a plain
//! data value; the inclusion test and bin assignment are free functions
//! matched on the variant.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use std::f64::consts::{PI, TAU};

use sansim_core::config::{AveragingKind, AveragingParams, DetectorSection};
use sansim_core::qmap::{QMap, QMapper};
use sansim_core::Result;

/// Position of a (sub-)pixel relative to the beam center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellPosition {
    /// Horizontal detector-plane offset (cm).
    pub dx: f64,
    /// Vertical detector-plane offset (cm).
    pub dy: f64,
    /// Radial offset (cm).
    pub radius: f64,
    /// |Q| at this position (1/A).
    pub q: f64,
}

impl CellPosition {
    /// Builds a position from linearized offsets.
    #[must_use]
    pub fn new(mapper: &QMapper, dx: f64, dy: f64) -> Self {
        let radius = dx.hypot(dy);
        Self {
            dx,
            dy,
            radius,
            q: mapper.q_from_offset(radius),
        }
    }

    /// Azimuth in `[0, 2pi)`, counter-clockwise from +x.
    #[must_use]
    pub fn azimuth(&self) -> f64 {
        normalize_angle(self.dy.atan2(self.dx))
    }
}

/// Azimuthal window `[phi - dphi, phi + dphi]` (radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AzimuthWindow {
    /// Window center.
    pub phi: f64,
    /// Half-width.
    pub dphi: f64,
}

impl AzimuthWindow {
    /// Lower edge.
    #[must_use]
    pub fn start(&self) -> f64 {
        self.phi - self.dphi
    }

    /// Upper edge.
    #[must_use]
    pub fn end(&self) -> f64 {
        self.phi + self.dphi
    }

    /// Whether `azimuth` falls in the window around `center`.
    fn contains_around(&self, azimuth: f64, center: f64) -> bool {
        angular_distance(azimuth, center) <= self.dphi
    }

    /// Forward-side membership.
    #[must_use]
    pub fn contains(&self, azimuth: f64) -> bool {
        self.contains_around(azimuth, self.phi)
    }

    /// Membership in the mirrored window around `phi + pi`.
    #[must_use]
    pub fn contains_mirrored(&self, azimuth: f64) -> bool {
        self.contains_around(azimuth, self.phi + PI)
    }
}

/// Detector bookkeeping shared by all variants.
///
/// Q bounds of the detector and the azimuths of its four corners, in the
/// order (max, max), (min, max), (min, min), (max, min).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorFrame {
    /// Corner Q vectors.
    pub corners: [(f64, f64); 4],
    /// Corner azimuths in `[0, 2pi)`.
    pub corner_azimuths: [f64; 4],
}

impl DetectorFrame {
    /// Builds the frame from the detector Q map.
    #[must_use]
    pub fn new(qmap: &QMap) -> Self {
        let corners = qmap.corners();
        let corner_azimuths = corners.map(|(qx, qy)| normalize_angle(qy.atan2(qx)));
        Self {
            corners,
            corner_azimuths,
        }
    }

    /// Whether Q = 0 lies on the detector.
    #[must_use]
    pub fn contains_origin(&self) -> bool {
        let (x_hi, y_hi) = self.corners[0];
        let (x_lo, y_lo) = self.corners[2];
        x_lo < 0.0 && x_hi > 0.0 && y_lo < 0.0 && y_hi > 0.0
    }

    /// Largest corner |Q|.
    #[must_use]
    pub fn q_extent(&self) -> f64 {
        self.corners
            .iter()
            .map(|(qx, qy)| qx.hypot(*qy))
            .fold(0.0, f64::max)
    }

    /// Distance in Q from the origin to the detector edge along `angle`.
    ///
    /// The corner azimuths pick the edge the ray exits through. With the
    /// beam center off the detector the corner extent is returned instead.
    #[must_use]
    pub fn ray_extent(&self, angle: f64) -> f64 {
        if !self.contains_origin() {
            return self.q_extent();
        }
        let a = normalize_angle(angle);
        let [c0, c1, c2, c3] = self.corner_azimuths;
        let (x_hi, y_hi) = self.corners[0];
        let (x_lo, y_lo) = self.corners[2];
        let (cos, sin) = (a.cos(), a.sin());
        if a < c0 || a >= c3 {
            x_hi / cos
        } else if a < c1 {
            y_hi / sin
        } else if a < c2 {
            x_lo / cos
        } else {
            y_lo / sin
        }
    }
}

/// Active averaging variant with its parameters resolved to detector units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AveragingPolicy {
    /// Every cell, binned by radius.
    Circular,
    /// Cells inside the azimuthal window or its mirror, binned by radius.
    Sector {
        /// Azimuthal window.
        window: AzimuthWindow,
        /// Detector halves, split at the beam-center column.
        section: DetectorSection,
    },
    /// Cells with |Q| in `[q_min, q_max]`, binned by radius.
    Annular {
        /// Lower |Q| bound (1/A).
        q_min: f64,
        /// Upper |Q| bound (1/A).
        q_max: f64,
    },
    /// Cells within `half_width_cm` of the axis at `phi`, binned along it.
    Rectangular {
        /// Bar axis (radians).
        phi: f64,
        /// Half of the bar width on the detector (cm).
        half_width_cm: f64,
        /// Detector halves, split at the beam-center column.
        section: DetectorSection,
    },
    /// Every cell, binned by an ellipse-corrected radius.
    Elliptical {
        /// Major axis (radians).
        phi: f64,
        /// Ratio applied to the component across the major axis.
        aspect_ratio: f64,
    },
}

impl AveragingPolicy {
    /// Resolves averaging parameters against the detector.
    pub fn from_params(params: &AveragingParams, pixel_size_cm: f64) -> Result<Self> {
        params.validate()?;
        let phi = params.phi_degrees.to_radians();
        Ok(match params.kind {
            AveragingKind::Circular => AveragingPolicy::Circular,
            AveragingKind::Sector => AveragingPolicy::Sector {
                window: AzimuthWindow {
                    phi,
                    dphi: params.dphi_degrees.to_radians(),
                },
                section: params.section,
            },
            AveragingKind::Annular => AveragingPolicy::Annular {
                q_min: params.q_center - params.q_width,
                q_max: params.q_center + params.q_width,
            },
            AveragingKind::Rectangular => AveragingPolicy::Rectangular {
                phi,
                half_width_cm: 0.5 * params.bar_width_pixels * pixel_size_cm,
                section: params.section,
            },
            AveragingKind::Elliptical => AveragingPolicy::Elliptical {
                phi,
                aspect_ratio: params.aspect_ratio,
            },
        })
    }

    /// Variant tag.
    #[must_use]
    pub fn kind(&self) -> AveragingKind {
        match self {
            AveragingPolicy::Circular => AveragingKind::Circular,
            AveragingPolicy::Sector { .. } => AveragingKind::Sector,
            AveragingPolicy::Annular { .. } => AveragingKind::Annular,
            AveragingPolicy::Rectangular { .. } => AveragingKind::Rectangular,
            AveragingPolicy::Elliptical { .. } => AveragingKind::Elliptical,
        }
    }

    /// Whether a cell contributes to the reduction.
    #[must_use]
    pub fn includes(&self, cell: &CellPosition) -> bool {
        match *self {
            AveragingPolicy::Circular | AveragingPolicy::Elliptical { .. } => true,
            AveragingPolicy::Sector { window, section } => sector_includes(window, section, cell),
            AveragingPolicy::Annular { q_min, q_max } => cell.q >= q_min && cell.q <= q_max,
            AveragingPolicy::Rectangular {
                phi,
                half_width_cm,
                section,
            } => bar_includes(phi, half_width_cm, section, cell),
        }
    }

    /// Distance (cm) the cell is binned by.
    #[must_use]
    pub fn binning_radius(&self, cell: &CellPosition) -> f64 {
        match *self {
            AveragingPolicy::Circular
            | AveragingPolicy::Sector { .. }
            | AveragingPolicy::Annular { .. } => cell.radius,
            AveragingPolicy::Rectangular { phi, .. } => project(phi, cell).0.abs(),
            AveragingPolicy::Elliptical { phi, aspect_ratio } => {
                ellipse_radius(phi, aspect_ratio, cell)
            }
        }
    }

    /// 1-based bin number: `floor(radius / bin_width) + 1`.
    #[must_use]
    pub fn bin_number(&self, cell: &CellPosition, bin_width_cm: f64) -> usize {
        (self.binning_radius(cell) / bin_width_cm).floor() as usize + 1
    }
}

/// Gates a cell by the detector half it sits on: `dx > 0` is forward,
/// `dx < 0` mirrored. The column through the beam center counts only when
/// both halves are selected.
fn section_includes(section: DetectorSection, cell: &CellPosition) -> bool {
    if cell.dx > 0.0 {
        section.forward()
    } else if cell.dx < 0.0 {
        section.mirrored()
    } else {
        section.forward() && section.mirrored()
    }
}

fn sector_includes(window: AzimuthWindow, section: DetectorSection, cell: &CellPosition) -> bool {
    let azimuth = cell.azimuth();
    (window.contains(azimuth) || window.contains_mirrored(azimuth))
        && section_includes(section, cell)
}

fn bar_includes(
    phi: f64,
    half_width_cm: f64,
    section: DetectorSection,
    cell: &CellPosition,
) -> bool {
    let (_, perpendicular) = project(phi, cell);
    perpendicular.abs() <= half_width_cm && section_includes(section, cell)
}

/// Components of the cell offset along and across the axis at `phi`.
fn project(phi: f64, cell: &CellPosition) -> (f64, f64) {
    let (sin, cos) = phi.sin_cos();
    (
        cell.dx * cos + cell.dy * sin,
        -cell.dx * sin + cell.dy * cos,
    )
}

fn ellipse_radius(phi: f64, aspect_ratio: f64, cell: &CellPosition) -> f64 {
    let theta = cell.azimuth() - phi;
    let (sin, cos) = theta.sin_cos();
    cell.radius * (cos * cos + (aspect_ratio * sin).powi(2)).sqrt()
}

/// Maps an angle into `[0, 2pi)`.
#[must_use]
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// Smallest absolute difference between two angles, in `[0, pi]`.
#[must_use]
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let d = normalize_angle(a - b);
    d.min(TAU - d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cell(dx: f64, dy: f64) -> CellPosition {
        CellPosition {
            dx,
            dy,
            radius: dx.hypot(dy),
            q: 0.0,
        }
    }

    fn policy(params: &AveragingParams) -> AveragingPolicy {
        AveragingPolicy::from_params(params, 0.5).unwrap()
    }

    #[test]
    fn test_circular_bins_by_radius() {
        let p = policy(&AveragingParams::circular());
        assert!(p.includes(&cell(-3.0, 7.0)));
        assert_eq!(p.bin_number(&cell(0.1, 0.0), 0.5), 1);
        assert_eq!(p.bin_number(&cell(3.0, 4.0), 0.5), 11);
    }

    #[test]
    fn test_sector_sections() {
        let right = policy(&AveragingParams::sector(0.0, 20.0, DetectorSection::Right));
        assert!(right.includes(&cell(5.0, 1.0)));
        assert!(!right.includes(&cell(-5.0, 1.0)));
        assert!(!right.includes(&cell(1.0, 5.0)));

        let left = policy(&AveragingParams::sector(0.0, 20.0, DetectorSection::Left));
        assert!(left.includes(&cell(-5.0, -1.0)));
        assert!(!left.includes(&cell(5.0, 1.0)));

        let both = policy(&AveragingParams::sector(90.0, 10.0, DetectorSection::Both));
        assert!(both.includes(&cell(0.2, 5.0)));
        assert!(both.includes(&cell(-0.2, -5.0)));
        assert!(!both.includes(&cell(5.0, 0.2)));
    }

    #[test]
    fn test_sector_sections_follow_detector_half() {
        let right = policy(&AveragingParams::sector(135.0, 10.0, DetectorSection::Right));
        assert!(right.includes(&cell(3.0, -3.0)));
        assert!(!right.includes(&cell(-3.0, 3.0)));

        let left = policy(&AveragingParams::sector(135.0, 10.0, DetectorSection::Left));
        assert!(left.includes(&cell(-3.0, 3.0)));
        assert!(!left.includes(&cell(3.0, -3.0)));

        let vertical = policy(&AveragingParams::sector(90.0, 10.0, DetectorSection::Right));
        assert!(vertical.includes(&cell(0.2, 5.0)));
        assert!(vertical.includes(&cell(0.2, -5.0)));
        assert!(!vertical.includes(&cell(-0.2, 5.0)));
        assert!(!vertical.includes(&cell(0.0, 5.0)));

        let both = policy(&AveragingParams::sector(90.0, 10.0, DetectorSection::Both));
        assert!(both.includes(&cell(0.0, 5.0)));
    }

    #[test]
    fn test_sector_window_wraps_through_zero() {
        let p = policy(&AveragingParams::sector(350.0, 20.0, DetectorSection::Right));
        assert!(p.includes(&cell(5.0, 0.5)));
        assert!(p.includes(&cell(5.0, -2.5)));
        assert!(!p.includes(&cell(0.5, 5.0)));
    }

    #[test]
    fn test_annular_closed_band() {
        let p = policy(&AveragingParams::annular(0.05, 0.01));
        let mut c = cell(1.0, 0.0);
        c.q = 0.04;
        assert!(p.includes(&c));
        c.q = 0.06;
        assert!(p.includes(&c));
        c.q = 0.061;
        assert!(!p.includes(&c));
        c.q = 0.039;
        assert!(!p.includes(&c));
    }

    #[test]
    fn test_rectangular_projects_onto_axis() {
        // bar 2 pixels (1 cm) wide along 45 degrees
        let p = policy(&AveragingParams::rectangular(
            45.0,
            2.0,
            DetectorSection::Both,
        ));
        let on_axis = cell(3.0, 3.0);
        assert!(p.includes(&on_axis));
        assert_relative_eq!(p.binning_radius(&on_axis), 18.0_f64.sqrt(), epsilon = 1e-12);
        assert!(p.includes(&cell(-3.0, -3.2)));
        assert!(!p.includes(&cell(3.0, -3.0)));

        let right = policy(&AveragingParams::rectangular(
            0.0,
            2.0,
            DetectorSection::Right,
        ));
        assert!(right.includes(&cell(4.0, 0.4)));
        assert!(!right.includes(&cell(-4.0, 0.4)));
        assert_relative_eq!(right.binning_radius(&cell(4.0, 0.4)), 4.0);

        let vertical = policy(&AveragingParams::rectangular(
            90.0,
            2.0,
            DetectorSection::Right,
        ));
        assert!(vertical.includes(&cell(0.2, 5.0)));
        assert!(vertical.includes(&cell(0.2, -5.0)));
        assert!(!vertical.includes(&cell(-0.2, 5.0)));
        assert_relative_eq!(vertical.binning_radius(&cell(0.2, -5.0)), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_elliptical_radius() {
        let p = policy(&AveragingParams::elliptical(0.0, 2.0));
        assert!(p.includes(&cell(0.0, 1.0)));
        assert_relative_eq!(p.binning_radius(&cell(3.0, 0.0)), 3.0);
        assert_relative_eq!(p.binning_radius(&cell(0.0, 3.0)), 6.0, epsilon = 1e-12);

        let unit = policy(&AveragingParams::elliptical(30.0, 1.0));
        assert_relative_eq!(unit.binning_radius(&cell(3.0, 4.0)), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_helpers() {
        assert_relative_eq!(normalize_angle(-PI / 2.0), 1.5 * PI, epsilon = 1e-12);
        assert_relative_eq!(angular_distance(0.1, TAU - 0.1), 0.2, epsilon = 1e-12);
        assert_relative_eq!(angular_distance(PI, 0.0), PI);
    }
}
