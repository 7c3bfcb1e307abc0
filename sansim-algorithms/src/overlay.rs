//! Boundary of the averaging region in Q space, for display.
//!
//! Pure geometry: depends on the policy and the detector frame only.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use sansim_core::config::DetectorSection;
use sansim_core::qmap::q_from_distance;

use crate::averaging::{angular_distance, AveragingPolicy, DetectorFrame};

/// Slack for axes lying on the beam-center column.
const AXIS_TOLERANCE: f64 = 1e-9;

/// Point in the (Qx, Qy) plane.
pub type QPoint = (f64, f64);

/// One piece of an overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OverlayShape {
    /// Straight line between two Q points.
    Segment {
        /// Start point.
        from: QPoint,
        /// End point.
        to: QPoint,
    },
    /// Arc centered on Q = 0, angles in radians counter-clockwise from +Qx.
    Arc {
        /// Radius (1/A).
        radius: f64,
        /// Start angle.
        start: f64,
        /// End angle.
        end: f64,
    },
}

/// Overlay for the active policy.
///
/// `sdd_cm` and `wavelength` convert detector-plane widths to Q.
#[must_use]
pub fn overlay(
    policy: &AveragingPolicy,
    frame: &DetectorFrame,
    sdd_cm: f64,
    wavelength: f64,
) -> Vec<OverlayShape> {
    match *policy {
        AveragingPolicy::Circular => detector_outline(frame),
        AveragingPolicy::Sector { window, section } => {
            let mut shapes = Vec::with_capacity(4);
            for center in section_centers(window.phi, window.dphi, section) {
                for edge in [center - window.dphi, center + window.dphi] {
                    shapes.push(ray(frame, edge, 0.0));
                }
            }
            shapes
        }
        AveragingPolicy::Annular { q_min, q_max } => [q_min, q_max]
            .into_iter()
            .filter(|&r| r > 0.0)
            .map(|radius| OverlayShape::Arc {
                radius,
                start: 0.0,
                end: TAU,
            })
            .collect(),
        AveragingPolicy::Rectangular {
            phi,
            half_width_cm,
            section,
        } => {
            let half_width_q = q_from_distance(half_width_cm, sdd_cm, wavelength);
            let mut shapes = Vec::with_capacity(4);
            for center in section_centers(phi, 0.0, section) {
                for side in [-half_width_q, half_width_q] {
                    shapes.push(ray(frame, center, side));
                }
            }
            shapes
        }
        AveragingPolicy::Elliptical { phi, aspect_ratio } => {
            let mut shapes = detector_outline(frame);
            let major = frame.ray_extent(phi).min(frame.ray_extent(phi + PI));
            let minor = major / aspect_ratio;
            let (sin, cos) = phi.sin_cos();
            shapes.push(OverlayShape::Segment {
                from: (-major * cos, -major * sin),
                to: (major * cos, major * sin),
            });
            shapes.push(OverlayShape::Segment {
                from: (minor * sin, -minor * cos),
                to: (-minor * sin, minor * cos),
            });
            shapes
        }
    }
}

/// Axis directions (`phi`, `phi + pi`) whose region, `spread` either side,
/// reaches into a selected detector half.
fn section_centers(phi: f64, spread: f64, section: DetectorSection) -> Vec<f64> {
    let reach = FRAC_PI_2 + spread + AXIS_TOLERANCE;
    [phi, phi + PI]
        .into_iter()
        .filter(|&center| {
            (section.forward() && angular_distance(center, 0.0) < reach)
                || (section.mirrored() && angular_distance(center, PI) < reach)
        })
        .collect()
}

/// Segment parallel to `angle`, offset sideways by `offset`, running from
/// the axis origin to the detector edge.
fn ray(frame: &DetectorFrame, angle: f64, offset: f64) -> OverlayShape {
    let (sin, cos) = angle.sin_cos();
    let normal = angle + FRAC_PI_2;
    let from = (offset * normal.cos(), offset * normal.sin());
    let length = frame.ray_extent(angle);
    OverlayShape::Segment {
        from,
        to: (from.0 + length * cos, from.1 + length * sin),
    }
}

fn detector_outline(frame: &DetectorFrame) -> Vec<OverlayShape> {
    (0..4)
        .map(|k| OverlayShape::Segment {
            from: frame.corners[k],
            to: frame.corners[(k + 1) % 4],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::averaging::AzimuthWindow;
    use approx::assert_relative_eq;

    fn frame() -> DetectorFrame {
        let corners = [(0.3, 0.2), (-0.3, 0.2), (-0.3, -0.2), (0.3, -0.2)];
        DetectorFrame {
            corners,
            corner_azimuths: corners.map(|(x, y): (f64, f64)| y.atan2(x).rem_euclid(TAU)),
        }
    }

    fn end(shape: &OverlayShape) -> QPoint {
        match shape {
            OverlayShape::Segment { to, .. } => *to,
            OverlayShape::Arc { .. } => panic!("expected segment"),
        }
    }

    #[test]
    fn test_ray_extent_hits_edges() {
        let f = frame();
        assert_relative_eq!(f.ray_extent(0.0), 0.3);
        assert_relative_eq!(f.ray_extent(FRAC_PI_2), 0.2, epsilon = 1e-12);
        assert_relative_eq!(f.ray_extent(PI), 0.3, epsilon = 1e-12);
        assert_relative_eq!(f.ray_extent(PI / 4.0), 0.2 * 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_sector_overlay_rays_end_on_detector_edge() {
        let policy = AveragingPolicy::Sector {
            window: AzimuthWindow {
                phi: 0.0,
                dphi: 10_f64.to_radians(),
            },
            section: DetectorSection::Right,
        };
        let shapes = overlay(&policy, &frame(), 100.0, 6.0);
        assert_eq!(shapes.len(), 2);
        for shape in &shapes {
            assert_relative_eq!(end(shape).0, 0.3, epsilon = 1e-12);
        }

        let both = AveragingPolicy::Sector {
            window: AzimuthWindow {
                phi: 0.0,
                dphi: 10_f64.to_radians(),
            },
            section: DetectorSection::Both,
        };
        assert_eq!(overlay(&both, &frame(), 100.0, 6.0).len(), 4);
    }

    #[test]
    fn test_sector_overlay_follows_detector_half() {
        let sector = |phi: f64, section| AveragingPolicy::Sector {
            window: AzimuthWindow {
                phi: phi.to_radians(),
                dphi: 10_f64.to_radians(),
            },
            section,
        };
        // at 135 degrees the right half holds only the mirrored wedge
        let shapes = overlay(&sector(135.0, DetectorSection::Right), &frame(), 100.0, 6.0);
        assert_eq!(shapes.len(), 2);
        for shape in &shapes {
            assert!(end(shape).0 > 0.0);
        }
        let shapes = overlay(&sector(135.0, DetectorSection::Left), &frame(), 100.0, 6.0);
        assert_eq!(shapes.len(), 2);
        for shape in &shapes {
            assert!(end(shape).0 < 0.0);
        }

        // a vertical wedge straddles both halves
        let shapes = overlay(&sector(90.0, DetectorSection::Right), &frame(), 100.0, 6.0);
        assert_eq!(shapes.len(), 4);
    }

    #[test]
    fn test_annular_overlay_is_two_circles() {
        let policy = AveragingPolicy::Annular {
            q_min: 0.05,
            q_max: 0.07,
        };
        let shapes = overlay(&policy, &frame(), 100.0, 6.0);
        assert_eq!(shapes.len(), 2);
        assert!(matches!(shapes[1], OverlayShape::Arc { radius, .. } if radius == 0.07));

        let touching = AveragingPolicy::Annular {
            q_min: -0.01,
            q_max: 0.01,
        };
        assert_eq!(overlay(&touching, &frame(), 100.0, 6.0).len(), 1);
    }

    #[test]
    fn test_rectangular_overlay_offsets() {
        let policy = AveragingPolicy::Rectangular {
            phi: 0.0,
            half_width_cm: 1.0,
            section: DetectorSection::Right,
        };
        let shapes = overlay(&policy, &frame(), 100.0, 6.0);
        assert_eq!(shapes.len(), 2);
        let expected = q_from_distance(1.0, 100.0, 6.0);
        match shapes[1] {
            OverlayShape::Segment { from, .. } => {
                assert_relative_eq!(from.1, expected, epsilon = 1e-12);
            }
            OverlayShape::Arc { .. } => panic!("expected segment"),
        }
    }

    #[test]
    fn test_circular_overlay_is_detector_outline() {
        let shapes = overlay(&AveragingPolicy::Circular, &frame(), 100.0, 6.0);
        assert_eq!(shapes.len(), 4);
    }
}
