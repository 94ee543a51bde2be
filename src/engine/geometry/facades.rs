// ABOUTME: Upwind facade extraction - directed boundary segments facing the incoming wind
// ABOUTME: Operates in the wind-aligned frame; azimuth in (0, pi) marks an upwind face

use geo::Line;
use geo::algorithm::winding_order::Winding;

use super::blocks::StackedBlock;
use super::{SNAPPING_TOLERANCE, primitives};
use crate::engine::core::math::azimuth;

/// Segments shorter than this are noise left by simplification (m)
const MIN_FACADE_LENGTH: f64 = 0.01;

/// An upwind facade of a stacked block, with the angle the wind meets it at
#[derive(Debug, Clone)]
pub struct UpwindFacade {
    pub id: usize,
    pub stacked_block_id: usize,
    pub line: Line<f64>,
    /// Azimuth of the start-to-end direction, clockwise from north, in (0, π).
    /// π/2 means the facade is perpendicular to the incoming wind.
    pub theta: f64,
    /// Roof height of the parent stacked block (m)
    pub height: f64,
    /// Height the facade starts at (m)
    pub base_height: f64,
}

/// Explode stacked-block boundaries into upwind facades
///
/// Exterior rings are normalized to clockwise winding first; on a clockwise
/// ring the segments whose direction has an eastward component (azimuth in
/// (0, π)) are exactly the north-facing ones.
pub fn extract_upwind_facades(stacked: &[StackedBlock]) -> Vec<UpwindFacade> {
    let mut facades = Vec::new();
    let mut next_id = 0;

    for block in stacked {
        let mut exterior = block.footprint.exterior().clone();
        exterior.make_cw_winding();
        // Courtyard walls face the wind too; a counter-clockwise hole ring puts
        // its north-facing inner walls at azimuth (0, π) just like the exterior
        let mut rings = vec![exterior];
        for hole in block.footprint.interiors() {
            let mut ring = hole.clone();
            ring.make_ccw_winding();
            rings.push(ring);
        }

        for ring in &rings {
            for segment in ring.lines() {
                let dx = segment.end.x - segment.start.x;
                let dy = segment.end.y - segment.start.y;
                if (dx * dx + dy * dy).sqrt() < MIN_FACADE_LENGTH {
                    continue;
                }
                let theta = azimuth(dx, dy);
                if theta <= 0.0 || theta >= std::f64::consts::PI {
                    continue;
                }
                facades.push(UpwindFacade {
                    id: next_id,
                    stacked_block_id: block.id,
                    line: segment,
                    theta,
                    height: block.height,
                    base_height: block.base_height,
                });
                next_id += 1;
            }
        }
    }
    facades
}

/// Raise facade bases where the facade lies on a lower stacked block
///
/// A facade of an upper stacked block that runs across the roof of a lower
/// member of the same group only meets the wind above that roof.
pub fn update_facade_bases(facades: &mut [UpwindFacade], stacked: &[StackedBlock]) {
    for facade in facades.iter_mut() {
        let Some(owner) = stacked.iter().find(|s| s.id == facade.stacked_block_id) else {
            continue;
        };
        for lower in stacked {
            if lower.block_id != owner.block_id || lower.height >= owner.height {
                continue;
            }
            let covered: f64 =
                primitives::clip_segment_to_polygon(facade.line, &lower.footprint)
                    .iter()
                    .map(|l| {
                        let dx = l.end.x - l.start.x;
                        let dy = l.end.y - l.start.y;
                        (dx * dx + dy * dy).sqrt()
                    })
                    .sum();
            if covered > SNAPPING_TOLERANCE && lower.height > facade.base_height {
                facade.base_height = lower.height;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{LineString, Polygon};
    use std::f64::consts::PI;

    fn stacked(id: usize, block_id: usize, poly: Polygon<f64>, height: f64) -> StackedBlock {
        StackedBlock {
            id,
            block_id,
            footprint: poly,
            height,
            base_height: 0.0,
            cavity_base: 0.0,
        }
    }

    fn rect_poly(x0: f64, y0: f64, w: f64, h: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (x0, y0),
                (x0 + w, y0),
                (x0 + w, y0 + h),
                (x0, y0 + h),
                (x0, y0),
            ]),
            vec![],
        )
    }

    #[test]
    fn test_rectangle_has_one_upwind_facade() {
        let blocks = vec![stacked(0, 0, rect_poly(0.0, 0.0, 20.0, 10.0), 15.0)];
        let facades = extract_upwind_facades(&blocks);

        // Only the north edge faces the wind, and it is perpendicular to it
        assert_eq!(facades.len(), 1);
        assert_relative_eq!(facades[0].theta, PI / 2.0, epsilon = 1e-9);
        assert_relative_eq!(facades[0].line.start.y, 10.0, epsilon = 1e-9);
        assert_relative_eq!(facades[0].line.end.y, 10.0, epsilon = 1e-9);
        assert_eq!(facades[0].height, 15.0);
    }

    #[test]
    fn test_oblique_block_facade_angles() {
        // Diamond: four edges at 45° to the axes, two facing north-ish
        let diamond = Polygon::new(
            LineString::from(vec![
                (0.0, -10.0),
                (10.0, 0.0),
                (0.0, 10.0),
                (-10.0, 0.0),
                (0.0, -10.0),
            ]),
            vec![],
        );
        let blocks = vec![stacked(0, 0, diamond, 10.0)];
        let facades = extract_upwind_facades(&blocks);
        assert_eq!(facades.len(), 2);
        for facade in &facades {
            assert!(facade.theta > 0.0 && facade.theta < PI);
            let quarter = (facade.theta - PI / 4.0).abs() < 1e-9
                || (facade.theta - 3.0 * PI / 4.0).abs() < 1e-9;
            assert!(quarter, "unexpected theta {}", facade.theta);
        }
    }

    #[test]
    fn test_facade_base_raised_on_podium_roof() {
        // Tower (band 25) stands on a podium (band 10) of the same group; the
        // tower's upwind facade lies inside the podium footprint.
        let podium = stacked(0, 0, rect_poly(0.0, 0.0, 30.0, 30.0), 10.0);
        let mut tower = stacked(1, 0, rect_poly(10.0, 5.0, 10.0, 10.0), 25.0);
        tower.base_height = 10.0;

        let blocks = vec![podium, tower];
        let mut facades = extract_upwind_facades(&blocks);
        update_facade_bases(&mut facades, &blocks);

        let tower_facade = facades
            .iter()
            .find(|f| f.stacked_block_id == 1)
            .expect("tower facade");
        assert_eq!(tower_facade.base_height, 10.0);

        let podium_facade = facades
            .iter()
            .find(|f| f.stacked_block_id == 0)
            .expect("podium facade");
        assert_eq!(podium_facade.base_height, 0.0);
    }
}
