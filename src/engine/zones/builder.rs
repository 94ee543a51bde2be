// ABOUTME: Zone construction - ellipses, splits and clips that carve flow regions from obstacles
// ABOUTME: Kaplan-Dinar ellipsoids, Nelson cavity merging, Bagal/Pol rooftop parameterizations

use std::collections::BTreeMap;

use geo::{
    Area, BooleanOps, BoundingRect, Intersects, Line, LineString, MultiPolygon, Point, Polygon,
    Rotate, coord,
};

use super::{VegetationZone, Zone, ZoneDetail, ZoneKind};
use crate::engine::error::{Warning, WarningKind};
use crate::engine::geometry::blocks::StackedBlock;
use crate::engine::geometry::facades::UpwindFacade;
use crate::engine::geometry::indicators::ZoneLengths;
use crate::engine::geometry::{VegetationPatch, primitives};

/// Rooftop/displacement vortex activation band around the perpendicular (deg)
pub const PERPENDICULAR_THRESHOLD_ANGLE: f64 = 15.0;
/// Corner vortex activation band, degrees off the perpendicular
pub const CORNER_THRESHOLD_ANGLE: (f64, f64) = (30.0, 70.0);

/// Zone pieces smaller than this are construction slivers (m²)
const MIN_ZONE_AREA: f64 = 1e-4;

fn facade_length(line: &Line<f64>) -> f64 {
    let dx = line.end.x - line.start.x;
    let dy = line.end.y - line.start.y;
    (dx * dx + dy * dy).sqrt()
}

fn facade_midpoint(line: &Line<f64>) -> geo::Coord<f64> {
    coord! {
        x: (line.start.x + line.end.x) / 2.0,
        y: (line.start.y + line.end.y) / 2.0,
    }
}

/// Displacement and displacement-vortex zones, one per upwind facade
///
/// Ellipse centered at the facade midpoint: cross-wind full axis the facade
/// length, along-wind full axis 2·Lf·sin²θ (Lfv for the vortex), rotated into
/// the facade direction; the upwind half is kept. The vortex variant exists
/// only for near-perpendicular facades (Kaplan & Dinar 1996, Bagal et al.
/// 2004).
pub fn displacement_zones(
    facades: &[UpwindFacade],
    lengths: &BTreeMap<usize, ZoneLengths>,
    blocks: &BTreeMap<usize, StackedBlock>,
    mesh_size: f64,
) -> (Vec<Zone>, Vec<Zone>) {
    let ellipsoid_min_length = mesh_size / 4.0;
    let mut displacement = Vec::new();
    let mut vortex = Vec::new();

    for facade in facades {
        let Some(z) = lengths.get(&facade.stacked_block_id) else {
            continue;
        };
        let Some(block) = blocks.get(&facade.stacked_block_id) else {
            continue;
        };
        let sin2 = facade.theta.sin() * facade.theta.sin();
        let perpendicular = (facade.theta.to_degrees() - 90.0).abs() < PERPENDICULAR_THRESHOLD_ANGLE;

        let mut build = |axis: f64, kind: ZoneKind, out: &mut Vec<Zone>| {
            let ellipse = primitives::make_ellipse(
                facade_midpoint(&facade.line),
                facade_length(&facade.line),
                2.0 * axis,
            );
            let rotated = ellipse.rotate_around_point(
                (std::f64::consts::FRAC_PI_2 - facade.theta).to_degrees(),
                Point::from(facade_midpoint(&facade.line)),
            );
            let direction = coord! {
                x: facade.line.end.x - facade.line.start.x,
                y: facade.line.end.y - facade.line.start.y,
            };
            // The upwind side is to the left of the start-to-end direction on a
            // clockwise exterior ring
            let upwind_half = primitives::clip_to_half_plane(
                &MultiPolygon::new(vec![rotated]),
                facade.line.start,
                direction,
                true,
            );
            let clipped = upwind_half.difference(&MultiPolygon::new(vec![block.footprint.clone()]));
            for piece in clipped {
                if piece.unsigned_area() < MIN_ZONE_AREA {
                    continue;
                }
                let detail = match kind {
                    ZoneKind::Displacement => ZoneDetail::Displacement { lf: z.lf },
                    _ => ZoneDetail::DisplacementVortex { lfv: z.lfv },
                };
                out.push(Zone {
                    kind,
                    polygon: piece,
                    source_block: facade.stacked_block_id,
                    height: facade.height,
                    base: facade.base_height,
                    theta: facade.theta,
                    facade_id: Some(facade.id),
                    detail,
                });
            }
        };

        // Facades nearly parallel to the wind shed no resolvable ellipse
        let displacement_axis = z.lf * sin2;
        if displacement_axis > ellipsoid_min_length {
            build(displacement_axis, ZoneKind::Displacement, &mut displacement);
        }
        if perpendicular {
            build(z.lfv * sin2, ZoneKind::DisplacementVortex, &mut vortex);
        }
    }
    (displacement, vortex)
}

/// Cavity and wake zones, one per stacked block
///
/// Half-ellipse hung from the downwind edge of the envelope, merged with the
/// envelope and cut back at the block outline (Nelson et al. 2008, figure 1);
/// the piece reaching farthest downwind is the zone.
pub fn cavity_and_wake_zones(
    stacked: &[StackedBlock],
    lengths: &BTreeMap<usize, ZoneLengths>,
    warnings: &mut Vec<Warning>,
) -> (Vec<Zone>, Vec<Zone>) {
    let mut cavities = Vec::new();
    let mut wakes = Vec::new();

    for block in stacked {
        let Some(z) = lengths.get(&block.id) else {
            warnings.push(Warning::new(
                WarningKind::DegenerateGeometry,
                format!("stacked block {}: degenerate footprint, zones skipped", block.id),
            ));
            continue;
        };
        let Some(envelope) = primitives::envelope(&block.footprint) else {
            continue;
        };

        for (half_axis, kind) in [(z.lr, ZoneKind::Cavity), (z.lw, ZoneKind::Wake)] {
            let center = coord! {
                x: (envelope.min().x + envelope.max().x) / 2.0,
                y: envelope.min().y,
            };
            let ellipse = primitives::make_ellipse(center, envelope.width(), 2.0 * half_axis);
            let merged = MultiPolygon::new(vec![ellipse]).union(&MultiPolygon::new(vec![
                envelope.to_polygon(),
            ]));
            let outside =
                merged.difference(&MultiPolygon::new(vec![block.footprint.clone()]));
            let Some(piece) = primitives::downwind_component(outside) else {
                warnings.push(Warning::new(
                    WarningKind::DegenerateGeometry,
                    format!("stacked block {}: infeasible {kind:?} zone", block.id),
                ));
                continue;
            };
            let zone = Zone {
                kind,
                polygon: piece,
                source_block: block.id,
                height: block.height,
                base: block.cavity_base,
                theta: std::f64::consts::FRAC_PI_2,
                facade_id: None,
                detail: match kind {
                    ZoneKind::Cavity => ZoneDetail::Cavity { lr: z.lr },
                    _ => ZoneDetail::Wake { lr: z.lr, lw: z.lw },
                },
            };
            match kind {
                ZoneKind::Cavity => cavities.push(zone),
                _ => wakes.push(zone),
            }
        }
    }
    (cavities, wakes)
}

/// Street canyon zones between an upwind facade and the cavity of an
/// upstream block
///
/// Where a facade of block A crosses the cavity of block B, the crossing is
/// extended upstream past B by B's y-extent plus Lr and cut back at B's
/// footprint; the band between the two buildings remains (Nelson et al. 2008,
/// figure 8b, with the cavity standing in for the Lr buffer).
pub fn street_canyon_zones(
    cavity_zones: &[Zone],
    facades: &[UpwindFacade],
    blocks: &BTreeMap<usize, StackedBlock>,
    lengths: &BTreeMap<usize, ZoneLengths>,
    warnings: &mut Vec<Warning>,
) -> Vec<Zone> {
    let mut canyons = Vec::new();

    for cavity in cavity_zones {
        let upstream_id = cavity.source_block;
        let (Some(upstream), Some(upstream_lengths)) =
            (blocks.get(&upstream_id), lengths.get(&upstream_id))
        else {
            continue;
        };
        let Some(upstream_envelope) = primitives::envelope(&upstream.footprint) else {
            continue;
        };
        let extend = upstream_envelope.height() + upstream_lengths.lr;

        for facade in facades {
            if facade.stacked_block_id == upstream_id {
                continue;
            }
            if !facade.line.intersects(&cavity.polygon) {
                continue;
            }
            let pieces = primitives::clip_segment_to_polygon(facade.line, &cavity.polygon);
            for piece in pieces {
                if facade_length(&piece) < crate::engine::geometry::SNAPPING_TOLERANCE {
                    continue;
                }
                let band = Polygon::new(
                    LineString::new(vec![
                        piece.start,
                        piece.end,
                        coord! { x: piece.end.x, y: piece.end.y + extend },
                        coord! { x: piece.start.x, y: piece.start.y + extend },
                        piece.start,
                    ]),
                    vec![],
                );
                let cut = MultiPolygon::new(vec![band])
                    .difference(&MultiPolygon::new(vec![upstream.footprint.clone()]));
                let probe = coord! {
                    x: (piece.start.x + piece.end.x) / 2.0,
                    y: (piece.start.y + piece.end.y) / 2.0 + 1e-6,
                };
                let Some(polygon) = primitives::component_containing(cut, probe) else {
                    warnings.push(Warning::new(
                        WarningKind::DegenerateGeometry,
                        format!(
                            "facade {} / block {}: street canyon collapsed to nothing",
                            facade.id, upstream_id
                        ),
                    ));
                    continue;
                };
                if polygon.unsigned_area() < MIN_ZONE_AREA {
                    continue;
                }
                canyons.push(Zone {
                    kind: ZoneKind::StreetCanyon,
                    polygon,
                    source_block: facade.stacked_block_id,
                    height: cavity.height,
                    base: 0.0,
                    theta: facade.theta,
                    facade_id: Some(facade.id),
                    detail: ZoneDetail::StreetCanyon {
                        upstream_block: upstream_id,
                        downstream_block: facade.stacked_block_id,
                        upstream_height: cavity.height,
                        downstream_height: facade.height,
                    },
                });
            }
        }
    }
    canyons
}

/// Rooftop recirculation zones, perpendicular and corner variants
///
/// Near-perpendicular facades shed a recirculation of length Lc across the
/// roof (Pol et al. 2006); oblique facades in the corner band shed a
/// triangular vortex whose reach follows the Bagal et al. (2004) tangent law.
pub fn rooftop_zones(
    facades: &[UpwindFacade],
    blocks: &BTreeMap<usize, StackedBlock>,
    lengths: &BTreeMap<usize, ZoneLengths>,
    warnings: &mut Vec<Warning>,
) -> (Vec<Zone>, Vec<Zone>) {
    let mut perpendicular = Vec::new();
    let mut corner = Vec::new();
    let half_pi = std::f64::consts::FRAC_PI_2;

    for facade in facades {
        let (Some(block), Some(z)) = (
            blocks.get(&facade.stacked_block_id),
            lengths.get(&facade.stacked_block_id),
        ) else {
            continue;
        };
        let theta_deg = facade.theta.to_degrees();
        let off_perpendicular = (theta_deg - 90.0).abs();

        if off_perpendicular < PERPENDICULAR_THRESHOLD_ANGLE {
            // Rectangle pushed downwind across the roof
            let roof_band = Polygon::new(
                LineString::new(vec![
                    facade.line.start,
                    coord! { x: facade.line.start.x, y: facade.line.start.y - z.lc },
                    coord! { x: facade.line.end.x, y: facade.line.end.y - z.lc },
                    facade.line.end,
                    facade.line.start,
                ]),
                vec![],
            );
            push_roof_pieces(
                roof_band,
                block,
                facade,
                ZoneKind::RooftopPerpendicular,
                ZoneDetail::RooftopPerpendicular { hcm: z.hcm, lc: z.lc },
                &mut perpendicular,
                warnings,
            );
        } else if off_perpendicular > CORNER_THRESHOLD_ANGLE.0
            && off_perpendicular < CORNER_THRESHOLD_ANGLE.1
        {
            let length = facade_length(&facade.line);
            // Signed corner reach; negative in the activation band
            let lcc_signed =
                2.0 * length * (2.94 * (0.0297 * (half_pi - facade.theta).abs()).exp()).tan();
            let apex = if facade.theta < half_pi {
                coord! {
                    x: facade.line.start.x - lcc_signed * (half_pi - facade.theta).sin(),
                    y: facade.line.start.y + lcc_signed * (half_pi - facade.theta).cos(),
                }
            } else {
                coord! {
                    x: facade.line.end.x + lcc_signed * (facade.theta - half_pi).sin(),
                    y: facade.line.end.y + lcc_signed * (facade.theta - half_pi).cos(),
                }
            };
            let triangle = Polygon::new(
                LineString::new(vec![facade.line.start, facade.line.end, apex, facade.line.start]),
                vec![],
            );
            push_roof_pieces(
                triangle,
                block,
                facade,
                ZoneKind::RooftopCorner,
                ZoneDetail::RooftopCorner {
                    hcm: z.hcm,
                    c1: z.c1,
                    lcc: lcc_signed.abs(),
                    facade_length: length,
                },
                &mut corner,
                warnings,
            );
        }
    }
    (perpendicular, corner)
}

fn push_roof_pieces(
    shape: Polygon<f64>,
    block: &StackedBlock,
    facade: &UpwindFacade,
    kind: ZoneKind,
    detail: ZoneDetail,
    out: &mut Vec<Zone>,
    warnings: &mut Vec<Warning>,
) {
    let on_roof = MultiPolygon::new(vec![shape])
        .intersection(&MultiPolygon::new(vec![block.footprint.clone()]));
    let mut found = false;
    for piece in on_roof {
        if piece.unsigned_area() < MIN_ZONE_AREA {
            continue;
        }
        found = true;
        out.push(Zone {
            kind,
            polygon: piece,
            source_block: facade.stacked_block_id,
            height: facade.height,
            base: facade.height,
            theta: facade.theta,
            facade_id: Some(facade.id),
            detail: detail.clone(),
        });
    }
    if !found {
        warnings.push(Warning::new(
            WarningKind::DegenerateGeometry,
            format!("facade {}: {kind:?} zone fell off the roof", facade.id),
        ));
    }
}

/// Split vegetation patches against the union of all building wakes
///
/// The part of a patch inside any wake follows the built vegetation scheme,
/// the rest the open scheme.
pub fn vegetation_zones(
    patches: &[VegetationPatch],
    wake_zones: &[Zone],
) -> Vec<VegetationZone> {
    let mut wakes_union: Option<MultiPolygon<f64>> = None;
    for wake in wake_zones {
        let mp = MultiPolygon::new(vec![wake.polygon.clone()]);
        wakes_union = Some(match wakes_union {
            None => mp,
            Some(acc) => acc.union(&mp),
        });
    }

    let mut zones = Vec::new();
    for patch in patches {
        // A patch without a usable coefficient attenuates like the default
        // canopy
        let attenuation = if patch.attenuation > 0.0 {
            patch.attenuation
        } else {
            crate::engine::geometry::DEFAULT_VEG_ATTENUATION
        };
        let patch_mp = MultiPolygon::new(vec![patch.footprint.clone()]);
        let (built, open) = match &wakes_union {
            Some(wakes) => (patch_mp.intersection(wakes), patch_mp.difference(wakes)),
            None => (MultiPolygon::new(vec![]), patch_mp),
        };
        for (parts, is_built) in [(built, true), (open, false)] {
            for polygon in parts {
                if polygon.unsigned_area() < MIN_ZONE_AREA {
                    continue;
                }
                zones.push(VegetationZone {
                    polygon,
                    patch_id: patch.id,
                    crown_base: patch.crown_base,
                    crown_top: patch.crown_top,
                    attenuation,
                    built: is_built,
                });
            }
        }
    }
    zones
}
