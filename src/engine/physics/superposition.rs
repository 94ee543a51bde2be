// ABOUTME: Superimposition resolver - one velocity multiplier per cell from competing zones
// ABOUTME: Priority tables vs wake weighting, nested-cavity elimination, rule-D tie accounting

use geo::{Contains, Point};

use super::factors::{self, RefHeight, WindFactor};
use super::pointgrid::{CellZones, ZoneClaim};
use crate::engine::zones::{VegetationZone, Zone, ZoneKind};

/// The single multiplier tuple a cell ends up with
#[derive(Debug, Clone, Copy)]
pub struct ResolvedFactor {
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub ref_height: RefHeight,
    pub block_height: f64,
}

/// Bookkeeping for ambiguous upstream ties ("rule D")
#[derive(Debug, Default)]
pub struct RuleDCounter {
    pub occurrences: usize,
}

/// Remove cavity claims nested inside another claiming cavity
///
/// A cavity whose wall point lies strictly inside a second, more upstream
/// cavity is an inner recirculation already accounted for by the outer one.
/// Two elimination passes cover inner-inner-inner stacks of realistic depth.
pub fn eliminate_nested_cavities(cell: &mut CellZones, zones: &[Zone], x: f64) {
    for _ in 0..2 {
        let cavity_claims: Vec<(usize, f64, usize)> = cell
            .claims
            .iter()
            .enumerate()
            .filter(|(_, c)| zones[c.zone_index].kind == ZoneKind::Cavity)
            .map(|(slot, c)| (slot, c.y_wall, c.zone_index))
            .collect();
        if cavity_claims.len() < 2 {
            return;
        }

        let mut doomed: Vec<usize> = Vec::new();
        for &(slot_a, y_wall_a, _) in &cavity_claims {
            let wall_point = Point::new(x, y_wall_a);
            for &(slot_b, y_wall_b, zone_b) in &cavity_claims {
                if slot_a == slot_b || y_wall_b <= y_wall_a {
                    continue;
                }
                if zones[zone_b].polygon.contains(&wall_point) {
                    doomed.push(slot_a);
                    break;
                }
            }
        }
        if doomed.is_empty() {
            return;
        }
        doomed.sort_unstable();
        for slot in doomed.into_iter().rev() {
            cell.claims.remove(slot);
        }
    }
}

/// Pick the winning candidate: most upstream wall, then tallest obstacle,
/// then the fixed zone priority (counting rule-D fallbacks)
fn pick_winner<'a>(
    candidates: &'a [(usize, &ZoneClaim, WindFactor)],
    zones: &[Zone],
    rule_d: &mut RuleDCounter,
) -> Option<&'a (usize, &'a ZoneClaim, WindFactor)> {
    const TIE: f64 = 1e-9;
    let mut best: Option<&(usize, &ZoneClaim, WindFactor)> = None;
    for candidate in candidates {
        let Some(current) = best else {
            best = Some(candidate);
            continue;
        };
        let (zone_new, claim_new, _) = candidate;
        let (zone_cur, claim_cur, _) = current;

        let wall_delta = claim_new.y_wall - claim_cur.y_wall;
        if wall_delta > TIE {
            best = Some(candidate);
            continue;
        }
        if wall_delta < -TIE {
            continue;
        }
        let height_delta = zones[*zone_new].height - zones[*zone_cur].height;
        if height_delta > TIE {
            best = Some(candidate);
            continue;
        }
        if height_delta < -TIE {
            continue;
        }
        // Same wall, same height: the fixed table decides
        rule_d.occurrences += 1;
        if zones[*zone_new].kind.priority() < zones[*zone_cur].kind.priority() {
            best = Some(candidate);
        }
    }
    best
}

/// Resolve every zone claiming the cell at height `z` into one multiplier
///
/// Priority-table zones give the baseline; the most upstream wake weights the
/// u and w components when its source stands upstream of and taller than the
/// baseline's source; vegetation then attenuates the horizontal components.
#[allow(clippy::too_many_arguments)]
pub fn resolve_cell(
    cell: &CellZones,
    zones: &[Zone],
    veg_zones: &[VegetationZone],
    z: f64,
    z_ref: f64,
    z0: f64,
    d: f64,
    rule_d: &mut RuleDCounter,
) -> Option<ResolvedFactor> {
    let mut priority_set: Vec<(usize, &ZoneClaim, WindFactor)> = Vec::new();
    let mut weighting_set: Vec<(usize, &ZoneClaim, WindFactor)> = Vec::new();

    for claim in &cell.claims {
        let zone = &zones[claim.zone_index];
        let Some(factor) = factors::zone_factor(zone, claim, z, z_ref) else {
            continue;
        };
        if factors::is_weighting_kind(zone.kind) {
            weighting_set.push((claim.zone_index, claim, factor));
        } else {
            priority_set.push((claim.zone_index, claim, factor));
        }
    }

    let baseline = pick_winner(&priority_set, zones, rule_d).copied();
    let wake = pick_winner(&weighting_set, zones, rule_d).copied();

    let mut resolved = match (baseline, wake) {
        (Some((zone_index, claim, factor)), wake) => {
            let mut resolved = ResolvedFactor {
                u: factor.u,
                v: factor.v,
                w: factor.w,
                ref_height: factor.ref_height,
                block_height: factor.block_height,
            };
            if let Some((wake_zone, wake_claim, wake_factor)) = wake {
                let upstream = wake_claim.y_wall > claim.y_wall;
                let taller = zones[wake_zone].height > zones[zone_index].height;
                if upstream && taller {
                    resolved.u *= wake_factor.u;
                    resolved.w *= wake_factor.w;
                    resolved.ref_height = RefHeight::PointHeight;
                }
            }
            resolved
        }
        (None, Some((_, _, factor))) => ResolvedFactor {
            u: factor.u,
            v: factor.v,
            w: factor.w,
            ref_height: factor.ref_height,
            block_height: factor.block_height,
        },
        (None, None) => {
            if cell.veg.is_empty() {
                return None;
            }
            // Vegetation-only cell: attenuated background flow
            ResolvedFactor {
                u: 0.0,
                v: 1.0,
                w: 0.0,
                ref_height: RefHeight::PointHeight,
                block_height: 0.0,
            }
        }
    };

    let mut veg_weight: Option<f64> = None;
    for &veg_index in &cell.veg {
        if let Some(factor) =
            factors::vegetation_factor(&veg_zones[veg_index], z, cell.canopy_top, z0, d)
        {
            veg_weight = Some(match veg_weight {
                None => factor,
                Some(current) => current.min(factor),
            });
        }
    }
    if let Some(weight) = veg_weight {
        resolved.u *= weight;
        resolved.v *= weight;
        resolved.ref_height = RefHeight::PointHeight;
    } else if cell.claims.is_empty() && !cell.veg.is_empty() {
        // Vegetation present but inert at this height: background flow
        return None;
    }

    Some(resolved)
}
