// ABOUTME: Building merge and stacking - blocks, stacked blocks, base and cavity-base heights
// ABOUTME: Groups touching buildings, slices each group into one footprint per height band

use geo::{Area, BooleanOps, EuclideanDistance, MultiPolygon, Polygon, Simplify};

use super::{Building, GEOMETRY_MERGE_TOLERANCE, GEOMETRY_SIMPLIFICATION_DISTANCE, primitives};
use crate::engine::error::{Warning, WarningKind};

/// Footprints below this area are dropped as degenerate (m²)
const MIN_BLOCK_AREA: f64 = 1e-6;

/// A horizontal group of touching buildings, independent of height
#[derive(Debug, Clone)]
pub struct Block {
    pub id: usize,
    pub footprint: Polygon<f64>,
}

/// One footprint per (block, height) pair: the union of all member buildings
/// reaching at least that height
#[derive(Debug, Clone)]
pub struct StackedBlock {
    pub id: usize,
    pub block_id: usize,
    pub footprint: Polygon<f64>,
    /// Roof height (m)
    pub height: f64,
    /// Height of the supporting roof below, 0 at ground level (m)
    pub base_height: f64,
    /// Height the cavity sheds from; below `base_height` for partial stacking (m)
    pub cavity_base: f64,
}

/// Merge buildings into blocks
///
/// Buildings closer than `GEOMETRY_MERGE_TOLERANCE` are grouped (union-find),
/// each group's footprints are unioned and simplified, and every resulting
/// connected polygon becomes one block. Degenerate inputs are skipped with a
/// warning.
pub fn build_blocks(buildings: &[Building], warnings: &mut Vec<Warning>) -> Vec<Block> {
    let valid: Vec<&Building> = buildings
        .iter()
        .filter(|b| {
            let ok = b.footprint.unsigned_area() > MIN_BLOCK_AREA && b.height > 0.0;
            if !ok {
                warnings.push(Warning::new(
                    WarningKind::DegenerateGeometry,
                    format!("building {} has zero area or non-positive height", b.id),
                ));
            }
            ok
        })
        .collect();

    // Union-find over sub-tolerance distances
    let mut parent: Vec<usize> = (0..valid.len()).collect();
    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        if parent[i] != i {
            let up = parent[i];
            let root = find(parent, up);
            parent[i] = root;
        }
        parent[i]
    }
    for i in 0..valid.len() {
        for j in (i + 1)..valid.len() {
            if valid[i].footprint.euclidean_distance(&valid[j].footprint)
                <= GEOMETRY_MERGE_TOLERANCE
            {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    let mut groups: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
    for i in 0..valid.len() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }

    let mut blocks = Vec::new();
    let mut next_id = 0;
    for members in groups.values() {
        let mut merged = MultiPolygon::new(vec![valid[members[0]].footprint.clone()]);
        for &m in &members[1..] {
            merged = merged.union(&MultiPolygon::new(vec![valid[m].footprint.clone()]));
        }
        for poly in merged {
            let simplified = poly.simplify(&GEOMETRY_SIMPLIFICATION_DISTANCE);
            if simplified.unsigned_area() <= MIN_BLOCK_AREA {
                continue;
            }
            blocks.push(Block {
                id: next_id,
                footprint: simplified,
            });
            next_id += 1;
        }
    }
    blocks
}

/// Slice each block into stacked blocks, one per distinct member roof height
///
/// Heights are truncated to whole meters first so near-equal roofs collapse
/// into one band. Base heights are not assigned here; they depend on the
/// wind-aligned frame and are computed after rotation.
pub fn build_stacked_blocks(
    blocks: &[Block],
    buildings: &[Building],
    warnings: &mut Vec<Warning>,
) -> Vec<StackedBlock> {
    let mut stacked = Vec::new();
    let mut next_id = 0;

    for block in blocks {
        let members: Vec<&Building> = buildings
            .iter()
            .filter(|b| {
                b.height > 0.0
                    && b.footprint.unsigned_area() > MIN_BLOCK_AREA
                    && b.footprint.euclidean_distance(&block.footprint) <= GEOMETRY_MERGE_TOLERANCE
            })
            .collect();
        if members.is_empty() {
            continue;
        }

        let mut heights: Vec<i64> = members.iter().map(|b| b.height.trunc() as i64).collect();
        heights.sort_unstable();
        heights.dedup();

        for &band in &heights {
            if band <= 0 {
                warnings.push(Warning::new(
                    WarningKind::DegenerateGeometry,
                    format!("block {}: sub-meter height band dropped", block.id),
                ));
                continue;
            }
            let tall_enough: Vec<&&Building> = members
                .iter()
                .filter(|b| b.height.trunc() as i64 >= band)
                .collect();
            let mut merged = MultiPolygon::new(vec![tall_enough[0].footprint.clone()]);
            for b in &tall_enough[1..] {
                merged = merged.union(&MultiPolygon::new(vec![b.footprint.clone()]));
            }
            for poly in merged {
                let simplified = poly.simplify(&GEOMETRY_SIMPLIFICATION_DISTANCE);
                if simplified.unsigned_area() <= MIN_BLOCK_AREA {
                    continue;
                }
                stacked.push(StackedBlock {
                    id: next_id,
                    block_id: block.id,
                    footprint: simplified,
                    height: band as f64,
                    base_height: 0.0,
                    cavity_base: 0.0,
                });
                next_id += 1;
            }
        }
    }
    stacked
}

/// Assign base and cavity-base heights within each block group
///
/// The supporting block P of a stacked block S is the tallest strictly-lower
/// member of the same group whose footprint intersects S. S sits on P's roof;
/// when P only partially underlies S the cavity base interpolates toward P's
/// own cavity base by the envelope x-extent ratio, recursively up the stack.
pub fn assign_base_heights(stacked: &mut [StackedBlock]) {
    let mut order: Vec<usize> = (0..stacked.len()).collect();
    order.sort_by(|&a, &b| stacked[a].height.partial_cmp(&stacked[b].height).unwrap());

    for &s in &order {
        let mut support: Option<usize> = None;
        for &p in &order {
            if stacked[p].block_id != stacked[s].block_id
                || stacked[p].height >= stacked[s].height
            {
                continue;
            }
            if !geo::Intersects::intersects(&stacked[p].footprint, &stacked[s].footprint) {
                continue;
            }
            match support {
                Some(cur) if stacked[cur].height >= stacked[p].height => {}
                _ => support = Some(p),
            }
        }

        let Some(p) = support else {
            stacked[s].base_height = 0.0;
            stacked[s].cavity_base = 0.0;
            continue;
        };

        stacked[s].base_height = stacked[p].height;

        // Cross-wind coverage of the support decides how far down the cavity
        // sheds: a full-width upper block recirculates to the support's own
        // cavity base, a narrow tower only to the support's roof.
        let s_extent = primitives::envelope(&stacked[s].footprint)
            .map(|r| r.width())
            .unwrap_or(0.0);
        let p_extent = primitives::envelope(&stacked[p].footprint)
            .map(|r| r.width())
            .unwrap_or(0.0);
        let ratio = if p_extent > 0.0 {
            (s_extent / p_extent).min(1.0)
        } else {
            1.0
        };
        let base = stacked[s].base_height;
        stacked[s].cavity_base = base - ratio * (base - stacked[p].cavity_base);
    }
}
