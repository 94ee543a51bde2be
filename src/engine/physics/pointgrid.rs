// ABOUTME: Regular point grid over the zone envelope and per-cell zone membership
// ABOUTME: Records wall position, per-column zone extent and relative position for every claim

use geo::{Polygon, Rect};

use crate::engine::geometry::primitives;
use crate::engine::zones::{VegetationZone, Zone, ZoneKind};

/// The horizontal grid the wind field lives on
///
/// Points are grid nodes spaced `mesh_size` apart, starting at the south-west
/// corner of the expanded zone envelope. The vertical axis is handled by the
/// simulation (levels z_k = k·dz).
#[derive(Debug, Clone)]
pub struct PointGrid {
    pub x0: f64,
    pub y0: f64,
    pub mesh_size: f64,
    pub nx: usize,
    pub ny: usize,
}

impl PointGrid {
    /// Grid covering `rect` at `mesh_size` spacing
    pub fn from_rect(rect: Rect<f64>, mesh_size: f64) -> Self {
        let nx = (rect.width() / mesh_size).floor() as usize + 1;
        let ny = (rect.height() / mesh_size).floor() as usize + 1;
        Self {
            x0: rect.min().x,
            y0: rect.min().y,
            mesh_size,
            nx,
            ny,
        }
    }

    /// Grid covering the envelope of all zone polygons, expanded cross-wind
    /// and along-wind
    pub fn from_zones<'a, I>(
        polygons: I,
        cross_wind_extend: f64,
        along_wind_extend: f64,
        mesh_size: f64,
    ) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Polygon<f64>>,
    {
        let envelope = primitives::envelope_of_all(polygons)?;
        let expanded = primitives::expand_rect(envelope, cross_wind_extend, along_wind_extend);
        Some(Self::from_rect(expanded, mesh_size))
    }

    #[inline]
    pub fn x(&self, i: usize) -> f64 {
        self.x0 + i as f64 * self.mesh_size
    }

    #[inline]
    pub fn y(&self, j: usize) -> f64 {
        self.y0 + j as f64 * self.mesh_size
    }

    #[inline]
    pub fn cell_index(&self, i: usize, j: usize) -> usize {
        i * self.ny + j
    }
}

/// Membership of one grid cell in one zone
#[derive(Debug, Clone)]
pub struct ZoneClaim {
    /// Index into the zone list
    pub zone_index: usize,
    /// Absolute y of the obstacle wall at this column
    pub y_wall: f64,
    /// Along-wind extent of the zone at this column (m)
    pub extent: f64,
    /// Distance from the wall to the point (m)
    pub wall_distance: f64,
    /// Relative position in the zone, 0 at the wall, 1 at the far edge
    pub xi: f64,
}

/// All zone claims of one grid cell
#[derive(Debug, Clone, Default)]
pub struct CellZones {
    pub claims: Vec<ZoneClaim>,
    /// Indices into the vegetation zone list
    pub veg: Vec<usize>,
    /// Tallest crown top among the vegetation claims (m)
    pub canopy_top: f64,
}

/// Wall side of a zone kind: displacement zones hang off the obstacle's north
/// face (wall at the interval's low-y edge), everything else off its south
/// face (wall at the high-y edge)
fn wall_is_south_edge(kind: ZoneKind) -> bool {
    matches!(kind, ZoneKind::Displacement | ZoneKind::DisplacementVortex)
}

/// Intersect every grid column with every zone and record the claims
pub fn assign_points(
    grid: &PointGrid,
    zones: &[Zone],
    veg_zones: &[VegetationZone],
) -> Vec<CellZones> {
    let mut cells = vec![CellZones::default(); grid.nx * grid.ny];

    for (zone_index, zone) in zones.iter().enumerate() {
        let Some(envelope) = primitives::envelope(&zone.polygon) else {
            continue;
        };
        let i_lo = ((envelope.min().x - grid.x0) / grid.mesh_size).ceil().max(0.0) as usize;
        let i_hi = ((envelope.max().x - grid.x0) / grid.mesh_size).floor();
        if i_hi < i_lo as f64 || i_lo >= grid.nx {
            continue;
        }
        let i_hi = (i_hi as usize).min(grid.nx - 1);
        let scan_lo = envelope.min().y - 1.0;
        let scan_hi = envelope.max().y + 1.0;

        for i in i_lo..=i_hi {
            let x = grid.x(i);
            let intervals = primitives::column_intervals(&zone.polygon, x, scan_lo, scan_hi);
            for (lo, hi) in intervals {
                let extent = hi - lo;
                if extent <= 0.0 {
                    continue;
                }
                let y_wall = if wall_is_south_edge(zone.kind) { lo } else { hi };
                let j_lo = ((lo - grid.y0) / grid.mesh_size).ceil().max(0.0) as usize;
                let j_hi = ((hi - grid.y0) / grid.mesh_size).floor();
                if j_hi < j_lo as f64 || j_lo >= grid.ny {
                    continue;
                }
                let j_hi = (j_hi as usize).min(grid.ny - 1);
                for j in j_lo..=j_hi {
                    let y = grid.y(j);
                    let wall_distance = (y_wall - y).abs();
                    cells[grid.cell_index(i, j)].claims.push(ZoneClaim {
                        zone_index,
                        y_wall,
                        extent,
                        wall_distance,
                        xi: (wall_distance / extent).clamp(0.0, 1.0),
                    });
                }
            }
        }
    }

    for (veg_index, veg) in veg_zones.iter().enumerate() {
        let Some(envelope) = primitives::envelope(&veg.polygon) else {
            continue;
        };
        let i_lo = ((envelope.min().x - grid.x0) / grid.mesh_size).ceil().max(0.0) as usize;
        let i_hi = ((envelope.max().x - grid.x0) / grid.mesh_size).floor();
        if i_hi < i_lo as f64 || i_lo >= grid.nx {
            continue;
        }
        let i_hi = (i_hi as usize).min(grid.nx - 1);
        for i in i_lo..=i_hi {
            let x = grid.x(i);
            let intervals = primitives::column_intervals(
                &veg.polygon,
                x,
                envelope.min().y - 1.0,
                envelope.max().y + 1.0,
            );
            for (lo, hi) in intervals {
                let j_lo = ((lo - grid.y0) / grid.mesh_size).ceil().max(0.0) as usize;
                let j_hi = ((hi - grid.y0) / grid.mesh_size).floor();
                if j_hi < j_lo as f64 || j_lo >= grid.ny {
                    continue;
                }
                let j_hi = (j_hi as usize).min(grid.ny - 1);
                for j in j_lo..=j_hi {
                    let cell = &mut cells[grid.cell_index(i, j)];
                    cell.veg.push(veg_index);
                    cell.canopy_top = cell.canopy_top.max(veg.crown_top);
                }
            }
        }
    }

    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{LineString, coord};

    use crate::engine::zones::ZoneDetail;

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

    fn cavity_zone(polygon: Polygon<f64>) -> Zone {
        Zone {
            kind: ZoneKind::Cavity,
            polygon,
            source_block: 0,
            height: 20.0,
            base: 0.0,
            theta: std::f64::consts::FRAC_PI_2,
            facade_id: None,
            detail: ZoneDetail::Cavity { lr: 10.0 },
        }
    }

    #[test]
    fn test_grid_from_rect_dimensions() {
        let rect = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 100.0, y: 50.0 });
        let grid = PointGrid::from_rect(rect, 2.0);
        assert_eq!(grid.nx, 51);
        assert_eq!(grid.ny, 26);
        assert_relative_eq!(grid.x(50), 100.0);
        assert_relative_eq!(grid.y(25), 50.0);
    }

    #[test]
    fn test_cavity_claims_measure_from_north_wall() {
        // Cavity rectangle hanging from a wall at y = 0, reaching y = -10
        let zone = cavity_zone(rect_poly(0.0, -10.0, 20.0, 10.0));
        let grid = PointGrid::from_rect(
            Rect::new(coord! { x: 0.0, y: -10.0 }, coord! { x: 20.0, y: 0.0 }),
            2.0,
        );
        let cells = assign_points(&grid, &[zone], &[]);

        // Point at (10, -4): wall at y = 0, extent 10, ξ = 0.4
        let cell = &cells[grid.cell_index(5, 3)];
        assert_eq!(cell.claims.len(), 1);
        let claim = &cell.claims[0];
        assert_relative_eq!(claim.y_wall, 0.0, epsilon = 1e-9);
        assert_relative_eq!(claim.extent, 10.0, epsilon = 1e-9);
        assert_relative_eq!(claim.wall_distance, 4.0, epsilon = 1e-9);
        assert_relative_eq!(claim.xi, 0.4, epsilon = 1e-9);
    }

    #[test]
    fn test_displacement_claims_measure_from_south_wall() {
        let mut zone = cavity_zone(rect_poly(0.0, 20.0, 20.0, 8.0));
        zone.kind = ZoneKind::Displacement;
        zone.detail = ZoneDetail::Displacement { lf: 8.0 };

        let grid = PointGrid::from_rect(
            Rect::new(coord! { x: 0.0, y: 20.0 }, coord! { x: 20.0, y: 28.0 }),
            2.0,
        );
        let cells = assign_points(&grid, &[zone], &[]);
        // Point (10, 26): facade wall at y = 20 (south edge), distance 6
        let cell = &cells[grid.cell_index(5, 3)];
        assert_eq!(cell.claims.len(), 1);
        assert_relative_eq!(cell.claims[0].y_wall, 20.0, epsilon = 1e-9);
        assert_relative_eq!(cell.claims[0].wall_distance, 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_points_outside_zone_have_no_claims() {
        let zone = cavity_zone(rect_poly(0.0, -10.0, 20.0, 10.0));
        let grid = PointGrid::from_rect(
            Rect::new(coord! { x: -10.0, y: -20.0 }, coord! { x: 30.0, y: 10.0 }),
            2.0,
        );
        let cells = assign_points(&grid, &[zone], &[]);
        // Point well east of the zone
        let cell = &cells[grid.cell_index(19, 5)];
        assert!(cell.claims.is_empty());
    }

    #[test]
    fn test_vegetation_claims_track_canopy_top() {
        let veg = vec![
            VegetationZone {
                polygon: rect_poly(0.0, 0.0, 10.0, 10.0),
                patch_id: 0,
                crown_base: 1.0,
                crown_top: 8.0,
                attenuation: 2.8,
                built: false,
            },
            VegetationZone {
                polygon: rect_poly(5.0, 0.0, 10.0, 10.0),
                patch_id: 1,
                crown_base: 2.0,
                crown_top: 14.0,
                attenuation: 1.5,
                built: false,
            },
        ];
        let grid = PointGrid::from_rect(
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 15.0, y: 10.0 }),
            1.0,
        );
        let cells = assign_points(&grid, &[], &veg);

        // Overlap region sees both patches, canopy top is the taller crown
        let overlap = &cells[grid.cell_index(7, 5)];
        assert_eq!(overlap.veg.len(), 2);
        assert_relative_eq!(overlap.canopy_top, 14.0);

        let only_first = &cells[grid.cell_index(2, 5)];
        assert_eq!(only_first.veg.len(), 1);
        assert_relative_eq!(only_first.canopy_top, 8.0);
    }
}
