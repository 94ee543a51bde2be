// ABOUTME: Simulation orchestrator - runs the whole diagnostic pipeline end to end
// ABOUTME: Geometry prep, zones, factors, superimposition, first guess, SOR solve, rotate back

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use geo::{Coord, Rect, coord};

use crate::engine::config::RunConfig;
use crate::engine::core::Grid3;
use crate::engine::core::math::Vec2;
use crate::engine::diagnostics::{self, MassBalanceValidation, SliceFields};
use crate::engine::error::{ConfigError, Warning, WarningKind};
use crate::engine::geometry::blocks::{self, StackedBlock};
use crate::engine::geometry::rotation::WindRotation;
use crate::engine::geometry::{Building, VegetationPatch, facades, indicators, primitives};
use crate::engine::physics::factors::RefHeight;
use crate::engine::physics::pointgrid::{self, PointGrid};
use crate::engine::physics::profile::VerticalProfile;
use crate::engine::physics::superposition::{self, RuleDCounter};
use crate::engine::solver::{MassSolver, SolverStatus, stagger_first_guess};
use crate::engine::zones::{Zone, builder};

/// Cooperative cancellation flag checked at the top of each solver iteration
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A complete wind model run over one obstacle set
pub struct Simulation {
    config: RunConfig,
    buildings: Vec<Building>,
    vegetation: Vec<VegetationPatch>,
}

/// The solved field and everything needed to interpret it
///
/// Velocities are cell-centered in geographic axes (u east, v north, w up);
/// the coordinate vectors are in the wind-aligned frame the grid was built
/// in, with `rotation` mapping points back to geographic coordinates.
pub struct WindFieldResult {
    pub u: Grid3<f64>,
    pub v: Grid3<f64>,
    pub w: Grid3<f64>,
    /// Cell-center coordinates along each axis (m, wind-aligned frame)
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    /// Background profile V(z_k) (m/s)
    pub profile: Vec<f64>,
    /// Solid mask (obstacles and the ground layer)
    pub solids: Grid3<bool>,
    pub status: SolverStatus,
    /// Final relative λ variation of the solver
    pub residual: f64,
    pub iterations: usize,
    pub warnings: Vec<Warning>,
    pub rotation: WindRotation,
    // Face velocities in the wind-aligned frame, kept for diagnostics
    u_face: Grid3<f64>,
    v_face: Grid3<f64>,
    w_face: Grid3<f64>,
    dx: f64,
    dz: f64,
}

impl WindFieldResult {
    /// Divergence validation on the staggered faces
    pub fn mass_balance(&self) -> MassBalanceValidation {
        diagnostics::validate_mass_balance(
            &self.u_face,
            &self.v_face,
            &self.w_face,
            &self.solids,
            self.dx,
            self.dx,
            self.dz,
        )
    }

    /// Derived horizontal fields of slice k
    pub fn horizontal_slice(&self, k: usize) -> SliceFields {
        diagnostics::horizontal_slice(&self.u, &self.v, &self.w, k)
    }

    /// Geographic coordinates of the cell center (i, j)
    ///
    /// The `x`/`y` vectors are in the wind-aligned frame the grid was built
    /// in; serialization needs the positions back in the frame the velocity
    /// components already use.
    pub fn position_geographic(&self, i: usize, j: usize) -> Coord<f64> {
        self.rotation
            .point_to_geographic(coord! { x: self.x[i], y: self.y[j] })
    }
}

impl Simulation {
    pub fn new(
        config: RunConfig,
        buildings: Vec<Building>,
        vegetation: Vec<VegetationPatch>,
    ) -> Self {
        Self {
            config,
            buildings,
            vegetation,
        }
    }

    /// Run the full pipeline
    pub fn run(&self) -> Result<WindFieldResult, ConfigError> {
        self.run_with_cancellation(&CancellationToken::new())
    }

    /// Run the full pipeline with a cooperative cancellation token
    pub fn run_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<WindFieldResult, ConfigError> {
        self.config.validate()?;
        let mesh = self.config.grid.mesh_size;
        let dz = self.config.grid.dz;
        let mut warnings: Vec<Warning> = Vec::new();

        // Blocks and stacked blocks from the raw buildings
        let block_list = blocks::build_blocks(&self.buildings, &mut warnings);
        let mut stacked = blocks::build_stacked_blocks(&block_list, &self.buildings, &mut warnings);

        // Rotate everything into the wind-aligned frame
        let combined = primitives::envelope_of_all(
            self.buildings
                .iter()
                .map(|b| &b.footprint)
                .chain(self.vegetation.iter().map(|v| &v.footprint)),
        );
        let rotation = match combined {
            Some(rect) => WindRotation::from_envelope(self.config.wind.direction_deg, rect),
            None => WindRotation {
                direction_deg: self.config.wind.direction_deg,
                center: coord! { x: 0.0, y: 0.0 },
            },
        };
        for block in &mut stacked {
            block.footprint = rotation.apply(&block.footprint);
        }
        let vegetation: Vec<VegetationPatch> = self
            .vegetation
            .iter()
            .map(|patch| VegetationPatch {
                footprint: rotation.apply(&patch.footprint),
                ..patch.clone()
            })
            .collect();

        // Base heights depend on cross-wind extents, so they follow rotation
        blocks::assign_base_heights(&mut stacked);

        let mut facade_list = facades::extract_upwind_facades(&stacked);
        facades::update_facade_bases(&mut facade_list, &stacked);

        let mut lengths = BTreeMap::new();
        for block in &stacked {
            match indicators::zone_lengths(&block.footprint, block.height) {
                Some(z) => {
                    lengths.insert(block.id, z);
                }
                None => warnings.push(Warning::new(
                    WarningKind::DegenerateGeometry,
                    format!("stacked block {}: no zone lengths, obstacle ignored", block.id),
                )),
            }
        }
        let block_map: BTreeMap<usize, StackedBlock> =
            stacked.iter().map(|s| (s.id, s.clone())).collect();

        // All flow zones
        let (displacement, vortex) =
            builder::displacement_zones(&facade_list, &lengths, &block_map, mesh);
        let (cavities, wakes) = builder::cavity_and_wake_zones(&stacked, &lengths, &mut warnings);
        let canyons =
            builder::street_canyon_zones(&cavities, &facade_list, &block_map, &lengths, &mut warnings);
        let (roof_perp, roof_corner) =
            builder::rooftop_zones(&facade_list, &block_map, &lengths, &mut warnings);
        let veg_zones = builder::vegetation_zones(&vegetation, &wakes);

        let mut zones: Vec<Zone> = Vec::new();
        zones.extend(displacement);
        zones.extend(vortex);
        zones.extend(cavities);
        zones.extend(wakes);
        zones.extend(canyons);
        zones.extend(roof_perp);
        zones.extend(roof_corner);
        log::debug!(
            "built {} flow zones and {} vegetation zones",
            zones.len(),
            veg_zones.len()
        );

        // Horizontal grid over the expanded zone envelope (or the explicit
        // domain for obstacle-free runs)
        let grid = if let Some(domain) = &self.config.grid.domain {
            PointGrid::from_rect(
                Rect::new(
                    coord! { x: 0.0, y: 0.0 },
                    coord! { x: domain.x_size, y: domain.y_size },
                ),
                mesh,
            )
        } else {
            let envelope_input = zones
                .iter()
                .map(|z| &z.polygon)
                .chain(veg_zones.iter().map(|z| &z.polygon))
                .chain(stacked.iter().map(|s| &s.footprint));
            match PointGrid::from_zones(
                envelope_input,
                self.config.grid.cross_wind_extend,
                self.config.grid.along_wind_extend,
                mesh,
            ) {
                Some(grid) => grid,
                None => return Err(ConfigError::EmptyDomain),
            }
        };

        // Vertical extent: the tallest zone top plus headroom
        let sketch_height = if let Some(domain) = &self.config.grid.domain {
            domain.z_size
        } else {
            let mut top: f64 = 0.0;
            for block in &stacked {
                let roof = lengths
                    .get(&block.id)
                    .map(|z| block.height + z.hcm)
                    .unwrap_or(block.height);
                top = top.max(roof);
            }
            for patch in &vegetation {
                top = top.max(patch.crown_top);
            }
            top + self.config.grid.vertical_extend
        };
        let nz = (sketch_height / dz).floor() as usize + 1;
        let (nx, ny) = (grid.nx, grid.ny);
        if nx < 4 || ny < 4 || nz < 4 {
            return Err(ConfigError::DomainTooSmall { nx, ny, nz });
        }
        log::debug!("grid {nx}x{ny}x{nz} at {mesh} m / {dz} m");

        // Zone membership per cell, with nested cavities eliminated
        let mut cells = pointgrid::assign_points(&grid, &zones, &veg_zones);
        for i in 0..nx {
            for j in 0..ny {
                let index = grid.cell_index(i, j);
                superposition::eliminate_nested_cavities(&mut cells[index], &zones, grid.x(i));
            }
        }

        // Solid mask: obstacle prisms plus the ground layer
        let mut solids = Grid3::new(nx, ny, nz, false);
        for i in 0..nx {
            for j in 0..ny {
                solids.set(i, j, 0, true);
            }
        }
        for block in &stacked {
            let Some(envelope) = primitives::envelope(&block.footprint) else {
                continue;
            };
            let i_lo = ((envelope.min().x - grid.x0) / mesh).ceil().max(0.0) as usize;
            let i_hi = ((envelope.max().x - grid.x0) / mesh).floor();
            if i_hi < i_lo as f64 || i_lo >= nx {
                continue;
            }
            let i_hi = (i_hi as usize).min(nx - 1);
            for i in i_lo..=i_hi {
                let intervals = primitives::column_intervals(
                    &block.footprint,
                    grid.x(i),
                    envelope.min().y - 1.0,
                    envelope.max().y + 1.0,
                );
                for (lo, hi) in intervals {
                    let j_lo = ((lo - grid.y0) / mesh).ceil().max(0.0) as usize;
                    let j_hi = ((hi - grid.y0) / mesh).floor();
                    if j_hi < j_lo as f64 || j_lo >= ny {
                        continue;
                    }
                    let j_hi = (j_hi as usize).min(ny - 1);
                    for j in j_lo..=j_hi {
                        for k in 0..nz {
                            let cell_bottom = k as f64 * dz - dz / 2.0;
                            if block.base_height <= cell_bottom && block.height > cell_bottom {
                                solids.set(i, j, k, true);
                            }
                        }
                    }
                }
            }
        }

        // Background profile from the study-area roughness
        let domain_area = (nx.saturating_sub(1) as f64 * mesh) * (ny.saturating_sub(1) as f64 * mesh);
        let roughness = indicators::study_area_roughness(
            &facade_list,
            &stacked,
            domain_area,
            self.config.profile.roughness_length,
        );
        let profile = VerticalProfile::new(&self.config.profile, &self.config.wind, &roughness);

        // First-guess field: zone multipliers composed with the profile.
        // Zone factors use the wind frame (positive v downwind); the solver
        // frame keeps ascending y, so v flips sign here.
        let mut u0 = Grid3::new(nx, ny, nz, 0.0);
        let mut v0 = Grid3::new(nx, ny, nz, 0.0);
        let mut w0 = Grid3::new(nx, ny, nz, 0.0);
        let mut rule_d = RuleDCounter::default();
        for i in 0..nx {
            for j in 0..ny {
                let cell = &cells[grid.cell_index(i, j)];
                for k in 0..nz {
                    if *solids.get(i, j, k) {
                        continue;
                    }
                    let z = k as f64 * dz;
                    let resolved = superposition::resolve_cell(
                        cell,
                        &zones,
                        &veg_zones,
                        z,
                        self.config.wind.z_ref,
                        roughness.z0,
                        roughness.d,
                        &mut rule_d,
                    );
                    match resolved {
                        Some(factor) => {
                            let w_ref = match factor.ref_height {
                                RefHeight::BlockHeight => profile.value(factor.block_height),
                                RefHeight::ZRef => self.config.wind.v_ref,
                                RefHeight::PointHeight => profile.value(z),
                            };
                            u0.set(i, j, k, factor.u * w_ref);
                            v0.set(i, j, k, -factor.v * w_ref);
                            w0.set(i, j, k, factor.w * w_ref);
                        }
                        None => {
                            v0.set(i, j, k, -profile.value(z));
                        }
                    }
                }
            }
        }
        if rule_d.occurrences > 0 {
            let message = format!(
                "{} ambiguous upstream ties resolved by the fixed zone priority table",
                rule_d.occurrences
            );
            log::warn!("{message}");
            warnings.push(Warning::new(WarningKind::AmbiguousUpstream, message));
        }

        // Mass-consistent correction
        let (u_staggered, v_staggered, w_staggered) =
            stagger_first_guess(&u0, &v0, &w0, &solids);
        let solver = MassSolver::new(mesh, mesh, dz, self.config.solver.clone());
        let solved = solver.solve(&u_staggered, &v_staggered, &w_staggered, &solids, cancel);
        if solved.outcome.overflow_cells > 0 {
            warnings.push(Warning::new(
                WarningKind::NumericOverflow,
                format!(
                    "{} cells with degenerate stencil treated as solid",
                    solved.outcome.overflow_cells
                ),
            ));
        }
        if solved.outcome.status != SolverStatus::Converged {
            let message = format!(
                "solver ended {:?} after {} iterations (residual {:.3e})",
                solved.outcome.status, solved.outcome.iterations, solved.outcome.residual
            );
            log::warn!("{message}");
            warnings.push(Warning::new(WarningKind::SolverIncomplete, message));
        } else {
            log::debug!(
                "solver converged after {} iterations (residual {:.3e})",
                solved.outcome.iterations,
                solved.outcome.residual
            );
        }

        // Back to geographic axes
        let mut u = solved.u;
        let mut v = solved.v;
        let w = solved.w;
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    let geographic =
                        rotation.vector_to_geographic(Vec2::new(*u.get(i, j, k), *v.get(i, j, k)));
                    u.set(i, j, k, geographic.x);
                    v.set(i, j, k, geographic.y);
                }
            }
        }

        let z_levels: Vec<f64> = (0..nz).map(|k| k as f64 * dz).collect();
        Ok(WindFieldResult {
            u,
            v,
            w,
            x: (0..nx).map(|i| grid.x(i)).collect(),
            y: (0..ny).map(|j| grid.y(j)).collect(),
            profile: z_levels.iter().map(|&z| profile.value(z)).collect(),
            z: z_levels,
            solids,
            status: solved.outcome.status,
            residual: solved.outcome.residual,
            iterations: solved.outcome.iterations,
            warnings,
            rotation,
            u_face: solved.u_face,
            v_face: solved.v_face,
            w_face: solved.w_face,
            dx: mesh,
            dz,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::ExplicitDomain;

    #[test]
    fn test_empty_inputs_without_domain_fail() {
        let sim = Simulation::new(RunConfig::default(), vec![], vec![]);
        assert!(matches!(sim.run(), Err(ConfigError::EmptyDomain)));
    }

    #[test]
    fn test_invalid_mesh_rejected_before_work() {
        let mut config = RunConfig::default();
        config.grid.mesh_size = -1.0;
        let sim = Simulation::new(config, vec![], vec![]);
        assert!(matches!(sim.run(), Err(ConfigError::InvalidMeshSize(_))));
    }

    #[test]
    fn test_positions_rotate_back_to_geographic() {
        // Wind from the west: the wind-aligned frame is the geographic one
        // turned 270° counter-clockwise, so going back turns a quarter turn
        // counter-clockwise again: (x, y) lands on (-y, x)
        let mut config = RunConfig::default();
        config.wind.direction_deg = 270.0;
        config.grid.domain = Some(ExplicitDomain {
            x_size: 40.0,
            y_size: 40.0,
            z_size: 20.0,
        });
        let sim = Simulation::new(config, vec![], vec![]);
        let result = sim.run().unwrap();

        let position = result.position_geographic(2, 1);
        assert!((position.x - -result.y[1]).abs() < 1e-9);
        assert!((position.y - result.x[2]).abs() < 1e-9);
    }

    #[test]
    fn test_cancelled_run_reports_cancelled_status() {
        let mut config = RunConfig::default();
        config.grid.domain = Some(ExplicitDomain {
            x_size: 40.0,
            y_size: 40.0,
            z_size: 20.0,
        });
        let sim = Simulation::new(config, vec![], vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = sim.run_with_cancellation(&cancel).unwrap();
        assert_eq!(result.status, SolverStatus::Cancelled);
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.kind == WarningKind::SolverIncomplete)
        );
    }
}
