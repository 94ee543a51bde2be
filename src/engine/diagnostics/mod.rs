// ABOUTME: Diagnostic checks and derived fields for the solved wind field
// ABOUTME: Mass-conservation validation on the staggered faces, per-slice horizontal summaries

use crate::engine::core::Grid3;
use crate::engine::core::math::flow_direction_deg;

/// Mass-conservation validation of a solved field
#[derive(Debug, Clone, Copy)]
pub struct MassBalanceValidation {
    /// Largest |∂u/∂x + ∂v/∂y + ∂w/∂z| over interior fluid cells (1/s)
    pub max_divergence: f64,
    /// Largest velocity magnitude component in the field (m/s)
    pub max_velocity: f64,
    pub checked_cells: usize,
}

impl MassBalanceValidation {
    /// Whether the residual divergence is below `tolerance · max|u|`
    pub fn is_conserved(&self, tolerance: f64) -> bool {
        self.max_divergence <= tolerance * self.max_velocity.max(1e-12)
    }
}

/// Evaluate the divergence of the face velocities over interior fluid cells
pub fn validate_mass_balance(
    u_face: &Grid3<f64>,
    v_face: &Grid3<f64>,
    w_face: &Grid3<f64>,
    solids: &Grid3<bool>,
    dx: f64,
    dy: f64,
    dz: f64,
) -> MassBalanceValidation {
    let (nx, ny, nz) = solids.dims();
    let mut max_divergence: f64 = 0.0;
    let mut max_velocity: f64 = 0.0;
    let mut checked_cells = 0;

    for i in 1..nx.saturating_sub(1) {
        for j in 1..ny.saturating_sub(1) {
            for k in 1..nz.saturating_sub(1) {
                if *solids.get(i, j, k) {
                    continue;
                }
                let divergence = (*u_face.get(i + 1, j, k) - *u_face.get(i, j, k)) / dx
                    + (*v_face.get(i, j + 1, k) - *v_face.get(i, j, k)) / dy
                    + (*w_face.get(i, j, k + 1) - *w_face.get(i, j, k)) / dz;
                max_divergence = max_divergence.max(divergence.abs());
                max_velocity = max_velocity
                    .max(u_face.get(i, j, k).abs())
                    .max(v_face.get(i, j, k).abs())
                    .max(w_face.get(i, j, k).abs());
                checked_cells += 1;
            }
        }
    }

    MassBalanceValidation {
        max_divergence,
        max_velocity,
        checked_cells,
    }
}

/// Derived horizontal fields of one z slice, row-major over (i, j)
#[derive(Debug, Clone)]
pub struct SliceFields {
    pub nx: usize,
    pub ny: usize,
    /// Horizontal wind speed √(u² + v²) (m/s)
    pub horizontal_speed: Vec<f64>,
    /// Heading of the horizontal flow, degrees clockwise from north
    pub horizontal_direction_deg: Vec<f64>,
    /// Vertical wind speed (m/s)
    pub vertical_speed: Vec<f64>,
    /// Full wind speed √(u² + v² + w²) (m/s)
    pub full_speed: Vec<f64>,
}

/// Compute the derived fields of slice k from cell-centered geographic
/// velocities
pub fn horizontal_slice(
    u: &Grid3<f64>,
    v: &Grid3<f64>,
    w: &Grid3<f64>,
    k: usize,
) -> SliceFields {
    let (nx, ny, _) = u.dims();
    let mut horizontal_speed = Vec::with_capacity(nx * ny);
    let mut horizontal_direction_deg = Vec::with_capacity(nx * ny);
    let mut vertical_speed = Vec::with_capacity(nx * ny);
    let mut full_speed = Vec::with_capacity(nx * ny);

    for i in 0..nx {
        for j in 0..ny {
            let ui = *u.get(i, j, k);
            let vi = *v.get(i, j, k);
            let wi = *w.get(i, j, k);
            let horizontal = (ui * ui + vi * vi).sqrt();
            horizontal_speed.push(horizontal);
            horizontal_direction_deg.push(flow_direction_deg(ui, vi));
            vertical_speed.push(wi);
            full_speed.push((ui * ui + vi * vi + wi * wi).sqrt());
        }
    }

    SliceFields {
        nx,
        ny,
        horizontal_speed,
        horizontal_direction_deg,
        vertical_speed,
        full_speed,
    }
}
