// SPDX-License-Identifier: MIT
// Copyright (c) 2025 urbanwind contributors

// ABOUTME: Mass-consistent SOR solver - red-black relaxation of the λ correction field
// ABOUTME: Pardyjak & Brown (2003) stencil with obstacle coefficients, rayon over each color

use rayon::prelude::*;

use crate::engine::config::SolverConfig;
use crate::engine::core::Grid3;
use crate::engine::sim::CancellationToken;

/// Over-relaxation factor (Pardyjak & Brown 2003)
pub const OMEGA: f64 = 1.78;
/// Horizontal Gauss precision modulus
pub const ALPHA1: f64 = 1.0;
/// Vertical Gauss precision modulus
pub const ALPHA2: f64 = 1.0;

/// How the relaxation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Converged,
    MaxIterations,
    Stagnated,
    Cancelled,
}

/// Final state of one solve
#[derive(Debug, Clone, Copy)]
pub struct SolverOutcome {
    pub status: SolverStatus,
    /// Last relative λ variation Σ|Δλ| / Σ|λ|
    pub residual: f64,
    pub iterations: usize,
    /// Cells dropped from the stencil because their denominator degenerated
    pub overflow_cells: usize,
}

/// Corrected velocity fields, on faces and recentered to cell centers
#[derive(Debug)]
pub struct SolveResult {
    /// Cell-centered corrected velocities (wind-aligned frame)
    pub u: Grid3<f64>,
    pub v: Grid3<f64>,
    pub w: Grid3<f64>,
    /// Face velocities before recentering, for divergence diagnostics
    pub u_face: Grid3<f64>,
    pub v_face: Grid3<f64>,
    pub w_face: Grid3<f64>,
    pub outcome: SolverOutcome,
}

/// Interpolate a cell-centered first guess onto faces and zero every face
/// touching a solid cell
///
/// Face i of the u grid sits between cells i-1 and i, so `u[i] =
/// (u[i-1] + u[i]) / 2` for i ≥ 1, and likewise along j and k.
pub fn stagger_first_guess(
    u0: &Grid3<f64>,
    v0: &Grid3<f64>,
    w0: &Grid3<f64>,
    solids: &Grid3<bool>,
) -> (Grid3<f64>, Grid3<f64>, Grid3<f64>) {
    let (nx, ny, nz) = u0.dims();
    let mut u = u0.clone();
    let mut v = v0.clone();
    let mut w = w0.clone();

    for i in (1..nx).rev() {
        for j in 0..ny {
            for k in 0..nz {
                let avg = (*u0.get(i - 1, j, k) + *u0.get(i, j, k)) / 2.0;
                u.set(i, j, k, avg);
            }
        }
    }
    for i in 0..nx {
        for j in (1..ny).rev() {
            for k in 0..nz {
                let avg = (*v0.get(i, j - 1, k) + *v0.get(i, j, k)) / 2.0;
                v.set(i, j, k, avg);
            }
        }
    }
    for i in 0..nx {
        for j in 0..ny {
            for k in (1..nz).rev() {
                let avg = (*w0.get(i, j, k - 1) + *w0.get(i, j, k)) / 2.0;
                w.set(i, j, k, avg);
            }
        }
    }

    zero_solid_faces(&mut u, &mut v, &mut w, solids);
    (u, v, w)
}

/// Zero both faces of every solid cell in each direction
pub fn zero_solid_faces(
    u: &mut Grid3<f64>,
    v: &mut Grid3<f64>,
    w: &mut Grid3<f64>,
    solids: &Grid3<bool>,
) {
    let (nx, ny, nz) = solids.dims();
    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                if !*solids.get(i, j, k) {
                    continue;
                }
                u.set(i, j, k, 0.0);
                v.set(i, j, k, 0.0);
                w.set(i, j, k, 0.0);
                if i + 1 < nx {
                    u.set(i + 1, j, k, 0.0);
                }
                if j + 1 < ny {
                    v.set(i, j + 1, k, 0.0);
                }
                if k + 1 < nz {
                    w.set(i, j, k + 1, 0.0);
                }
            }
        }
    }
}

/// One interior cell of the relaxation stencil
///
/// Neighbor slots index the opposite color's λ array; the last slot of each
/// color array is a pinned zero standing in for Dirichlet boundaries and
/// solid cells.
struct SorCell {
    rhs: f64,
    denom: f64,
    coef: [f64; 6],
    nbr: [u32; 6],
}

/// Mass-consistent solver on a staggered grid
pub struct MassSolver {
    dx: f64,
    dy: f64,
    dz: f64,
    config: SolverConfig,
}

impl MassSolver {
    pub fn new(dx: f64, dy: f64, dz: f64, config: SolverConfig) -> Self {
        Self { dx, dy, dz, config }
    }

    /// Solve for λ and return the corrected velocity field
    ///
    /// `u0`, `v0`, `w0` are the face-interpolated first guess (see
    /// `stagger_first_guess`); `solids` marks obstacle cells and the ground
    /// layer.
    pub fn solve(
        &self,
        u0: &Grid3<f64>,
        v0: &Grid3<f64>,
        w0: &Grid3<f64>,
        solids: &Grid3<bool>,
        cancel: &CancellationToken,
    ) -> SolveResult {
        let (nx, ny, nz) = solids.dims();
        let a = (self.dx / self.dy) * (self.dx / self.dy);
        let eta = ALPHA1 / ALPHA2;
        let b = eta * eta * (self.dx / self.dz) * (self.dx / self.dz);

        // Obstacle coefficients, 1 everywhere then adjusted around solids
        // (table 1 of Pardyjak & Brown 2003)
        let mut e = Grid3::new(nx, ny, nz, 1.0);
        let mut f = Grid3::new(nx, ny, nz, 1.0);
        let mut g = Grid3::new(nx, ny, nz, 1.0);
        let mut h = Grid3::new(nx, ny, nz, 1.0);
        let m = Grid3::new(nx, ny, nz, 1.0);
        let mut n = Grid3::new(nx, ny, nz, 1.0);
        let mut o = Grid3::new(nx, ny, nz, 1.0);
        let mut p = Grid3::new(nx, ny, nz, 1.0);
        let mut q = Grid3::new(nx, ny, nz, 1.0);
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    if !*solids.get(i, j, k) {
                        continue;
                    }
                    if i > 0 {
                        e.set(i - 1, j, k, 0.0);
                        o.set(i - 1, j, k, 0.5);
                    }
                    if i + 1 < nx {
                        f.set(i + 1, j, k, 0.0);
                        o.set(i + 1, j, k, 0.5);
                    }
                    if j > 0 {
                        g.set(i, j - 1, k, 0.0);
                        p.set(i, j - 1, k, 0.5);
                    }
                    if j + 1 < ny {
                        h.set(i, j + 1, k, 0.0);
                        p.set(i, j + 1, k, 0.5);
                    }
                    if k + 1 < nz {
                        n.set(i, j, k + 1, 0.0);
                        q.set(i, j, k + 1, 0.5);
                    }
                }
            }
        }

        // Checkerboard split: every neighbor of a cell has the other parity,
        // so each half-sweep only reads the other color and parallelizes
        // cleanly
        let mut slot: Grid3<u32> = Grid3::new(nx, ny, nz, u32::MAX);
        let mut coords: [Vec<(usize, usize, usize)>; 2] = [Vec::new(), Vec::new()];
        let mut overflow_cells = 0usize;
        for i in 1..nx.saturating_sub(1) {
            for j in 1..ny.saturating_sub(1) {
                for k in 1..nz.saturating_sub(1) {
                    if *solids.get(i, j, k) {
                        continue;
                    }
                    let denom =
                        2.0 * (*o.get(i, j, k) + a * *p.get(i, j, k) + b * *q.get(i, j, k));
                    if !denom.is_finite() || denom <= 0.0 {
                        overflow_cells += 1;
                        continue;
                    }
                    let color = (i + j + k) % 2;
                    slot.set(i, j, k, coords[color].len() as u32);
                    coords[color].push((i, j, k));
                }
            }
        }

        let zero_slot = [coords[0].len() as u32, coords[1].len() as u32];
        let neighbor = |slot_grid: &Grid3<u32>, color: usize, i: usize, j: usize, k: usize| {
            let s = *slot_grid.get(i, j, k);
            if s == u32::MAX { zero_slot[1 - color] } else { s }
        };

        let mut cells: [Vec<SorCell>; 2] = [Vec::new(), Vec::new()];
        for color in 0..2 {
            cells[color] = coords[color]
                .iter()
                .map(|&(i, j, k)| {
                    let divergence = (*u0.get(i + 1, j, k) - *u0.get(i, j, k)) / self.dx
                        + (*v0.get(i, j + 1, k) - *v0.get(i, j, k)) / self.dy
                        + (*w0.get(i, j, k + 1) - *w0.get(i, j, k)) / self.dz;
                    SorCell {
                        rhs: 2.0 * self.dx * self.dx * ALPHA1 * ALPHA1 * divergence,
                        denom: 2.0
                            * (*o.get(i, j, k) + a * *p.get(i, j, k) + b * *q.get(i, j, k)),
                        coef: [
                            *e.get(i, j, k),
                            *f.get(i, j, k),
                            a * *g.get(i, j, k),
                            a * *h.get(i, j, k),
                            b * *m.get(i, j, k),
                            b * *n.get(i, j, k),
                        ],
                        nbr: [
                            neighbor(&slot, color, i + 1, j, k),
                            neighbor(&slot, color, i - 1, j, k),
                            neighbor(&slot, color, i, j + 1, k),
                            neighbor(&slot, color, i, j - 1, k),
                            neighbor(&slot, color, i, j, k + 1),
                            neighbor(&slot, color, i, j, k - 1),
                        ],
                    }
                })
                .collect();
        }

        // λ starts at the Dirichlet value everywhere; a divergence-free first
        // guess then converges in one sweep with the field exactly untouched.
        // The trailing slot per color is the pinned boundary/solid zero.
        let mut lambda: [Vec<f64>; 2] = [
            vec![0.0; coords[0].len() + 1],
            vec![0.0; coords[1].len() + 1],
        ];

        let mut status = SolverStatus::MaxIterations;
        let mut residual = f64::INFINITY;
        let mut iterations = 0;
        let mut previous_residual = f64::INFINITY;
        let mut stagnant_iterations = 0usize;

        for iteration in 0..self.config.max_iterations {
            iterations = iteration + 1;
            if cancel.is_cancelled() {
                status = SolverStatus::Cancelled;
                break;
            }

            let mut delta_sum = 0.0;
            let mut value_sum = 0.0;
            for color in 0..2 {
                let (reads, writes) = if color == 0 {
                    let (first, second) = lambda.split_at_mut(1);
                    (&second[0], &mut first[0])
                } else {
                    let (first, second) = lambda.split_at_mut(1);
                    (&first[0], &mut second[0])
                };
                let zero = zero_slot[color] as usize;
                let (delta, value) = writes[..zero]
                    .par_iter_mut()
                    .zip(cells[color].par_iter())
                    .map(|(value, cell)| {
                        let sum = cell.coef[0] * reads[cell.nbr[0] as usize]
                            + cell.coef[1] * reads[cell.nbr[1] as usize]
                            + cell.coef[2] * reads[cell.nbr[2] as usize]
                            + cell.coef[3] * reads[cell.nbr[3] as usize]
                            + cell.coef[4] * reads[cell.nbr[4] as usize]
                            + cell.coef[5] * reads[cell.nbr[5] as usize];
                        let updated =
                            OMEGA * (cell.rhs + sum) / cell.denom + (1.0 - OMEGA) * *value;
                        let delta = (updated - *value).abs();
                        *value = updated;
                        (delta, updated.abs())
                    })
                    .reduce(|| (0.0, 0.0), |x, y| (x.0 + y.0, x.1 + y.1));
                delta_sum += delta;
                value_sum += value;
            }

            residual = if value_sum > 0.0 {
                delta_sum / value_sum
            } else {
                0.0
            };
            if residual < self.config.threshold {
                status = SolverStatus::Converged;
                break;
            }
            if residual >= previous_residual {
                stagnant_iterations += 1;
                if stagnant_iterations >= self.config.stagnation_window {
                    status = SolverStatus::Stagnated;
                    break;
                }
            } else {
                stagnant_iterations = 0;
            }
            previous_residual = residual;
        }

        // Reassemble the full λ field (0 on boundaries and solids)
        let mut lambda_field = Grid3::new(nx, ny, nz, 0.0);
        for color in 0..2 {
            for (s, &(i, j, k)) in coords[color].iter().enumerate() {
                lambda_field.set(i, j, k, lambda[color][s]);
            }
        }

        // u = u0 + (1/2α²)·∇λ on the faces
        let mut u = Grid3::new(nx, ny, nz, 0.0);
        let mut v = Grid3::new(nx, ny, nz, 0.0);
        let mut w = Grid3::new(nx, ny, nz, 0.0);
        let half_a1 = 0.5 / (ALPHA1 * ALPHA1);
        let half_a2 = 0.5 / (ALPHA2 * ALPHA2);
        for i in 1..nx {
            for j in 0..ny {
                for k in 0..nz {
                    let gradient =
                        (*lambda_field.get(i, j, k) - *lambda_field.get(i - 1, j, k)) / self.dx;
                    u.set(i, j, k, *u0.get(i, j, k) + half_a1 * gradient);
                }
            }
        }
        for i in 0..nx {
            for j in 1..ny {
                for k in 0..nz {
                    let gradient =
                        (*lambda_field.get(i, j, k) - *lambda_field.get(i, j - 1, k)) / self.dy;
                    v.set(i, j, k, *v0.get(i, j, k) + half_a1 * gradient);
                }
            }
        }
        for i in 0..nx {
            for j in 0..ny {
                for k in 1..nz {
                    let gradient =
                        (*lambda_field.get(i, j, k) - *lambda_field.get(i, j, k - 1)) / self.dz;
                    w.set(i, j, k, *w0.get(i, j, k) + half_a2 * gradient);
                }
            }
        }
        zero_solid_faces(&mut u, &mut v, &mut w, solids);

        let u_face = u.clone();
        let v_face = v.clone();
        let w_face = w.clone();

        // Recenter faces onto cell centers
        for i in 0..nx.saturating_sub(1) {
            for j in 0..ny.saturating_sub(1) {
                for k in 0..nz.saturating_sub(1) {
                    let uc = (*u_face.get(i, j, k) + *u_face.get(i + 1, j, k)) / 2.0;
                    let vc = (*v_face.get(i, j, k) + *v_face.get(i, j + 1, k)) / 2.0;
                    let wc = (*w_face.get(i, j, k) + *w_face.get(i, j, k + 1)) / 2.0;
                    u.set(i, j, k, uc);
                    v.set(i, j, k, vc);
                    w.set(i, j, k, wc);
                }
            }
        }

        SolveResult {
            u,
            v,
            w,
            u_face,
            v_face,
            w_face,
            outcome: SolverOutcome {
                status,
                residual,
                iterations,
                overflow_cells,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::SolverConfig;

    fn open_solids(nx: usize, ny: usize, nz: usize) -> Grid3<bool> {
        let mut solids = Grid3::new(nx, ny, nz, false);
        for i in 0..nx {
            for j in 0..ny {
                solids.set(i, j, 0, true);
            }
        }
        solids
    }

    #[test]
    fn test_divergence_free_first_guess_converges_immediately() {
        // A uniform along-wind flow is already divergence free: λ stays 0-ish
        // and the velocities pass through unchanged
        let (nx, ny, nz) = (12, 12, 8);
        let solids = open_solids(nx, ny, nz);
        let u0 = Grid3::new(nx, ny, nz, 0.0);
        let mut v0 = Grid3::new(nx, ny, nz, 0.0);
        for i in 0..nx {
            for j in 0..ny {
                for k in 1..nz {
                    v0.set(i, j, k, -2.0);
                }
            }
        }
        let w0 = Grid3::new(nx, ny, nz, 0.0);
        let (uf, vf, wf) = stagger_first_guess(&u0, &v0, &w0, &solids);

        let solver = MassSolver::new(2.0, 2.0, 2.0, SolverConfig::default());
        let result = solver.solve(&uf, &vf, &wf, &solids, &CancellationToken::new());

        assert_eq!(result.outcome.status, SolverStatus::Converged);
        assert_eq!(result.outcome.iterations, 1);
        // The flow passes through exactly
        let mid = *result.v.get(nx / 2, ny / 2, nz / 2);
        assert!((mid + 2.0).abs() < 1e-12, "v = {mid}");
    }

    #[test]
    fn test_mass_conservation_around_block() {
        // A solid column in the middle of a uniform flow: after the solve,
        // every interior fluid cell is (nearly) divergence free on the faces
        let (nx, ny, nz) = (16, 16, 10);
        let mut solids = open_solids(nx, ny, nz);
        for i in 6..10 {
            for j in 6..10 {
                for k in 1..6 {
                    solids.set(i, j, k, true);
                }
            }
        }
        let u0 = Grid3::new(nx, ny, nz, 0.0);
        let mut v0 = Grid3::new(nx, ny, nz, 0.0);
        for i in 0..nx {
            for j in 0..ny {
                for k in 1..nz {
                    if !*solids.get(i, j, k) {
                        v0.set(i, j, k, -2.0);
                    }
                }
            }
        }
        let w0 = Grid3::new(nx, ny, nz, 0.0);
        let (uf, vf, wf) = stagger_first_guess(&u0, &v0, &w0, &solids);

        let solver = MassSolver::new(2.0, 2.0, 2.0, SolverConfig::default());
        let result = solver.solve(&uf, &vf, &wf, &solids, &CancellationToken::new());
        assert_eq!(result.outcome.status, SolverStatus::Converged);

        let mut max_divergence: f64 = 0.0;
        for i in 1..nx - 1 {
            for j in 1..ny - 1 {
                for k in 1..nz - 1 {
                    if *solids.get(i, j, k) {
                        continue;
                    }
                    let div = (*result.u_face.get(i + 1, j, k) - *result.u_face.get(i, j, k))
                        / 2.0
                        + (*result.v_face.get(i, j + 1, k) - *result.v_face.get(i, j, k)) / 2.0
                        + (*result.w_face.get(i, j, k + 1) - *result.w_face.get(i, j, k)) / 2.0;
                    max_divergence = max_divergence.max(div.abs());
                }
            }
        }
        assert!(
            max_divergence < 1e-3,
            "max divergence {max_divergence} too large"
        );

        // Solid cells stay at exactly zero velocity
        assert_eq!(*result.u.get(7, 7, 3), 0.0);
        assert_eq!(*result.v.get(7, 7, 3), 0.0);
        assert_eq!(*result.w.get(7, 7, 3), 0.0);
    }

    #[test]
    fn test_cancellation_returns_partial_solution() {
        let (nx, ny, nz) = (10, 10, 6);
        let solids = open_solids(nx, ny, nz);
        let mut v0 = Grid3::new(nx, ny, nz, 0.0);
        for i in 0..nx {
            for j in 0..ny {
                for k in 1..nz {
                    v0.set(i, j, k, -(k as f64));
                }
            }
        }
        let u0 = Grid3::new(nx, ny, nz, 0.0);
        let w0 = Grid3::new(nx, ny, nz, 0.0);
        let (uf, vf, wf) = stagger_first_guess(&u0, &v0, &w0, &solids);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let solver = MassSolver::new(2.0, 2.0, 2.0, SolverConfig::default());
        let result = solver.solve(&uf, &vf, &wf, &solids, &cancel);
        assert_eq!(result.outcome.status, SolverStatus::Cancelled);
        assert_eq!(result.outcome.iterations, 1);
    }

    #[test]
    fn test_idempotent_on_converged_output() {
        // Feeding a converged field back in leaves it unchanged to within
        // the threshold
        let (nx, ny, nz) = (14, 14, 8);
        let mut solids = open_solids(nx, ny, nz);
        for i in 5..9 {
            for j in 5..9 {
                for k in 1..5 {
                    solids.set(i, j, k, true);
                }
            }
        }
        let u0 = Grid3::new(nx, ny, nz, 0.0);
        let mut v0 = Grid3::new(nx, ny, nz, 0.0);
        for i in 0..nx {
            for j in 0..ny {
                for k in 1..nz {
                    if !*solids.get(i, j, k) {
                        v0.set(i, j, k, -2.0);
                    }
                }
            }
        }
        let w0 = Grid3::new(nx, ny, nz, 0.0);
        let (uf, vf, wf) = stagger_first_guess(&u0, &v0, &w0, &solids);

        let solver = MassSolver::new(2.0, 2.0, 2.0, SolverConfig::default());
        let first = solver.solve(&uf, &vf, &wf, &solids, &CancellationToken::new());

        let second = solver.solve(
            &first.u_face,
            &first.v_face,
            &first.w_face,
            &solids,
            &CancellationToken::new(),
        );
        let (nxs, nys, nzs) = first.u.dims();
        let mut max_change: f64 = 0.0;
        for i in 1..nxs - 1 {
            for j in 1..nys - 1 {
                for k in 1..nzs - 1 {
                    max_change = max_change
                        .max((*second.u.get(i, j, k) - *first.u.get(i, j, k)).abs())
                        .max((*second.v.get(i, j, k) - *first.v.get(i, j, k)).abs())
                        .max((*second.w.get(i, j, k) - *first.w.get(i, j, k)).abs());
                }
            }
        }
        assert!(max_change < 1e-2, "second solve changed field by {max_change}");
    }
}
