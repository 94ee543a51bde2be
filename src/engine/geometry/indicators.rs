// ABOUTME: Obstacle and study-area indicators - effective dims, zone lengths, roughness
// ABOUTME: The closed-form contracts every zone construction and profile evaluation feeds on

use geo::{Area, Polygon};

use super::blocks::StackedBlock;
use super::facades::UpwindFacade;
use super::primitives;

/// Zone-length descriptors of one stacked block
///
/// All lengths derive from the effective width/length (envelope extents
/// weighted by the footprint-to-envelope area ratio, Nelson et al. 2008) and
/// the block height, per Kaplan & Dinar (1996), Bagal et al. (2004) and
/// Pol et al. (2006).
#[derive(Debug, Clone, Copy)]
pub struct ZoneLengths {
    /// Cross-wind effective width (m)
    pub w_eff: f64,
    /// Along-wind effective length (m)
    pub l_eff: f64,
    /// Displacement zone length Lf (m)
    pub lf: f64,
    /// Displacement vortex length Lfv (m)
    pub lfv: f64,
    /// Cavity length Lr (m)
    pub lr: f64,
    /// Wake length Lw = 3·Lr (m)
    pub lw: f64,
    /// Rooftop recirculation height Hcm (m)
    pub hcm: f64,
    /// Rooftop recirculation length Lc (m)
    pub lc: f64,
    /// Rooftop corner wind factor C1 (dimensionless)
    pub c1: f64,
}

/// Compute the zone-length descriptors of a footprint with height `h`
///
/// Returns `None` for degenerate geometry (empty envelope, zero effective
/// length, non-positive height); the caller records the warning.
pub fn zone_lengths(footprint: &Polygon<f64>, h: f64) -> Option<ZoneLengths> {
    if h <= 0.0 {
        return None;
    }
    let envelope = primitives::envelope(footprint)?;
    let env_area = envelope.width() * envelope.height();
    if env_area <= 0.0 {
        return None;
    }
    let ratio = footprint.unsigned_area() / env_area;
    let w_eff = envelope.width() * ratio;
    let l_eff = envelope.height() * ratio;
    if w_eff <= 0.0 || l_eff <= 0.0 {
        return None;
    }

    let lf = 1.5 * w_eff / (1.0 + 0.8 * w_eff / h);
    let lfv = 0.6 * w_eff / (1.0 + 0.8 * w_eff / h);
    let lr = 1.8 * w_eff / ((l_eff / h).powf(0.3) * (1.0 + 0.24 * w_eff / h));
    let lw = 3.0 * lr;
    let scale = 0.67 * h.min(w_eff) + 0.33 * h.max(w_eff);
    let hcm = 0.22 * scale;
    let lc = 0.9 * scale;
    let c1 = 1.0 + 0.05 * w_eff / h;

    Some(ZoneLengths {
        w_eff,
        l_eff,
        lf,
        lfv,
        lr,
        lw,
        hcm,
        lc,
        c1,
    })
}

/// Aerodynamic description of the study area (Hanna & Britter 2002)
#[derive(Debug, Clone, Copy)]
pub struct RoughnessParams {
    /// Roughness length (m)
    pub z0: f64,
    /// Displacement height (m)
    pub d: f64,
    /// Frontal area density (dimensionless, capped at 1)
    pub lambda_f: f64,
    /// Geometric-mean obstacle height (m)
    pub mean_height: f64,
}

/// Derive z₀ and d from the frontal area the upwind facades expose
///
/// With no frontal area (open site) the configured fallback roughness is used
/// with zero displacement.
pub fn study_area_roughness(
    facades: &[UpwindFacade],
    stacked: &[StackedBlock],
    domain_area: f64,
    fallback_z0: f64,
) -> RoughnessParams {
    let frontal_area: f64 = facades
        .iter()
        .map(|f| {
            let dx = f.line.end.x - f.line.start.x;
            let dy = f.line.end.y - f.line.start.y;
            let length = (dx * dx + dy * dy).sqrt();
            length * f.theta.sin() * (f.height - f.base_height).max(0.0)
        })
        .sum();

    let mean_height = if stacked.is_empty() {
        0.0
    } else {
        let log_sum: f64 = stacked.iter().map(|s| s.height.ln()).sum();
        (log_sum / stacked.len() as f64).exp()
    };

    let lambda_f = if domain_area > 0.0 {
        (frontal_area / domain_area).min(1.0)
    } else {
        0.0
    };

    if lambda_f <= 0.0 || mean_height <= 0.0 {
        return RoughnessParams {
            z0: fallback_z0,
            d: 0.0,
            lambda_f: 0.0,
            mean_height,
        };
    }

    let (z0, d) = if lambda_f <= 0.05 {
        (lambda_f * mean_height, 3.0 * lambda_f * mean_height)
    } else if lambda_f <= 0.15 {
        (
            lambda_f * mean_height,
            mean_height * (0.15 + 5.5 * (lambda_f - 0.05)),
        )
    } else {
        (
            0.15 * mean_height,
            mean_height * (0.7 + 0.35 * (lambda_f - 0.15)),
        )
    };

    RoughnessParams {
        z0,
        d,
        lambda_f,
        mean_height,
    }
}
