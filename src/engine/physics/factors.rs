// ABOUTME: Per-zone velocity multipliers - the closed-form vertical laws of each flow region
// ABOUTME: Works in the wind frame where positive v is downwind; assembly flips it to geographic

use super::pointgrid::ZoneClaim;
use crate::engine::zones::{VegetationZone, Zone, ZoneDetail, ZoneKind};

/// Displacement zone magnitude coefficient (Kaplan & Dinar 1996)
pub const C_DZ: f64 = 0.4;
/// Displacement zone vertical exponent
pub const P_DZ: f64 = 0.16;
/// Rooftop recirculation vertical exponent (Pol et al. 2006)
pub const P_RTP: f64 = 0.16;

/// Which wind speed a multiplier scales
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefHeight {
    /// The profile evaluated at the source obstacle's height
    BlockHeight,
    /// The reference measurement speed itself
    ZRef,
    /// The profile evaluated at the point's own height
    PointHeight,
}

/// Velocity multipliers of one zone at one 3D point
#[derive(Debug, Clone, Copy)]
pub struct WindFactor {
    /// Cross-wind multiplier (+x east in the wind frame)
    pub u: f64,
    /// Along-wind multiplier, positive downwind
    pub v: f64,
    /// Vertical multiplier, positive up
    pub w: f64,
    pub ref_height: RefHeight,
    /// Height the BlockHeight reference evaluates the profile at (m)
    pub block_height: f64,
}

/// Evaluate a zone's multiplier at height `z`
///
/// Returns `None` outside the zone's vertical span or outside the cavity
/// ellipsoid, so the point falls through to other zones or the background
/// profile.
pub fn zone_factor(zone: &Zone, claim: &ZoneClaim, z: f64, z_ref: f64) -> Option<WindFactor> {
    let h = zone.height;
    let theta = zone.theta;
    let half_pi = std::f64::consts::FRAC_PI_2;
    let pi = std::f64::consts::PI;

    match &zone.detail {
        ZoneDetail::Displacement { .. } => {
            if z < zone.base || z > h || h <= 0.0 {
                return None;
            }
            let v = C_DZ * (z / h).powf(P_DZ) * (2.0 * (theta - half_pi)).sin() / 2.0;
            Some(WindFactor {
                u: 0.0,
                v,
                w: 0.0,
                ref_height: RefHeight::BlockHeight,
                block_height: h,
            })
        }
        ZoneDetail::DisplacementVortex { .. } => {
            if z < zone.base || z > h {
                return None;
            }
            let xi = claim.xi;
            let v = -(0.6 * (pi * xi).cos() + 0.05) * 0.6 * (pi * xi).sin();
            let w = -0.1 * (pi * xi).cos() - 0.05;
            Some(WindFactor {
                u: 0.0,
                v,
                w,
                ref_height: RefHeight::BlockHeight,
                block_height: h,
            })
        }
        ZoneDetail::Cavity { .. } => {
            if z < zone.base || z >= h || h <= 0.0 {
                return None;
            }
            // Ellipsoid cross-section shrinks with height; beyond it the
            // point is outside the recirculation
            let s = (1.0 - (z / h) * (z / h)).max(0.0).sqrt();
            if s <= 0.0 || claim.xi >= s {
                return None;
            }
            let v = -(1.0 - claim.xi / s).powi(2).clamp(0.0, 1.0);
            Some(WindFactor {
                u: 0.0,
                v,
                w: 0.0,
                ref_height: RefHeight::BlockHeight,
                block_height: h,
            })
        }
        ZoneDetail::Wake { lr, .. } => {
            if z < zone.base || z >= h || h <= 0.0 {
                return None;
            }
            let s = (1.0 - (z / h) * (z / h)).max(0.0).sqrt();
            let distance = claim.wall_distance.max(1e-6);
            let m = 1.0 - (lr * s / distance).powf(1.5);
            if m <= 0.0 {
                // Still inside the cavity ellipsoid; the cavity scheme owns it
                return None;
            }
            let m = m.min(1.0);
            Some(WindFactor {
                u: m,
                v: m,
                w: m,
                ref_height: RefHeight::PointHeight,
                block_height: h,
            })
        }
        ZoneDetail::StreetCanyon {
            upstream_height, ..
        } => {
            let h = *upstream_height;
            if z > h || h <= 0.0 {
                return None;
            }
            let bump = z * (h - z);
            let u = (2.0 * (theta - half_pi)).sin() * (0.5 + bump / (0.5 * h * h));
            let v = 1.0 - (theta - half_pi).cos().powi(2) * (1.0 + bump / (0.5 * h).powi(2));
            let w = -(0.5 * (1.0 - z / (0.5 * h))).abs() * (1.0 - (h - z) / (0.5 * h));
            Some(WindFactor {
                u,
                v,
                w,
                ref_height: RefHeight::ZRef,
                block_height: h,
            })
        }
        ZoneDetail::RooftopPerpendicular { hcm, .. } => {
            if z < h || z > h + hcm || *hcm <= 0.0 {
                return None;
            }
            let reach = h + hcm - z;
            let v = -(reach / z_ref).powf(P_RTP) * reach.abs() / hcm;
            Some(WindFactor {
                u: 0.0,
                v,
                w: 0.0,
                ref_height: RefHeight::BlockHeight,
                block_height: h,
            })
        }
        ZoneDetail::RooftopCorner { hcm, c1, .. } => {
            // The corner vortex reuses the perpendicular recirculation height
            let hccp = *hcm;
            if z < h || z > h + hccp || hccp <= 0.0 {
                return None;
            }
            let reach = h + hccp - z;
            let shape = (reach / z_ref).powf(P_RTP) * reach.abs() / hccp;
            Some(WindFactor {
                u: -c1 * (2.0 * theta).sin() * shape,
                v: -c1 * theta.sin().powi(2) * shape,
                w: 0.0,
                ref_height: RefHeight::BlockHeight,
                block_height: h,
            })
        }
    }
}

/// Scalar attenuation a vegetation zone applies to the horizontal wind
///
/// `canopy_top` is the tallest crown over the cell; above it the canopy has no
/// effect. Clamped to [0, 1].
pub fn vegetation_factor(
    zone: &VegetationZone,
    z: f64,
    canopy_top: f64,
    z0: f64,
    d: f64,
) -> Option<f64> {
    if z >= canopy_top || z <= z0 {
        return None;
    }
    let h_t = zone.crown_top;
    let denominator = (z / z0).ln();
    if denominator <= 0.0 {
        return None;
    }

    let factor = if zone.built {
        if z < h_t {
            (h_t / z0).ln() / denominator * (zone.attenuation * (z / h_t - 1.0)).exp()
        } else {
            1.0
        }
    } else if z < h_t {
        let top = (h_t - d).max(z0 * (1.0 + 1e-9));
        (top / z0).ln() / denominator * (zone.attenuation * (z / h_t - 1.0)).exp()
    } else {
        // Between this crown and the tallest local canopy: displaced log law
        let displaced = (z - d).max(z0 * (1.0 + 1e-9));
        (displaced / z0).ln() / denominator
    };

    Some(factor.clamp(0.0, 1.0))
}

/// Wake deficits and vegetation weights scale the wind at the point's own
/// height; zone schemes scale a fixed reference. The kind decides whether a
/// zone enters the priority tables or the weighting tables.
pub fn is_weighting_kind(kind: ZoneKind) -> bool {
    matches!(kind, ZoneKind::Wake)
}
