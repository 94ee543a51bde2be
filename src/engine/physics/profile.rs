// ABOUTME: Vertical wind profiles - power, log, urban canopy and user-supplied laws
// ABOUTME: Evaluated once per z level and composed with the zone multipliers

use crate::engine::config::{ProfileConfig, ProfileType, ReferenceWind};
use crate::engine::geometry::indicators::RoughnessParams;

/// Exponential urban canopy coefficient (MacDonald-style attenuation)
const URBAN_CANOPY_COEFF: f64 = 9.6;

/// The background vertical wind profile V(z)
///
/// The urban profile follows an exponential law inside the mean canopy and a
/// displaced log law above, anchored so the two branches meet at the mean
/// height. Open sites degrade to a plain log profile with zero displacement.
#[derive(Debug, Clone)]
pub struct VerticalProfile {
    kind: ProfileType,
    v_ref: f64,
    z_ref: f64,
    z0: f64,
    d: f64,
    lambda_f: f64,
    mean_height: f64,
    user_table: Option<Vec<(f64, f64)>>,
}

impl VerticalProfile {
    pub fn new(
        profile: &ProfileConfig,
        wind: &ReferenceWind,
        roughness: &RoughnessParams,
    ) -> Self {
        let mut user_table = profile.user_profile.clone();
        if let Some(table) = &mut user_table {
            table.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        }
        Self {
            kind: profile.profile_type,
            v_ref: wind.v_ref,
            z_ref: wind.z_ref,
            z0: roughness.z0,
            d: roughness.d,
            lambda_f: roughness.lambda_f,
            mean_height: roughness.mean_height,
            user_table,
        }
    }

    pub fn z0(&self) -> f64 {
        self.z0
    }

    pub fn displacement(&self) -> f64 {
        self.d
    }

    /// Background wind speed at height `z` (m/s)
    pub fn value(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        match self.kind {
            ProfileType::Power => {
                self.v_ref * (z / self.z_ref).powf(0.12 * self.z0 + 0.18)
            }
            ProfileType::Log => self.log_value(z, self.d, self.z_ref),
            ProfileType::Urban => {
                if self.lambda_f <= 0.0 || self.mean_height <= 0.0 {
                    return self.log_value(z, 0.0, self.z_ref);
                }
                if z < self.mean_height {
                    self.v_ref
                        * (URBAN_CANOPY_COEFF * self.lambda_f * (z / self.mean_height - 1.0)).exp()
                } else {
                    // Displaced log law anchored at V(H) = v_ref
                    let anchor = self.mean_height - self.d;
                    if anchor <= self.z0 {
                        return self.v_ref;
                    }
                    let numerator = ((z - self.d) / self.z0).ln();
                    let denominator = (anchor / self.z0).ln();
                    if denominator <= 0.0 {
                        self.v_ref
                    } else {
                        self.v_ref * numerator / denominator
                    }
                }
            }
            ProfileType::User => self.user_value(z),
        }
    }

    fn log_value(&self, z: f64, d: f64, z_ref: f64) -> f64 {
        let denominator = (z_ref / self.z0).ln();
        if denominator <= 0.0 {
            return self.v_ref;
        }
        let shifted = z - d;
        if shifted <= self.z0 {
            return 0.0;
        }
        self.v_ref * (shifted / self.z0).ln() / denominator
    }

    fn user_value(&self, z: f64) -> f64 {
        let Some(table) = &self.user_table else {
            return self.v_ref;
        };
        if table.is_empty() {
            return self.v_ref;
        }
        if z <= table[0].0 {
            return table[0].1;
        }
        if z >= table[table.len() - 1].0 {
            return table[table.len() - 1].1;
        }
        for pair in table.windows(2) {
            let (z_lo, v_lo) = pair[0];
            let (z_hi, v_hi) = pair[1];
            if z >= z_lo && z <= z_hi {
                if z_hi - z_lo <= 0.0 {
                    return v_lo;
                }
                let t = (z - z_lo) / (z_hi - z_lo);
                return v_lo + t * (v_hi - v_lo);
            }
        }
        self.v_ref
    }
}
