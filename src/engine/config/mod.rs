// ABOUTME: Run descriptor for the wind model - YAML-serializable, immutable once built
// ABOUTME: Carries reference wind, grid, solver and profile settings through the pipeline

use serde::{Deserialize, Serialize};

/// Default wind input measurement height (m)
pub const DEFAULT_Z_REF: f64 = 10.0;
/// Default reference wind speed (m/s)
pub const DEFAULT_V_REF: f64 = 2.0;
/// Default wind direction (degrees clockwise from north)
pub const DEFAULT_WIND_DIRECTION: f64 = 270.0;

/// Default horizontal grid resolution (m)
pub const DEFAULT_MESH_SIZE: f64 = 2.0;
/// Default vertical grid resolution (m)
pub const DEFAULT_DZ: f64 = 2.0;
/// Default domain extension beyond the zones, along wind (m)
pub const ALONG_WIND_ZONE_EXTEND: f64 = 30.0;
/// Default domain extension beyond the zones, cross wind (m)
pub const CROSS_WIND_ZONE_EXTEND: f64 = 25.0;
/// Default domain extension above the tallest obstacle (m)
pub const VERTICAL_EXTEND: f64 = 20.0;

/// Default solver iteration cap (Pardyjak & Brown 2003)
pub const MAX_ITERATIONS: usize = 10_000;
/// Default relative λ-variation threshold (Pardyjak & Brown 2003)
pub const THRESHOLD_ITERATIONS: f64 = 1e-6;
/// Iterations of non-decreasing residual before the solver declares stagnation
pub const STAGNATION_WINDOW: usize = 50;

/// Fallback aerodynamic roughness length when the site has no frontal area (m)
pub const DEFAULT_ROUGHNESS_LENGTH: f64 = 0.1;

/// Reference wind measurement: speed at a height, coming from a compass direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReferenceWind {
    /// Measurement height above ground (m)
    pub z_ref: f64,
    /// Wind speed at `z_ref` (m/s)
    pub v_ref: f64,
    /// Direction the wind comes from, degrees clockwise from north
    pub direction_deg: f64,
}

impl Default for ReferenceWind {
    fn default() -> Self {
        Self {
            z_ref: DEFAULT_Z_REF,
            v_ref: DEFAULT_V_REF,
            direction_deg: DEFAULT_WIND_DIRECTION,
        }
    }
}

/// Explicit domain rectangle for obstacle-free runs
///
/// The grid normally derives its envelope from the flow zones; with no
/// obstacles there are none, so the caller must state the domain directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExplicitDomain {
    /// Along-x extent (m)
    pub x_size: f64,
    /// Along-y extent (m)
    pub y_size: f64,
    /// Vertical extent (m)
    pub z_size: f64,
}

/// Grid construction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Horizontal resolution, dx = dy (m)
    pub mesh_size: f64,
    /// Vertical resolution (m)
    pub dz: f64,
    /// Domain extension beyond the zone envelope along the wind (m)
    pub along_wind_extend: f64,
    /// Domain extension beyond the zone envelope across the wind (m)
    pub cross_wind_extend: f64,
    /// Domain extension above the tallest obstacle (m)
    pub vertical_extend: f64,
    /// Domain override for runs without obstacles
    pub domain: Option<ExplicitDomain>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            mesh_size: DEFAULT_MESH_SIZE,
            dz: DEFAULT_DZ,
            along_wind_extend: ALONG_WIND_ZONE_EXTEND,
            cross_wind_extend: CROSS_WIND_ZONE_EXTEND,
            vertical_extend: VERTICAL_EXTEND,
            domain: None,
        }
    }
}

/// Mass-consistency solver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Iteration cap; reaching it is reported, not fatal
    pub max_iterations: usize,
    /// Relative λ-variation threshold for convergence
    pub threshold: f64,
    /// Consecutive non-improving iterations before stagnation is declared
    pub stagnation_window: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            threshold: THRESHOLD_ITERATIONS,
            stagnation_window: STAGNATION_WINDOW,
        }
    }
}

/// Vertical wind profile family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    Power,
    Log,
    Urban,
    User,
}

/// Vertical profile settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub profile_type: ProfileType,
    /// Fallback roughness length when the site provides no frontal area (m)
    pub roughness_length: f64,
    /// (z, V) pairs for `ProfileType::User`, interpolated linearly
    pub user_profile: Option<Vec<(f64, f64)>>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            profile_type: ProfileType::Urban,
            roughness_length: DEFAULT_ROUGHNESS_LENGTH,
            user_profile: None,
        }
    }
}

/// Complete immutable run descriptor passed through the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    pub wind: ReferenceWind,
    pub grid: GridConfig,
    pub solver: SolverConfig,
    pub profile: ProfileConfig,
}

impl RunConfig {
    /// Parse a run descriptor from YAML text
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Serialize the run descriptor to YAML for storage and replay
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Validate the descriptor; fatal problems abort the run before any work
    pub fn validate(&self) -> Result<(), crate::engine::error::ConfigError> {
        use crate::engine::error::ConfigError;

        if self.grid.mesh_size <= 0.0 {
            return Err(ConfigError::InvalidMeshSize(self.grid.mesh_size));
        }
        if self.grid.dz <= 0.0 {
            return Err(ConfigError::InvalidVerticalResolution(self.grid.dz));
        }
        if self.wind.z_ref <= 0.0 {
            return Err(ConfigError::InvalidReferenceHeight(self.wind.z_ref));
        }
        if self.profile.profile_type == ProfileType::User && self.profile.user_profile.is_none() {
            return Err(ConfigError::MissingUserProfile);
        }
        Ok(())
    }
}
