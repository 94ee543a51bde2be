// ABOUTME: Geometry preparation layer - obstacle inputs, blocks, facades, indicators
// ABOUTME: Everything here operates on 2D footprints; the vertical dimension is plain numbers

pub mod blocks;
pub mod facades;
pub mod indicators;
pub mod primitives;
pub mod rotation;

use geo::Polygon;

pub use blocks::{Block, StackedBlock};
pub use facades::UpwindFacade;
pub use indicators::{RoughnessParams, ZoneLengths};
pub use rotation::WindRotation;

/// Distance below which two buildings belong to the same block (m)
pub const GEOMETRY_MERGE_TOLERANCE: f64 = 0.05;
/// Douglas-Peucker tolerance applied to merged footprints (m)
pub const GEOMETRY_SIMPLIFICATION_DISTANCE: f64 = 0.25;
/// Snapping tolerance for zone construction (m)
pub const SNAPPING_TOLERANCE: f64 = 0.3;

/// A building as supplied by the caller: a simple footprint ring with a height
///
/// Coordinates are meters in a projected CRS; the crate never touches
/// geographic coordinates or file formats.
#[derive(Debug, Clone)]
pub struct Building {
    pub id: usize,
    pub footprint: Polygon<f64>,
    /// Roof height above ground (m)
    pub height: f64,
}

/// A vegetation patch with a crown layer and an attenuation coefficient
#[derive(Debug, Clone)]
pub struct VegetationPatch {
    pub id: usize,
    pub footprint: Polygon<f64>,
    /// Height of the crown base above ground (m)
    pub crown_base: f64,
    /// Height of the crown top above ground (m)
    pub crown_top: f64,
    /// Foliage attenuation coefficient (dimensionless, > 0)
    pub attenuation: f64,
}

/// Attenuation factor used when a patch carries none of its own
pub const DEFAULT_VEG_ATTENUATION: f64 = 2.8;

impl VegetationPatch {
    /// Build a patch; `attenuation: None` falls back to
    /// `DEFAULT_VEG_ATTENUATION`
    pub fn new(
        id: usize,
        footprint: Polygon<f64>,
        crown_base: f64,
        crown_top: f64,
        attenuation: Option<f64>,
    ) -> Self {
        Self {
            id,
            footprint,
            crown_base,
            crown_top,
            attenuation: attenuation.unwrap_or(DEFAULT_VEG_ATTENUATION),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;

    #[test]
    fn test_vegetation_patch_default_attenuation() {
        let footprint = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 0.0)]),
            vec![],
        );
        let patch = VegetationPatch::new(0, footprint.clone(), 1.0, 10.0, None);
        assert_eq!(patch.attenuation, DEFAULT_VEG_ATTENUATION);

        let explicit = VegetationPatch::new(1, footprint, 1.0, 10.0, Some(1.5));
        assert_eq!(explicit.attenuation, 1.5);
    }
}
