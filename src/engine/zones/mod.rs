// ABOUTME: Flow-zone records - the planar regions each obstacle carves out of the wind
// ABOUTME: One Zone per connected polygon; per-kind payload carries the lengths factors need

pub mod builder;

use geo::Polygon;

/// The flow-zone families of the Röckle scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneKind {
    Displacement,
    DisplacementVortex,
    Cavity,
    Wake,
    StreetCanyon,
    RooftopPerpendicular,
    RooftopCorner,
}

impl ZoneKind {
    /// Fixed tie-break priority when upstream position and height both tie
    /// (lower wins)
    pub fn priority(&self) -> u8 {
        match self {
            ZoneKind::StreetCanyon => 1,
            ZoneKind::Cavity => 2,
            ZoneKind::RooftopPerpendicular => 3,
            ZoneKind::RooftopCorner => 3,
            ZoneKind::DisplacementVortex => 3,
            ZoneKind::Displacement => 4,
            ZoneKind::Wake => 5,
        }
    }
}

/// Per-kind geometric payload used by the 3D factor evaluation
#[derive(Debug, Clone)]
pub enum ZoneDetail {
    Displacement {
        lf: f64,
    },
    DisplacementVortex {
        lfv: f64,
    },
    Cavity {
        lr: f64,
    },
    Wake {
        lr: f64,
        lw: f64,
    },
    StreetCanyon {
        upstream_block: usize,
        downstream_block: usize,
        upstream_height: f64,
        downstream_height: f64,
    },
    RooftopPerpendicular {
        hcm: f64,
        lc: f64,
    },
    RooftopCorner {
        hcm: f64,
        c1: f64,
        lcc: f64,
        facade_length: f64,
    },
}

/// A single connected flow-zone polygon in the wind-aligned frame
#[derive(Debug, Clone)]
pub struct Zone {
    pub kind: ZoneKind,
    pub polygon: Polygon<f64>,
    /// The stacked block the zone hangs off (the downstream block for canyons)
    pub source_block: usize,
    /// Driving obstacle height h in the factor formulas (m)
    pub height: f64,
    /// Lower vertical bound of the zone (m)
    pub base: f64,
    /// Facade angle θ, π/2 for whole-block zones
    pub theta: f64,
    /// Originating facade, where applicable
    pub facade_id: Option<usize>,
    pub detail: ZoneDetail,
}

/// A vegetation patch clipped against the building wakes
#[derive(Debug, Clone)]
pub struct VegetationZone {
    pub polygon: Polygon<f64>,
    pub patch_id: usize,
    pub crown_base: f64,
    pub crown_top: f64,
    pub attenuation: f64,
    /// true when inside a building wake (built vegetation scheme)
    pub built: bool,
}
