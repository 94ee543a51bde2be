// ABOUTME: Wind physics systems - point grid, zone factors, superimposition, profiles
// ABOUTME: Turns planar zones into a 3D field of velocity multipliers and a first guess

pub mod factors;
pub mod pointgrid;
pub mod profile;
pub mod superposition;

// Re-export key types
pub use factors::{RefHeight, WindFactor};
pub use pointgrid::{CellZones, PointGrid, ZoneClaim};
pub use profile::VerticalProfile;
pub use superposition::ResolvedFactor;
