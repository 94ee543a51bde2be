// ABOUTME: Core engine foundation - fundamental data structures for the wind model
// ABOUTME: Provides basic building blocks for all other engine components

pub mod grid3;
pub mod math;

// Re-export key types for convenience
pub use grid3::Grid3;
pub use math::Vec2;
