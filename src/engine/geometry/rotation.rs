// ABOUTME: Wind-alignment rotation - turns all inputs so the wind blows from +Y toward -Y
// ABOUTME: Remembers angle and center so output vectors can be put back in geographic axes

use geo::{Coord, Point, Polygon, Rect, Rotate, coord};

use crate::engine::core::math::Vec2;

/// The rotation applied to every input geometry before zone construction
///
/// Rotating the world counter-clockwise by the wind direction (degrees from
/// north) maps the incoming wind onto the -Y axis, which is the frame all the
/// zone parameterizations are written in.
#[derive(Debug, Clone, Copy)]
pub struct WindRotation {
    /// Wind direction in degrees clockwise from north
    pub direction_deg: f64,
    /// Center of rotation: the north-east corner of the combined envelope
    pub center: Coord<f64>,
}

impl WindRotation {
    /// Build the rotation from the wind direction and the combined envelope of
    /// all input geometries
    pub fn from_envelope(direction_deg: f64, combined: Rect<f64>) -> Self {
        Self {
            direction_deg,
            center: coord! { x: combined.max().x, y: combined.max().y },
        }
    }

    /// Rotate a polygon into the wind-aligned frame
    pub fn apply(&self, poly: &Polygon<f64>) -> Polygon<f64> {
        poly.rotate_around_point(self.direction_deg, Point::from(self.center))
    }

    /// Map a horizontal vector computed in the wind-aligned frame back to
    /// geographic (east, north) axes
    pub fn vector_to_geographic(&self, rotated: Vec2) -> Vec2 {
        rotated.rotated(-self.direction_deg.to_radians())
    }

    /// Map a point in the wind-aligned frame back to geographic coordinates
    pub fn point_to_geographic(&self, p: Coord<f64>) -> Coord<f64> {
        let rotated = Point::new(p.x, p.y).rotate_around_point(
            -self.direction_deg,
            Point::from(self.center),
        );
        coord! { x: rotated.x(), y: rotated.y() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{BoundingRect, LineString};

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (x0, y0),
                (x0 + size, y0),
                (x0 + size, y0 + size),
                (x0, y0 + size),
                (x0, y0),
            ]),
            vec![],
        )
    }

    #[test]
    fn test_west_wind_becomes_north_wind() {
        // Wind from the west (270°) blows toward +x; after rotation it must
        // blow toward -y.
        let blowing_toward = Vec2::new(1.0, 0.0);
        // Geographic = R(-270°)·rotated, so rotated = R(270°)·geographic
        let in_rotated_frame = blowing_toward.rotated(270.0_f64.to_radians());
        assert_relative_eq!(in_rotated_frame.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(in_rotated_frame.y, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_vector_round_trip() {
        let rotation = WindRotation {
            direction_deg: 33.0,
            center: coord! { x: 5.0, y: 7.0 },
        };
        let v = Vec2::new(1.5, -0.5);
        let back = rotation.vector_to_geographic(v.rotated(33.0_f64.to_radians()));
        assert_relative_eq!(back.x, v.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, v.y, epsilon = 1e-12);
    }

    #[test]
    fn test_polygon_rotation_preserves_envelope_corner() {
        let poly = square(0.0, 0.0, 10.0);
        let envelope = poly.bounding_rect().unwrap();
        let rotation = WindRotation::from_envelope(90.0, envelope);

        // The NE corner (10, 10) is the rotation center and stays in place;
        // a 90° counter-clockwise turn about it sweeps the square eastward
        let rotated = rotation.apply(&poly);
        let rotated_envelope = rotated.bounding_rect().unwrap();
        assert_relative_eq!(rotated_envelope.min().x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(rotated_envelope.max().x, 20.0, epsilon = 1e-9);
        assert_relative_eq!(rotated_envelope.min().y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(rotated_envelope.max().y, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_point_round_trip() {
        let rotation = WindRotation {
            direction_deg: 120.0,
            center: coord! { x: 3.0, y: -2.0 },
        };
        let p = coord! { x: 11.0, y: 4.0 };
        let rotated = Point::new(p.x, p.y)
            .rotate_around_point(rotation.direction_deg, Point::from(rotation.center));
        let back = rotation.point_to_geographic(coord! { x: rotated.x(), y: rotated.y() });
        assert_relative_eq!(back.x, p.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-9);
    }
}
