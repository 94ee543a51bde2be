// ABOUTME: Low-level polygon helpers - ellipse rings, half-plane clips, column intervals
// ABOUTME: Closed-form coordinate constructions behind every zone shape

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{
    BooleanOps, BoundingRect, Contains, Coord, Intersects, Line, LineString, MultiPolygon, Point,
    Polygon, Rect, coord,
};

/// Number of vertices used to discretize ellipse rings
pub const NPOINTS_ELLIPSE: usize = 100;

/// Reach of the synthetic half-plane polygons used for one-sided clips (m)
///
/// Must exceed any realistic study-area extent by a wide margin.
const HALF_PLANE_REACH: f64 = 1.0e6;

/// Axis-aligned envelope of a polygon, `None` for empty geometry
pub fn envelope(poly: &Polygon<f64>) -> Option<Rect<f64>> {
    poly.bounding_rect()
}

/// Envelope of a set of polygons
pub fn envelope_of_all<'a, I>(polys: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = &'a Polygon<f64>>,
{
    let mut result: Option<Rect<f64>> = None;
    for poly in polys {
        let Some(rect) = poly.bounding_rect() else {
            continue;
        };
        result = Some(match result {
            None => rect,
            Some(acc) => Rect::new(
                coord! { x: acc.min().x.min(rect.min().x), y: acc.min().y.min(rect.min().y) },
                coord! { x: acc.max().x.max(rect.max().x), y: acc.max().y.max(rect.max().y) },
            ),
        });
    }
    result
}

/// Grow a rectangle by `dx` on both x sides and `dy` on both y sides
pub fn expand_rect(rect: Rect<f64>, dx: f64, dy: f64) -> Rect<f64> {
    Rect::new(
        coord! { x: rect.min().x - dx, y: rect.min().y - dy },
        coord! { x: rect.max().x + dx, y: rect.max().y + dy },
    )
}

/// Ellipse ring centered at `center` with full x-axis `width` and full y-axis
/// `height`, discretized with `NPOINTS_ELLIPSE` vertices
pub fn make_ellipse(center: Coord<f64>, width: f64, height: f64) -> Polygon<f64> {
    let rx = width / 2.0;
    let ry = height / 2.0;
    let mut coords = Vec::with_capacity(NPOINTS_ELLIPSE + 1);
    for i in 0..NPOINTS_ELLIPSE {
        let phi = std::f64::consts::TAU * (i as f64) / (NPOINTS_ELLIPSE as f64);
        coords.push(coord! {
            x: center.x + rx * phi.cos(),
            y: center.y + ry * phi.sin(),
        });
    }
    coords.push(coords[0]);
    Polygon::new(LineString::new(coords), vec![])
}

/// Clip a multipolygon to one side of the infinite line through `anchor`
/// along `direction`
///
/// `keep_left` selects the half-plane to the left of the direction of travel
/// (the side the normal (-dy, dx) points into).
pub fn clip_to_half_plane(
    geometry: &MultiPolygon<f64>,
    anchor: Coord<f64>,
    direction: Coord<f64>,
    keep_left: bool,
) -> MultiPolygon<f64> {
    let len = (direction.x * direction.x + direction.y * direction.y).sqrt();
    if len == 0.0 {
        return geometry.clone();
    }
    let d = coord! { x: direction.x / len, y: direction.y / len };
    let n = if keep_left {
        coord! { x: -d.y, y: d.x }
    } else {
        coord! { x: d.y, y: -d.x }
    };

    let r = HALF_PLANE_REACH;
    let half_plane = Polygon::new(
        LineString::new(vec![
            coord! { x: anchor.x - d.x * r, y: anchor.y - d.y * r },
            coord! { x: anchor.x + d.x * r, y: anchor.y + d.y * r },
            coord! { x: anchor.x + d.x * r + n.x * r, y: anchor.y + d.y * r + n.y * r },
            coord! { x: anchor.x - d.x * r + n.x * r, y: anchor.y - d.y * r + n.y * r },
            coord! { x: anchor.x - d.x * r, y: anchor.y - d.y * r },
        ]),
        vec![],
    );
    geometry.intersection(&MultiPolygon::new(vec![half_plane]))
}

/// Parts of `segment` lying inside (or on the boundary of) `poly`
pub fn clip_segment_to_polygon(segment: Line<f64>, poly: &Polygon<f64>) -> Vec<Line<f64>> {
    let d = coord! {
        x: segment.end.x - segment.start.x,
        y: segment.end.y - segment.start.y,
    };
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return vec![];
    }

    let param = |p: Coord<f64>| ((p.x - segment.start.x) * d.x + (p.y - segment.start.y) * d.y) / len2;

    let mut ts = vec![0.0, 1.0];
    let rings = std::iter::once(poly.exterior()).chain(poly.interiors().iter());
    for ring in rings {
        for edge in ring.lines() {
            match line_intersection(segment, edge) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    ts.push(param(intersection));
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    ts.push(param(intersection.start));
                    ts.push(param(intersection.end));
                }
                None => {}
            }
        }
    }

    ts.retain(|t| (0.0..=1.0).contains(t));
    ts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    ts.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

    let at = |t: f64| {
        coord! {
            x: segment.start.x + d.x * t,
            y: segment.start.y + d.y * t,
        }
    };

    let mut pieces = Vec::new();
    for pair in ts.windows(2) {
        let (t0, t1) = (pair[0], pair[1]);
        if t1 - t0 < 1e-12 {
            continue;
        }
        let mid = at((t0 + t1) / 2.0);
        if poly.intersects(&Point::from(mid)) {
            pieces.push(Line::new(at(t0), at(t1)));
        }
    }
    pieces
}

/// y-intervals cut out of the vertical line x = `x` by `poly`, ascending
pub fn column_intervals(poly: &Polygon<f64>, x: f64, y_min: f64, y_max: f64) -> Vec<(f64, f64)> {
    let segment = Line::new(coord! { x: x, y: y_min }, coord! { x: x, y: y_max });
    let mut intervals: Vec<(f64, f64)> = clip_segment_to_polygon(segment, poly)
        .into_iter()
        .map(|l| {
            let (a, b) = (l.start.y, l.end.y);
            if a <= b { (a, b) } else { (b, a) }
        })
        .collect();
    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    // Merge touching intervals left behind by collinear edge pieces
    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(intervals.len());
    for (lo, hi) in intervals {
        match merged.last_mut() {
            Some(last) if lo <= last.1 + 1e-9 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
}

/// The connected component of `parts` reaching farthest downwind (minimum y)
pub fn downwind_component(parts: MultiPolygon<f64>) -> Option<Polygon<f64>> {
    parts
        .into_iter()
        .filter_map(|p| p.bounding_rect().map(|r| (r.min().y, p)))
        .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
        .map(|(_, p)| p)
}

/// The component of `parts` containing (or touching) `probe`
pub fn component_containing(parts: MultiPolygon<f64>, probe: Coord<f64>) -> Option<Polygon<f64>> {
    let probe = Point::from(probe);
    parts
        .into_iter()
        .find(|p| p.intersects(&probe) || p.contains(&probe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Area;

    fn unit_square() -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
            vec![],
        )
    }

    #[test]
    fn test_ellipse_extent_and_area() {
        let ellipse = make_ellipse(coord! { x: 1.0, y: 2.0 }, 8.0, 4.0);
        let rect = ellipse.bounding_rect().unwrap();
        assert_relative_eq!(rect.min().x, -3.0, epsilon = 1e-9);
        assert_relative_eq!(rect.max().x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(rect.max().y, 4.0, epsilon = 1e-9);

        // 100-point discretization comes within a fraction of a percent of πab
        let expected = std::f64::consts::PI * 4.0 * 2.0;
        assert_relative_eq!(ellipse.unsigned_area(), expected, max_relative = 0.01);
    }

    #[test]
    fn test_half_plane_clip() {
        let square = MultiPolygon::new(vec![unit_square()]);
        // Keep the part above the horizontal line y = 4
        let upper = clip_to_half_plane(
            &square,
            coord! { x: 0.0, y: 4.0 },
            coord! { x: 1.0, y: 0.0 },
            true,
        );
        let rect = upper.bounding_rect().unwrap();
        assert_relative_eq!(rect.min().y, 4.0, epsilon = 1e-9);
        assert_relative_eq!(rect.max().y, 10.0, epsilon = 1e-9);

        let lower = clip_to_half_plane(
            &square,
            coord! { x: 0.0, y: 4.0 },
            coord! { x: 1.0, y: 0.0 },
            false,
        );
        assert_relative_eq!(lower.bounding_rect().unwrap().max().y, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_column_intervals_simple() {
        let square = unit_square();
        let intervals = column_intervals(&square, 5.0, -100.0, 100.0);
        assert_eq!(intervals.len(), 1);
        assert_relative_eq!(intervals[0].0, 0.0, epsilon = 1e-9);
        assert_relative_eq!(intervals[0].1, 10.0, epsilon = 1e-9);

        // Outside the polygon: nothing
        assert!(column_intervals(&square, 20.0, -100.0, 100.0).is_empty());
    }

    #[test]
    fn test_column_intervals_with_hole() {
        let with_hole = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
            vec![LineString::from(vec![
                (4.0, 4.0),
                (6.0, 4.0),
                (6.0, 6.0),
                (4.0, 6.0),
                (4.0, 4.0),
            ])],
        );
        let intervals = column_intervals(&with_hole, 5.0, -100.0, 100.0);
        assert_eq!(intervals.len(), 2);
        assert_relative_eq!(intervals[0].1, 4.0, epsilon = 1e-9);
        assert_relative_eq!(intervals[1].0, 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_downwind_component() {
        let north = Polygon::new(
            LineString::from(vec![(0.0, 20.0), (5.0, 20.0), (5.0, 25.0), (0.0, 25.0), (0.0, 20.0)]),
            vec![],
        );
        let south = unit_square();
        let picked = downwind_component(MultiPolygon::new(vec![north, south.clone()])).unwrap();
        assert_relative_eq!(
            picked.bounding_rect().unwrap().min().y,
            0.0,
            epsilon = 1e-9
        );
    }
}
